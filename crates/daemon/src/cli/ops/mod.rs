pub mod cat;
pub mod init;
pub mod ls;
pub mod report;
pub mod stat;

pub use cat::Cat;
pub use init::Init;
pub use ls::Ls;
pub use report::Report;
pub use stat::Stat;

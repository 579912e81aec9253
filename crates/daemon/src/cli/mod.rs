pub mod op;
pub mod ops;

use op::Op;

crate::command_enum! {
    (Init, ops::Init),
    (Stat, ops::Stat),
    (Ls, ops::Ls),
    (Cat, ops::Cat),
    (Report, ops::Report),
}

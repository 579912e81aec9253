mod named_lock;

pub use named_lock::{NamedLockGuard, NamedLockRegistry};

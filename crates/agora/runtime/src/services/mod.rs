//! Per-player and per-role services consumed by the kernel

mod distribution;
mod mailbox;
mod memory;
mod signal;

pub use distribution::*;
pub use mailbox::*;
pub use memory::*;
pub use signal::*;

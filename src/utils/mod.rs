//! Shared utilities

mod pid;

pub use pid::{read_pid, PidManager};

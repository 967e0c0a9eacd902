//! Individual pipeline steps.
//!
//! Each step is a plain function taking the running [`TaskContext`]; the
//! orchestrator wraps them into scheduler tasks.
//!
//! [`TaskContext`]: crate::scheduler::TaskContext

pub mod download;
pub mod extract;
pub mod replace;
pub mod terminate;
pub mod verify;

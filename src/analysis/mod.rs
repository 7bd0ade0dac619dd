//! Analysis results and background execution.

pub mod result;
pub mod task;

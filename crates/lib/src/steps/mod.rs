//! Built-in step bodies.

mod copy;
mod exec;

pub use copy::CopyStep;
pub use exec::{ExecError, ExecStep};

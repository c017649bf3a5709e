//! Runtime components: readiness polling, process launching and orchestration

pub mod launcher;
pub mod orchestrator;
pub mod process;
pub mod readiness;

pub use launcher::*;
pub use orchestrator::*;
pub use process::*;
pub use readiness::*;

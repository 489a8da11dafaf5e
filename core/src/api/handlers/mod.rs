//! Request handlers

mod drafting;
mod executions;
mod health;
mod versions;
mod workflows;

pub use drafting::*;
pub use executions::*;
pub use health::*;
pub use versions::*;
pub use workflows::*;

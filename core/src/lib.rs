pub mod api;
pub mod application;
pub mod auth;
pub mod cli;
pub mod config;
pub mod db;
pub mod definition;
pub mod drafting;
pub mod error;
pub mod executions;
pub mod lifecycle;
pub mod store;
pub mod types;
pub mod versions;
pub mod workflows;


// Re-export main types
pub use error::{Error, ErrorKind, Result};
pub use types::*;

pub use application::{bootstrap, Application};

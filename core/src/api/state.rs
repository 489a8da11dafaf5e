//! Application state for API handlers

use std::sync::Arc;

use crate::application::Application;
use crate::auth::Authenticator;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub app: Arc<Application>,

    /// Resolves bearer credentials to callers
    pub authenticator: Arc<dyn Authenticator>,

    pub version: String,
}

impl AppState {
    pub fn new(app: Arc<Application>, authenticator: Arc<dyn Authenticator>) -> Self {
        Self {
            app,
            authenticator,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

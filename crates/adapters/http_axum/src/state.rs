//! Shared application state for axum handlers.

use std::sync::Arc;

use plugwatch_app::coordinator::Coordinator;
use plugwatch_app::ports::PlugDriver;

/// Application state shared across all axum handlers.
///
/// Generic over the plug driver to avoid dynamic dispatch. `Clone` is
/// implemented manually so the driver itself does not need to be `Clone`.
pub struct AppState<D> {
    pub coordinator: Arc<Coordinator<D>>,
}

impl<D> Clone for AppState<D> {
    fn clone(&self) -> Self {
        Self {
            coordinator: Arc::clone(&self.coordinator),
        }
    }
}

impl<D: PlugDriver + 'static> AppState<D> {
    /// Wrap a coordinator that is shared with background tasks.
    pub fn new(coordinator: Arc<Coordinator<D>>) -> Self {
        Self { coordinator }
    }
}

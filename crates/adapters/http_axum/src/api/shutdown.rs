//! JSON handlers for the automatic shutdown countdown.

use axum::Json;
use axum::extract::State;

use plugwatch_app::ports::PlugDriver;
use plugwatch_domain::countdown::CountdownStatus;

use crate::state::AppState;

/// `GET /api/shutdown`
pub async fn status<D: PlugDriver + 'static>(
    State(state): State<AppState<D>>,
) -> Json<CountdownStatus> {
    Json(state.coordinator.countdown_status())
}

/// `POST /api/shutdown/enable`
pub async fn enable<D: PlugDriver + 'static>(
    State(state): State<AppState<D>>,
) -> Json<CountdownStatus> {
    Json(state.coordinator.enable_automatic_shutdown().await)
}

/// `POST /api/shutdown/disable`
pub async fn disable<D: PlugDriver + 'static>(
    State(state): State<AppState<D>>,
) -> Json<CountdownStatus> {
    Json(state.coordinator.disable_automatic_shutdown().await)
}

/// `POST /api/shutdown/abort`
pub async fn abort<D: PlugDriver + 'static>(
    State(state): State<AppState<D>>,
) -> Json<CountdownStatus> {
    Json(state.coordinator.abort_automatic_shutdown().await)
}

//! JSON API handler modules.

#[allow(clippy::missing_errors_doc)]
pub mod machine;
#[allow(clippy::missing_errors_doc)]
pub mod plugs;
#[allow(clippy::missing_errors_doc)]
pub mod shutdown;
pub mod sse;

use axum::Router;
use axum::routing::{get, post};

use plugwatch_app::ports::PlugDriver;

use crate::state::AppState;

/// Build the `/api` sub-router.
pub fn routes<D: PlugDriver + 'static>() -> Router<AppState<D>> {
    Router::new()
        // Plugs
        .route("/plugs", get(plugs::list::<D>))
        .route("/plugs/{address}", get(plugs::get::<D>))
        .route("/plugs/{address}/turn_on", post(plugs::turn_on::<D>))
        .route("/plugs/{address}/turn_off", post(plugs::turn_off::<D>))
        .route("/plugs/{address}/toggle", post(plugs::toggle::<D>))
        .route("/plugs/{address}/check_status", post(plugs::check_status::<D>))
        // Automatic shutdown
        .route("/shutdown", get(shutdown::status::<D>))
        .route("/shutdown/enable", post(shutdown::enable::<D>))
        .route("/shutdown/disable", post(shutdown::disable::<D>))
        .route("/shutdown/abort", post(shutdown::abort::<D>))
        // Machine signals
        .route("/machine/busy/{reason}", post(machine::busy::<D>))
        .route("/machine/idle/{reason}", post(machine::idle::<D>))
        .route("/machine/gcode", post(machine::gcode::<D>))
        .route("/machine/temperatures", post(machine::temperatures::<D>))
        .route("/machine/upload", post(machine::upload::<D>))
        // Events
        .route("/events/stream", get(sse::stream::<D>))
}

//! Handlers for signals coming from the monitored machine.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use plugwatch_app::ports::PlugDriver;
use plugwatch_domain::machine::{BusyReason, FileUpload, TemperatureReading};
use plugwatch_domain::plug::{DesiredState, PlugAddress};

use crate::error::ApiError;
use crate::state::AppState;

/// Request body for the G-code hook.
#[derive(Deserialize)]
pub struct GcodeRequest {
    pub line: String,
}

/// Power directive scheduled from a G-code line.
#[derive(Debug, Serialize)]
pub struct ScheduledDirective {
    pub address: PlugAddress,
    pub desired: DesiredState,
}

#[derive(Debug, Serialize)]
pub struct GcodeResponse {
    pub directive: Option<ScheduledDirective>,
}

/// Heater that tripped the thermal guard.
#[derive(Debug, Serialize)]
pub struct RunawayBody {
    pub heater: String,
    pub actual: f64,
    pub limit: f64,
}

#[derive(Debug, Serialize)]
pub struct TemperaturesResponse {
    pub runaway: Option<RunawayBody>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub powered_on: Vec<PlugAddress>,
}

/// `POST /api/machine/busy/{reason}`
pub async fn busy<D: PlugDriver + 'static>(
    State(state): State<AppState<D>>,
    Path(reason): Path<String>,
) -> Result<StatusCode, ApiError> {
    let reason: BusyReason = reason.parse()?;
    state.coordinator.machine_busy(reason).await;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/machine/idle/{reason}`
pub async fn idle<D: PlugDriver + 'static>(
    State(state): State<AppState<D>>,
    Path(reason): Path<String>,
) -> Result<StatusCode, ApiError> {
    let reason: BusyReason = reason.parse()?;
    state.coordinator.machine_idle(reason);
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/machine/gcode`
pub async fn gcode<D: PlugDriver + 'static>(
    State(state): State<AppState<D>>,
    Json(req): Json<GcodeRequest>,
) -> Json<GcodeResponse> {
    let directive = state
        .coordinator
        .handle_gcode(&req.line)
        .map(|directive| ScheduledDirective {
            address: directive.address,
            desired: directive.desired,
        });
    Json(GcodeResponse { directive })
}

/// `POST /api/machine/temperatures`
pub async fn temperatures<D: PlugDriver + 'static>(
    State(state): State<AppState<D>>,
    Json(readings): Json<Vec<TemperatureReading>>,
) -> Json<TemperaturesResponse> {
    let runaway = state
        .coordinator
        .report_temperatures(&readings)
        .await
        .map(|trip| RunawayBody {
            heater: trip.heater,
            actual: trip.actual,
            limit: trip.limit,
        });
    Json(TemperaturesResponse { runaway })
}

/// `POST /api/machine/upload`
pub async fn upload<D: PlugDriver + 'static>(
    State(state): State<AppState<D>>,
    Json(upload): Json<FileUpload>,
) -> Json<UploadResponse> {
    let powered_on = state.coordinator.file_uploaded(&upload);
    Json(UploadResponse { powered_on })
}

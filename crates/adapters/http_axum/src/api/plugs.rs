//! JSON handlers for plugs and plug commands.

use axum::Json;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use plugwatch_app::ports::PlugDriver;
use plugwatch_domain::plug::{Plug, PlugAddress, PlugState};

use crate::error::ApiError;
use crate::state::AppState;

/// Terminal result of a plug command.
#[derive(Debug, Serialize)]
pub struct CommandResponse {
    pub address: PlugAddress,
    pub state: PlugState,
}

/// Possible responses from the list endpoint.
pub enum ListResponse {
    Ok(Json<Vec<Plug>>),
}

impl IntoResponse for ListResponse {
    fn into_response(self) -> Response {
        match self {
            Self::Ok(json) => json.into_response(),
        }
    }
}

/// Possible responses from the get endpoint.
pub enum GetResponse {
    Ok(Json<Plug>),
}

impl IntoResponse for GetResponse {
    fn into_response(self) -> Response {
        match self {
            Self::Ok(json) => json.into_response(),
        }
    }
}

/// `GET /api/plugs`
pub async fn list<D: PlugDriver + 'static>(State(state): State<AppState<D>>) -> ListResponse {
    ListResponse::Ok(Json(state.coordinator.list_plugs()))
}

/// `GET /api/plugs/{address}`
pub async fn get<D: PlugDriver + 'static>(
    State(state): State<AppState<D>>,
    Path(address): Path<String>,
) -> Result<GetResponse, ApiError> {
    let plug = state.coordinator.plug(&PlugAddress::new(address))?;
    Ok(GetResponse::Ok(Json(plug)))
}

/// `POST /api/plugs/{address}/turn_on`
pub async fn turn_on<D: PlugDriver + 'static>(
    State(state): State<AppState<D>>,
    Path(address): Path<String>,
) -> Result<Json<CommandResponse>, ApiError> {
    let address = PlugAddress::new(address);
    let state = state.coordinator.turn_on(&address).await?;
    Ok(Json(CommandResponse { address, state }))
}

/// `POST /api/plugs/{address}/turn_off`
pub async fn turn_off<D: PlugDriver + 'static>(
    State(state): State<AppState<D>>,
    Path(address): Path<String>,
) -> Result<Json<CommandResponse>, ApiError> {
    let address = PlugAddress::new(address);
    let state = state.coordinator.turn_off(&address).await?;
    Ok(Json(CommandResponse { address, state }))
}

/// `POST /api/plugs/{address}/toggle`
pub async fn toggle<D: PlugDriver + 'static>(
    State(state): State<AppState<D>>,
    Path(address): Path<String>,
) -> Result<Json<CommandResponse>, ApiError> {
    let address = PlugAddress::new(address);
    let state = state.coordinator.toggle(&address).await?;
    Ok(Json(CommandResponse { address, state }))
}

/// `POST /api/plugs/{address}/check_status`
pub async fn check_status<D: PlugDriver + 'static>(
    State(state): State<AppState<D>>,
    Path(address): Path<String>,
) -> Result<Json<CommandResponse>, ApiError> {
    let address = PlugAddress::new(address);
    let state = state.coordinator.check_status(&address).await?;
    Ok(Json(CommandResponse { address, state }))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use crate::router::build;
    use crate::testing::{send, test_state};

    #[tokio::test]
    async fn should_list_configured_plugs_in_order() {
        let (state, _driver) = test_state(&["10.0.0.7", "10.0.0.5"]).await;

        let (status, body) = send(build(state), "GET", "/api/plugs", None).await;

        assert_eq!(status, StatusCode::OK);
        let addresses: Vec<_> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|plug| plug["address"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(addresses, ["10.0.0.7", "10.0.0.5"]);
    }

    #[tokio::test]
    async fn should_return_not_found_when_plug_is_unknown() {
        let (state, _driver) = test_state(&["10.0.0.5"]).await;

        let (status, body) = send(build(state), "GET", "/api/plugs/10.0.0.99", None).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["category"], "unknown_device");
    }

    #[tokio::test]
    async fn should_return_new_state_when_turned_on() {
        let (state, _driver) = test_state(&["10.0.0.5"]).await;
        let app = build(state);

        let (status, body) = send(app.clone(), "POST", "/api/plugs/10.0.0.5/turn_on", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"], "on");

        let (_, plug) = send(app, "GET", "/api/plugs/10.0.0.5", None).await;
        assert_eq!(plug["state"], "on");
    }

    #[tokio::test]
    async fn should_flip_state_when_toggled() {
        let (state, _driver) = test_state(&["10.0.0.5"]).await;
        let app = build(state);
        send(app.clone(), "POST", "/api/plugs/10.0.0.5/turn_off", None).await;

        let (status, body) = send(app, "POST", "/api/plugs/10.0.0.5/toggle", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"], "on");
    }

    #[tokio::test]
    async fn should_return_bad_gateway_when_plug_is_unreachable() {
        let (state, driver) = test_state(&["10.0.0.9"]).await;
        driver.fail("10.0.0.9");
        let app = build(state);

        let (status, body) = send(app.clone(), "POST", "/api/plugs/10.0.0.9/turn_off", None).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["category"], "device_unreachable");

        let (_, plug) = send(app, "GET", "/api/plugs/10.0.0.9", None).await;
        assert_eq!(plug["state"], "unknown");
    }

    #[tokio::test]
    async fn should_report_status_when_checked() {
        let (state, _driver) = test_state(&["10.0.0.5"]).await;

        let (status, body) =
            send(build(state), "POST", "/api/plugs/10.0.0.5/check_status", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["address"], "10.0.0.5");
        assert_eq!(body["state"], "off");
    }
}

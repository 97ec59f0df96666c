//! In-memory driver and request helpers shared by the handler tests.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use plugwatch_app::coordinator::Coordinator;
use plugwatch_app::event_bus::InProcessEventBus;
use plugwatch_app::ports::PlugDriver;
use plugwatch_domain::error::DriverError;
use plugwatch_domain::plug::{DesiredState, PlugAddress, PlugPolicy, PlugState};
use plugwatch_domain::settings::{FleetSettings, PlugSettings};

use crate::state::AppState;

#[derive(Default)]
pub struct StubDriver {
    states: Mutex<HashMap<PlugAddress, PlugState>>,
    failing: Mutex<HashSet<PlugAddress>>,
}

impl StubDriver {
    pub fn fail(&self, address: &str) {
        self.failing.lock().unwrap().insert(PlugAddress::new(address));
    }

    fn check(&self, address: &PlugAddress) -> Result<(), DriverError> {
        if self.failing.lock().unwrap().contains(address) {
            return Err(DriverError::new(format!("no route to {address}")));
        }
        Ok(())
    }
}

impl PlugDriver for StubDriver {
    fn query(
        &self,
        address: &PlugAddress,
    ) -> impl Future<Output = Result<PlugState, DriverError>> + Send {
        let result = self.check(address).map(|()| {
            self.states
                .lock()
                .unwrap()
                .get(address)
                .copied()
                .unwrap_or(PlugState::Off)
        });
        async move { result }
    }

    fn set(
        &self,
        address: &PlugAddress,
        desired: DesiredState,
    ) -> impl Future<Output = Result<(), DriverError>> + Send {
        let result = self.check(address).map(|()| {
            self.states
                .lock()
                .unwrap()
                .insert(address.clone(), desired.into());
        });
        async move { result }
    }
}

pub async fn test_state(addresses: &[&str]) -> (AppState<Arc<StubDriver>>, Arc<StubDriver>) {
    let driver = Arc::new(StubDriver::default());
    let settings = FleetSettings {
        plugs: addresses
            .iter()
            .map(|address| PlugSettings {
                address: PlugAddress::new(*address),
                label: String::new(),
                icon: String::new(),
                policy: PlugPolicy::default(),
            })
            .collect(),
        ..FleetSettings::default()
    };
    let coordinator = Coordinator::new(
        Arc::clone(&driver),
        Arc::new(InProcessEventBus::new(64)),
        settings,
    )
    .unwrap();
    coordinator.start().await.unwrap();
    (AppState::new(Arc::new(coordinator)), driver)
}

/// Send a request and decode the JSON answer (`Null` for empty bodies).
pub async fn send(
    app: Router,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => request
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

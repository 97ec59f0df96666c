//! Scriptable in-memory driver shared by the unit tests of this crate.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::sync::Semaphore;

use plugwatch_domain::error::DriverError;
use plugwatch_domain::event::Event;
use plugwatch_domain::plug::{DesiredState, Plug, PlugAddress, PlugState};

use crate::event_bus::InProcessEventBus;
use crate::ports::PlugDriver;
use crate::registry::DeviceRegistry;

/// A call as observed by the driver, recorded when it starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverCall {
    Query(PlugAddress),
    Set(PlugAddress, DesiredState),
}

#[derive(Default)]
pub struct FakeDriver {
    states: Mutex<HashMap<PlugAddress, PlugState>>,
    failing: Mutex<HashSet<PlugAddress>>,
    hanging: Mutex<HashSet<PlugAddress>>,
    gates: Mutex<HashMap<PlugAddress, Arc<Semaphore>>>,
    calls: Mutex<Vec<DriverCall>>,
}

impl FakeDriver {
    pub fn with_state(self, address: &str, state: PlugState) -> Self {
        self.set_state(address, state);
        self
    }

    pub fn set_state(&self, address: &str, state: PlugState) {
        self.states
            .lock()
            .unwrap()
            .insert(PlugAddress::new(address), state);
    }

    /// Every call to `address` fails.
    pub fn fail(&self, address: &str) {
        self.failing.lock().unwrap().insert(PlugAddress::new(address));
    }

    /// Every call to `address` never returns.
    pub fn hang(&self, address: &str) {
        self.hanging.lock().unwrap().insert(PlugAddress::new(address));
    }

    /// Calls to `address` block until [`release`](Self::release) hands out permits.
    pub fn hold(&self, address: &str) {
        self.gates
            .lock()
            .unwrap()
            .insert(PlugAddress::new(address), Arc::new(Semaphore::new(0)));
    }

    pub fn release(&self, address: &str, permits: usize) {
        if let Some(gate) = self.gates.lock().unwrap().get(&PlugAddress::new(address)) {
            gate.add_permits(permits);
        }
    }

    pub fn calls(&self) -> Vec<DriverCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn set_calls(&self, address: &str) -> Vec<DesiredState> {
        let address = PlugAddress::new(address);
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                DriverCall::Set(a, desired) if a == address => Some(desired),
                _ => None,
            })
            .collect()
    }

    async fn enter(&self, call: DriverCall) -> Result<(), DriverError> {
        let address = match &call {
            DriverCall::Query(a) | DriverCall::Set(a, _) => a.clone(),
        };
        self.calls.lock().unwrap().push(call);

        let gate = self.gates.lock().unwrap().get(&address).cloned();
        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }
        let hangs = self.hanging.lock().unwrap().contains(&address);
        if hangs {
            std::future::pending::<()>().await;
        }
        let fails = self.failing.lock().unwrap().contains(&address);
        if fails {
            return Err(DriverError::new(format!("connection to {address} refused")));
        }
        Ok(())
    }
}

impl PlugDriver for FakeDriver {
    fn query(
        &self,
        address: &PlugAddress,
    ) -> impl Future<Output = Result<PlugState, DriverError>> + Send {
        let address = address.clone();
        async move {
            self.enter(DriverCall::Query(address.clone())).await?;
            Ok(self
                .states
                .lock()
                .unwrap()
                .get(&address)
                .copied()
                .unwrap_or_default())
        }
    }

    fn set(
        &self,
        address: &PlugAddress,
        desired: DesiredState,
    ) -> impl Future<Output = Result<(), DriverError>> + Send {
        let address = address.clone();
        async move {
            self.enter(DriverCall::Set(address.clone(), desired)).await?;
            self.states
                .lock()
                .unwrap()
                .insert(address, desired.into());
            Ok(())
        }
    }
}

pub type Bus = Arc<InProcessEventBus>;

pub fn bus() -> Bus {
    Arc::new(InProcessEventBus::new(256))
}

pub async fn registry_with(bus: &Bus, addresses: &[&str]) -> Arc<DeviceRegistry<Bus>> {
    let registry = Arc::new(DeviceRegistry::new(Arc::clone(bus)));
    for address in addresses {
        let plug = Plug::builder().address(*address).build().unwrap();
        registry.register(plug).await.unwrap();
    }
    registry
}

/// Drain every event currently buffered for `rx`.
pub fn drain(rx: &mut tokio::sync::broadcast::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Let spawned tasks run until they block again.
pub async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

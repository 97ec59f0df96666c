//! # plugwatch-adapter-virtual
//!
//! Virtual plug driver that simulates a fleet of network plugs for demos and
//! end-to-end tests.
//!
//! ## Behaviour
//!
//! | Situation | Result |
//! |-----------|--------|
//! | First contact with an address | a plug is provisioned in the `off` state |
//! | `query` | the simulated state |
//! | `set` | the simulated state is switched, then acknowledged |
//! | Address marked unreachable | [`VirtualPlugError::Unreachable`] |
//!
//! Every call waits for the configured latency first.
//!
//! ## Dependency rule
//!
//! Depends on `plugwatch-app` (port traits) and `plugwatch-domain` only.

mod plug;

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use plugwatch_app::ports::PlugDriver;
use plugwatch_domain::error::DriverError;
use plugwatch_domain::plug::{DesiredState, PlugAddress, PlugState};

pub use plug::VirtualPlug;

/// Failures reported by simulated plugs.
#[derive(Debug, thiserror::Error)]
pub enum VirtualPlugError {
    #[error("no answer from virtual plug at {address}")]
    Unreachable { address: PlugAddress },
}

/// Driver talking to simulated plugs.
#[derive(Default)]
pub struct VirtualPlugDriver {
    plugs: Mutex<HashMap<PlugAddress, VirtualPlug>>,
    unreachable: Mutex<HashSet<PlugAddress>>,
    latency: Duration,
}

impl VirtualPlugDriver {
    /// Create a driver answering after `latency`.
    #[must_use]
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    /// Provision a plug in the given state.
    #[must_use]
    pub fn with_plug(self, address: impl Into<PlugAddress>, state: DesiredState) -> Self {
        let address = address.into();
        self.lock_plugs()
            .insert(address.clone(), VirtualPlug::new(address, state));
        self
    }

    /// Make calls to `address` fail (or succeed again).
    pub fn set_unreachable(&self, address: impl Into<PlugAddress>, unreachable: bool) {
        let address = address.into();
        let mut set = self
            .unreachable
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if unreachable {
            set.insert(address);
        } else {
            set.remove(&address);
        }
    }

    /// Simulated state of a plug, `None` before first contact.
    #[must_use]
    pub fn plug_state(&self, address: &PlugAddress) -> Option<PlugState> {
        self.lock_plugs().get(address).map(VirtualPlug::state)
    }

    /// Number of `set` calls a plug has acknowledged.
    #[must_use]
    pub fn switch_count(&self, address: &PlugAddress) -> u64 {
        self.lock_plugs()
            .get(address)
            .map_or(0, VirtualPlug::switch_count)
    }

    async fn contact(&self, address: &PlugAddress) -> Result<(), DriverError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let unreachable = self
            .unreachable
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(address);
        if unreachable {
            tracing::debug!(%address, "virtual plug unreachable");
            return Err(DriverError::new(VirtualPlugError::Unreachable {
                address: address.clone(),
            }));
        }
        Ok(())
    }

    fn lock_plugs(&self) -> MutexGuard<'_, HashMap<PlugAddress, VirtualPlug>> {
        self.plugs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_plug_mut<T>(&self, address: &PlugAddress, f: impl FnOnce(&mut VirtualPlug) -> T) -> T {
        let mut plugs = self.lock_plugs();
        let plug = plugs.entry(address.clone()).or_insert_with(|| {
            tracing::debug!(%address, "provisioning virtual plug");
            VirtualPlug::new(address.clone(), DesiredState::Off)
        });
        f(plug)
    }
}

impl PlugDriver for VirtualPlugDriver {
    fn query(
        &self,
        address: &PlugAddress,
    ) -> impl Future<Output = Result<PlugState, DriverError>> + Send {
        async move {
            self.contact(address).await?;
            Ok(self.with_plug_mut(address, |plug| plug.state()))
        }
    }

    fn set(
        &self,
        address: &PlugAddress,
        desired: DesiredState,
    ) -> impl Future<Output = Result<(), DriverError>> + Send {
        async move {
            self.contact(address).await?;
            self.with_plug_mut(address, |plug| plug.switch(desired));
            Ok(())
        }
    }
}

//! Device registry — in-memory catalog of plugs and their last-known state.
//!
//! The registry does not serialize writers itself: callers guarantee a single
//! writer per address (the command lanes do). Locks are held only for the
//! duration of a lookup or a field write, never across an `.await`.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use plugwatch_domain::error::{PlugwatchError, UnknownDeviceError, ValidationError};
use plugwatch_domain::event::{Event, EventPayload};
use plugwatch_domain::plug::{Plug, PlugAddress, PlugPolicy, PlugState};

use crate::ports::EventPublisher;

/// Runtime catalog of registered plugs, in registration order.
pub struct DeviceRegistry<P> {
    plugs: RwLock<Vec<Plug>>,
    publisher: P,
}

impl<P: EventPublisher> DeviceRegistry<P> {
    /// Create an empty registry publishing through `publisher`.
    pub fn new(publisher: P) -> Self {
        Self {
            plugs: RwLock::new(Vec::new()),
            publisher,
        }
    }

    /// The publisher state changes are reported through.
    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    /// Add a plug to the catalog.
    ///
    /// # Errors
    ///
    /// Returns [`PlugwatchError::Validation`] when the plug is invalid or its
    /// address is already registered.
    #[tracing::instrument(skip(self, plug), fields(address = %plug.address))]
    pub async fn register(&self, plug: Plug) -> Result<Plug, PlugwatchError> {
        plug.validate()?;
        {
            let mut plugs = self.write();
            if plugs.iter().any(|p| p.address == plug.address) {
                return Err(ValidationError::DuplicateAddress(plug.address).into());
            }
            plugs.push(plug.clone());
        }
        tracing::debug!("plug registered");
        self.publisher
            .publish(Event::new(EventPayload::PlugRegistered { plug: plug.clone() }))
            .await;
        Ok(plug)
    }

    /// Remove a plug from the catalog, returning its last record.
    ///
    /// # Errors
    ///
    /// Returns [`PlugwatchError::UnknownDevice`] when the address is not registered.
    #[tracing::instrument(skip(self))]
    pub async fn unregister(&self, address: &PlugAddress) -> Result<Plug, PlugwatchError> {
        let removed = {
            let mut plugs = self.write();
            let index = plugs
                .iter()
                .position(|p| &p.address == address)
                .ok_or_else(|| unknown(address))?;
            plugs.remove(index)
        };
        tracing::debug!("plug unregistered");
        self.publisher
            .publish(Event::new(EventPayload::PlugUnregistered {
                address: address.clone(),
            }))
            .await;
        Ok(removed)
    }

    /// Look up a plug by address.
    ///
    /// # Errors
    ///
    /// Returns [`PlugwatchError::UnknownDevice`] when the address is not registered.
    pub fn get(&self, address: &PlugAddress) -> Result<Plug, PlugwatchError> {
        self.read()
            .iter()
            .find(|p| &p.address == address)
            .cloned()
            .ok_or_else(|| unknown(address))
    }

    #[must_use]
    pub fn contains(&self, address: &PlugAddress) -> bool {
        self.read().iter().any(|p| &p.address == address)
    }

    /// Snapshot of every plug, in registration order.
    #[must_use]
    pub fn list(&self) -> Vec<Plug> {
        self.read().clone()
    }

    /// Replace the configured attributes of a plug, keeping its runtime state.
    ///
    /// # Errors
    ///
    /// Returns [`PlugwatchError::UnknownDevice`] when the address is not registered.
    pub fn update_settings(
        &self,
        address: &PlugAddress,
        label: String,
        icon: String,
        policy: PlugPolicy,
    ) -> Result<Plug, PlugwatchError> {
        let mut plugs = self.write();
        let plug = plugs
            .iter_mut()
            .find(|p| &p.address == address)
            .ok_or_else(|| unknown(address))?;
        plug.label = label;
        plug.icon = icon;
        plug.policy = policy;
        Ok(plug.clone())
    }

    /// Record a new state for a plug and return the previous one.
    ///
    /// Publishes [`EventPayload::StateChanged`] if and only if the state
    /// actually changed.
    ///
    /// # Errors
    ///
    /// Returns [`PlugwatchError::UnknownDevice`] when the address is not registered.
    pub async fn update_state(
        &self,
        address: &PlugAddress,
        new_state: PlugState,
    ) -> Result<PlugState, PlugwatchError> {
        let previous = {
            let mut plugs = self.write();
            let plug = plugs
                .iter_mut()
                .find(|p| &p.address == address)
                .ok_or_else(|| unknown(address))?;
            std::mem::replace(&mut plug.state, new_state)
        };
        if previous != new_state {
            tracing::debug!(%address, from = %previous, to = %new_state, "plug state changed");
            self.publisher
                .publish(Event::new(EventPayload::StateChanged {
                    address: address.clone(),
                    from: previous,
                    to: new_state,
                }))
                .await;
        }
        Ok(previous)
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Plug>> {
        self.plugs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Plug>> {
        self.plugs.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn unknown(address: &PlugAddress) -> PlugwatchError {
    UnknownDeviceError {
        address: address.clone(),
    }
    .into()
}

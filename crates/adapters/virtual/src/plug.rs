//! Virtual plug — the simulated device behind one address.

use plugwatch_domain::plug::{DesiredState, PlugAddress, PlugState};

/// A simulated network plug.
#[derive(Debug, Clone)]
pub struct VirtualPlug {
    address: PlugAddress,
    state: DesiredState,
    switches: u64,
}

impl VirtualPlug {
    #[must_use]
    pub fn new(address: PlugAddress, state: DesiredState) -> Self {
        Self {
            address,
            state,
            switches: 0,
        }
    }

    #[must_use]
    pub fn address(&self) -> &PlugAddress {
        &self.address
    }

    /// A simulated plug always knows its own state.
    #[must_use]
    pub fn state(&self) -> PlugState {
        self.state.into()
    }

    /// Number of acknowledged switch commands, including no-op ones.
    #[must_use]
    pub fn switch_count(&self) -> u64 {
        self.switches
    }

    pub fn switch(&mut self, desired: DesiredState) {
        if self.state != desired {
            tracing::debug!(address = %self.address, from = %self.state, to = %desired, "virtual plug switched");
        }
        self.state = desired;
        self.switches += 1;
    }
}

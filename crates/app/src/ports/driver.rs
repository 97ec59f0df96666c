//! Driver port — the network capability that actually talks to a plug.
//!
//! Different plugs may use different wire protocols; the coordinator only
//! sees this opaque capability. Every call may block on network IO, so the
//! command lanes wrap each one in a timeout.

use std::future::Future;

use plugwatch_domain::error::DriverError;
use plugwatch_domain::plug::{DesiredState, PlugAddress, PlugState};

/// Query and switch the power state of a plug.
pub trait PlugDriver: Send + Sync {
    /// Read the current power state of the plug at `address`.
    fn query(
        &self,
        address: &PlugAddress,
    ) -> impl Future<Output = Result<PlugState, DriverError>> + Send;

    /// Switch the plug at `address` to `desired`, resolving once acknowledged.
    fn set(
        &self,
        address: &PlugAddress,
        desired: DesiredState,
    ) -> impl Future<Output = Result<(), DriverError>> + Send;
}

impl<T: PlugDriver> PlugDriver for std::sync::Arc<T> {
    fn query(
        &self,
        address: &PlugAddress,
    ) -> impl Future<Output = Result<PlugState, DriverError>> + Send {
        (**self).query(address)
    }

    fn set(
        &self,
        address: &PlugAddress,
        desired: DesiredState,
    ) -> impl Future<Output = Result<(), DriverError>> + Send {
        (**self).set(address, desired)
    }
}

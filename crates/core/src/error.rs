//! Error taxonomy shared by all transports
//!
//! Two families: [`ConnectionError`] for failures while opening and claiming
//! a device, [`CommunicationError`] for failures once a channel exists.
//! Hardware conditions with a known benign interpretation (already-closed
//! handle, disconnect mid-transfer, stall) are absorbed by the transports and
//! never show up here; these variants describe real operational problems.

use thiserror::Error;

/// A boxed underlying cause from the platform layer.
pub type Cause = Box<dyn std::error::Error + Send + Sync>;

/// Communication with the device could not be initiated.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The operating system refused to hand the device over. Usually another
    /// driver holds exclusive access; on Windows this typically means the
    /// bound driver must be replaced.
    #[error("operating system denied access to the device driver")]
    DriverAccessDenied,

    /// The device exposed no configuration/interface/alternate to talk
    /// through. Power-cycling the device sometimes clears this.
    #[error("device did not expose an endpoint to communicate with")]
    NoEndpointExposed,

    /// The device exposed endpoints, but none pointing towards it.
    #[error("device did not expose an output endpoint")]
    NoOutputEndpoint,

    /// Any other failure while opening or claiming the device.
    #[error("error connecting to device")]
    Other(#[source] Cause),
}

/// Communication with an established channel failed.
#[derive(Debug, Error)]
pub enum CommunicationError {
    /// The channel is disposed, disconnected, or lacks the endpoint needed
    /// for the requested direction. Not fatal: callers may retry once the
    /// device comes back.
    #[error("device is not ready to communicate")]
    NotReady,

    /// A transfer was attempted and the platform reported a failure.
    #[error("error communicating with device")]
    TransferFailed(#[source] Cause),
}

impl CommunicationError {
    /// Wrap an arbitrary cause as a failed transfer.
    pub fn transfer_failed(cause: impl Into<Cause>) -> Self {
        Self::TransferFailed(cause.into())
    }
}

//! Device metadata and the wrapper-device contract

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Basic metadata about a device, available before connecting to it.
///
/// Produced once per physical device at connect time and never mutated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInformation {
    /// The manufacturer, if the device reports one.
    pub manufacturer_name: Option<String>,
    /// The product name, if the device reports one.
    pub product_name: Option<String>,
    /// The device's unique serial number, if the device reports one.
    pub serial_number: Option<String>,
}

/// A device that can be connected to.
///
/// Implemented by the wrapper objects a device manager constructs around raw
/// hardware handles.
#[async_trait]
pub trait Device: Send + Sync {
    /// Whether the device is currently connected.
    fn connected(&self) -> bool;

    /// Resolves once the device is ready to be used. Returns `false` if the
    /// device failed to become ready.
    async fn ready(&self) -> bool;

    /// Close the connection to this device and clean up unmanaged resources.
    async fn dispose(&self);
}

/// A device lifecycle notification from a manager.
#[derive(Debug)]
pub enum DeviceEvent<TDevice> {
    /// The device is connected and ready to be interacted with.
    Connected(Arc<TDevice>),
    /// The device is no longer connected; its wrapper has been disposed.
    Disconnected(Arc<TDevice>),
}

impl<TDevice> Clone for DeviceEvent<TDevice> {
    fn clone(&self) -> Self {
        match self {
            Self::Connected(device) => Self::Connected(device.clone()),
            Self::Disconnected(device) => Self::Disconnected(device.clone()),
        }
    }
}

impl<TDevice> DeviceEvent<TDevice> {
    /// The device this event is for.
    pub fn device(&self) -> &Arc<TDevice> {
        match self {
            Self::Connected(device) | Self::Disconnected(device) => device,
        }
    }
}

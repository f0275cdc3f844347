//! Raw platform USB capability
//!
//! The core never talks to an operating system API directly. It consumes a
//! device through [`RawUsbDevice`] - the exact operation set the channel and
//! manager need, nothing more - and discovers devices through [`UsbHost`].
//! Platform backends implement these traits; tests use the doubles in
//! [`crate::testing`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Direction of an endpoint, from the host's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndpointDirection {
    /// Device to host.
    In,
    /// Host to device.
    Out,
}

/// A single endpoint advertised by a device alternate setting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsbEndpoint {
    /// The endpoint number within its direction.
    pub endpoint_number: u8,
    pub direction: EndpointDirection,
    /// The packet size this endpoint reports. Devices have been seen
    /// reporting zero here; consumers must fall back to a sane default.
    pub packet_size: usize,
}

/// An alternate setting of an interface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsbAlternate {
    pub endpoints: Vec<UsbEndpoint>,
}

/// An interface within a configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsbInterface {
    pub alternates: Vec<UsbAlternate>,
}

/// A configuration advertised by a device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsbConfiguration {
    pub interfaces: Vec<UsbInterface>,
}

/// The static descriptor fields of a USB device, read once at discovery.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsbDeviceDescriptor {
    pub vendor_id: u16,
    pub product_id: u16,
    pub device_class: u8,
    pub device_subclass: u8,
    pub device_protocol: u8,
    pub device_version_major: u8,
    pub device_version_minor: u8,
    pub device_version_subminor: u8,
    pub manufacturer_name: Option<String>,
    pub product_name: Option<String>,
    pub serial_number: Option<String>,
    pub configurations: Vec<UsbConfiguration>,
}

/// Completion status of a transfer that reached the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    /// The transfer completed normally.
    Ok,
    /// The endpoint stalled. The halt must be cleared before the endpoint
    /// will move data again.
    Stall,
    /// The device sent more data than the endpoint allows. Response data was
    /// likely lost.
    Babble,
}

/// Result of an inbound transfer.
#[derive(Debug, Clone)]
pub struct InTransferResult {
    pub status: TransferStatus,
    pub data: Vec<u8>,
}

/// Result of an outbound transfer.
#[derive(Debug, Clone, Copy)]
pub struct OutTransferResult {
    pub status: TransferStatus,
    pub bytes_written: usize,
}

/// Failures reported by the platform layer.
///
/// Everything the platform can signal is typed here; the channel translates
/// the variants with a known benign interpretation and wraps the rest.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RawDeviceError {
    /// The operating system denied access to the device, usually because
    /// another driver holds it exclusively.
    #[error("access to the device was denied by the operating system")]
    AccessDenied,

    /// The device disconnected, before or during the operation.
    #[error("the device has been disconnected")]
    Disconnected,

    /// A user-facing device selection was dismissed without picking one.
    #[error("no device was selected")]
    NoDeviceSelected,

    /// Any other platform failure.
    #[error("device operation failed: {0}")]
    Other(String),
}

/// The raw device capability the channel is built on.
///
/// Operations are invoked in a fixed sequence during connect: `open`,
/// `select_configuration`, `claim_interface`. Transfers and `clear_halt`
/// follow while connected, `close` ends it. Implementations are consumed
/// behind `Arc<dyn RawUsbDevice>`.
#[async_trait]
pub trait RawUsbDevice: Send + Sync {
    /// The device's static descriptor, including its configuration tree.
    fn descriptor(&self) -> &UsbDeviceDescriptor;

    /// Whether the underlying handle currently reports itself open.
    fn opened(&self) -> bool;

    async fn open(&self) -> Result<(), RawDeviceError>;

    async fn close(&self) -> Result<(), RawDeviceError>;

    async fn select_configuration(&self, value: u8) -> Result<(), RawDeviceError>;

    async fn claim_interface(&self, index: u8) -> Result<(), RawDeviceError>;

    async fn release_interface(&self, index: u8) -> Result<(), RawDeviceError>;

    /// Read up to `length` bytes from an IN endpoint.
    async fn transfer_in(
        &self,
        endpoint: u8,
        length: usize,
    ) -> Result<InTransferResult, RawDeviceError>;

    /// Write `data` to an OUT endpoint as a single transfer.
    async fn transfer_out(
        &self,
        endpoint: u8,
        data: &[u8],
    ) -> Result<OutTransferResult, RawDeviceError>;

    /// Clear a halt/stall condition on an endpoint.
    async fn clear_halt(
        &self,
        direction: EndpointDirection,
        endpoint: u8,
    ) -> Result<(), RawDeviceError>;
}

/// The host-side capability: enumeration and user-prompted device requests.
#[async_trait]
pub trait UsbHost: Send + Sync {
    /// All devices currently present that the host will let us see.
    async fn devices(&self) -> Vec<std::sync::Arc<dyn RawUsbDevice>>;

    /// Ask the user to pick a device matching the given filters.
    ///
    /// A dismissed prompt reports [`RawDeviceError::NoDeviceSelected`].
    async fn request_device(
        &self,
        options: &crate::filter::DeviceRequestOptions,
    ) -> Result<std::sync::Arc<dyn RawUsbDevice>, RawDeviceError>;
}

//! USB realization of the devmux channel contract
//!
//! This crate turns a raw platform USB handle into a
//! [`DeviceChannel`](devmux_core::DeviceChannel): it discovers the bulk
//! endpoint pair on the device's first interface, sizes receive transfers,
//! and translates hardware error conditions into the shared taxonomy. The
//! platform itself is consumed through the narrow [`RawUsbDevice`] and
//! [`UsbHost`] capability traits, so any backend (and any test double) that
//! satisfies them will do.
//!
//! [`UsbDeviceManager`] sits on top, deciding which physical devices to
//! adopt via the filter matcher and mapping each adopted handle to exactly
//! one wrapper object.

pub mod channel;
pub mod filter;
pub mod info;
pub mod manager;
pub mod raw;
pub mod testing;

pub use channel::UsbDeviceChannel;
pub use filter::{DeviceRequestOptions, UsbDeviceFilter, is_manageable_device};
pub use info::UsbDeviceInformation;
pub use manager::{DeviceFactory, UsbCommunicationOptions, UsbDeviceManager};
pub use raw::{
    EndpointDirection, InTransferResult, OutTransferResult, RawDeviceError, RawUsbDevice,
    TransferStatus, UsbAlternate, UsbConfiguration, UsbDeviceDescriptor, UsbEndpoint, UsbHost,
    UsbInterface,
};

//! USB device metadata

use devmux_core::DeviceInformation;
use serde::{Deserialize, Serialize};

use crate::raw::UsbDeviceDescriptor;

/// Device information extended with USB descriptor fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsbDeviceInformation {
    pub manufacturer_name: Option<String>,
    pub product_name: Option<String>,
    pub serial_number: Option<String>,
    pub device_class: u8,
    pub device_subclass: u8,
    pub device_protocol: u8,
    pub vendor_id: u16,
    pub product_id: u16,
    pub device_version_major: u8,
    pub device_version_minor: u8,
    pub device_version_subminor: u8,
}

impl UsbDeviceInformation {
    /// Snapshot the information out of a raw descriptor.
    pub fn from_descriptor(descriptor: &UsbDeviceDescriptor) -> Self {
        Self {
            manufacturer_name: descriptor.manufacturer_name.clone(),
            product_name: descriptor.product_name.clone(),
            serial_number: descriptor.serial_number.clone(),
            device_class: descriptor.device_class,
            device_subclass: descriptor.device_subclass,
            device_protocol: descriptor.device_protocol,
            vendor_id: descriptor.vendor_id,
            product_id: descriptor.product_id,
            device_version_major: descriptor.device_version_major,
            device_version_minor: descriptor.device_version_minor,
            device_version_subminor: descriptor.device_version_subminor,
        }
    }

    /// The transport-agnostic subset of this information.
    pub fn basic(&self) -> DeviceInformation {
        DeviceInformation {
            manufacturer_name: self.manufacturer_name.clone(),
            product_name: self.product_name.clone(),
            serial_number: self.serial_number.clone(),
        }
    }
}

impl From<&UsbDeviceDescriptor> for UsbDeviceInformation {
    fn from(descriptor: &UsbDeviceDescriptor) -> Self {
        Self::from_descriptor(descriptor)
    }
}

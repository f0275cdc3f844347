//! Device filter matching
//!
//! Decides whether a physical device is adopted by a manager. A filter's
//! defined fields must all equal the device's fields for the filter to
//! match; undefined fields are wildcards, so a blank filter matches every
//! device. A device is adopted when at least one inclusion filter matches
//! and no exclusion filter does. No inclusion filters means no devices.

use serde::{Deserialize, Serialize};

use crate::info::UsbDeviceInformation;

/// Fields a device must equal to match. All optional; undefined fields are
/// wildcards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsbDeviceFilter {
    pub vendor_id: Option<u16>,
    pub product_id: Option<u16>,
    pub class_code: Option<u8>,
    pub subclass_code: Option<u8>,
    pub protocol_code: Option<u8>,
    pub serial_number: Option<String>,
}

impl UsbDeviceFilter {
    /// A filter matching every device with the given vendor id.
    pub fn for_vendor(vendor_id: u16) -> Self {
        Self {
            vendor_id: Some(vendor_id),
            ..Self::default()
        }
    }

    /// Whether every defined field equals the device's corresponding field.
    /// Vacuously true for a filter with no defined fields.
    fn matches(&self, device: &UsbDeviceInformation) -> bool {
        self.vendor_id.is_none_or(|v| v == device.vendor_id)
            && self.product_id.is_none_or(|p| p == device.product_id)
            && self.class_code.is_none_or(|c| c == device.device_class)
            && self.subclass_code.is_none_or(|s| s == device.device_subclass)
            && self.protocol_code.is_none_or(|p| p == device.device_protocol)
            && self
                .serial_number
                .as_ref()
                .is_none_or(|s| Some(s) == device.serial_number.as_ref())
    }
}

/// Default inclusion filter vendor id (Epson) used when a caller supplies no
/// filters of their own.
pub const DEFAULT_VENDOR_ID: u16 = 0x04B8;

/// Which devices a manager pays attention to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRequestOptions {
    /// Inclusion filters. Empty means manage nothing.
    pub filters: Vec<UsbDeviceFilter>,
    /// Exclusion filters. A device matching any of these is never adopted.
    #[serde(default)]
    pub exclusion_filters: Vec<UsbDeviceFilter>,
}

impl Default for DeviceRequestOptions {
    fn default() -> Self {
        Self {
            filters: vec![UsbDeviceFilter::for_vendor(DEFAULT_VENDOR_ID)],
            exclusion_filters: Vec::new(),
        }
    }
}

/// Determine if a given device is allowed to be managed.
pub fn is_manageable_device(
    device: &UsbDeviceInformation,
    request_options: &DeviceRequestOptions,
) -> bool {
    // No filters, no devices.
    if request_options.filters.is_empty() {
        return false;
    }

    if !request_options.filters.iter().any(|f| f.matches(device)) {
        return false;
    }

    if request_options
        .exclusion_filters
        .iter()
        .any(|f| f.matches(device))
    {
        return false;
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(vendor_id: u16) -> UsbDeviceInformation {
        UsbDeviceInformation {
            vendor_id,
            product_id: 0x0202,
            device_class: 7,
            device_subclass: 1,
            device_protocol: 2,
            serial_number: Some("SN-1".into()),
            ..UsbDeviceInformation::default()
        }
    }

    fn options(filters: Vec<UsbDeviceFilter>) -> DeviceRequestOptions {
        DeviceRequestOptions {
            filters,
            exclusion_filters: Vec::new(),
        }
    }

    #[test]
    fn test_no_filters_rejects_everything() {
        assert!(!is_manageable_device(&device(0x1234), &options(Vec::new())));
    }

    #[test]
    fn test_blank_filter_accepts_everything() {
        let opts = options(vec![UsbDeviceFilter::default()]);
        assert!(is_manageable_device(&device(0x1234), &opts));
        assert!(is_manageable_device(&device(0x9999), &opts));
    }

    #[test]
    fn test_vendor_mismatch_rejects() {
        let opts = options(vec![UsbDeviceFilter::for_vendor(0x9999)]);
        assert!(!is_manageable_device(&device(0x1234), &opts));
    }

    #[test]
    fn test_any_matching_inclusion_filter_accepts() {
        let opts = options(vec![
            UsbDeviceFilter::for_vendor(0x9999),
            UsbDeviceFilter::for_vendor(0x1234),
        ]);
        assert!(is_manageable_device(&device(0x1234), &opts));
    }

    #[test]
    fn test_every_defined_field_must_match() {
        let filter = UsbDeviceFilter {
            vendor_id: Some(0x1234),
            product_id: Some(0xFFFF), // differs from the device
            ..UsbDeviceFilter::default()
        };
        assert!(!is_manageable_device(&device(0x1234), &options(vec![filter])));

        let filter = UsbDeviceFilter {
            vendor_id: Some(0x1234),
            product_id: Some(0x0202),
            class_code: Some(7),
            subclass_code: Some(1),
            protocol_code: Some(2),
            serial_number: Some("SN-1".into()),
        };
        assert!(is_manageable_device(&device(0x1234), &options(vec![filter])));
    }

    #[test]
    fn test_serial_number_mismatch_rejects() {
        let filter = UsbDeviceFilter {
            serial_number: Some("SN-2".into()),
            ..UsbDeviceFilter::default()
        };
        assert!(!is_manageable_device(&device(0x1234), &options(vec![filter])));
    }

    #[test]
    fn test_matching_exclusion_filter_rejects() {
        let opts = DeviceRequestOptions {
            filters: vec![UsbDeviceFilter::default()],
            exclusion_filters: vec![UsbDeviceFilter::for_vendor(0x1234)],
        };
        assert!(!is_manageable_device(&device(0x1234), &opts));
        assert!(is_manageable_device(&device(0x9999), &opts));
    }

    #[test]
    fn test_default_options_target_default_vendor() {
        let opts = DeviceRequestOptions::default();
        assert!(is_manageable_device(&device(DEFAULT_VENDOR_ID), &opts));
        assert!(!is_manageable_device(&device(0x1234), &opts));
    }
}

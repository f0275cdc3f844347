//! Test doubles for the raw USB capability
//!
//! Scripted implementations of [`RawUsbDevice`] and [`UsbHost`] so channel
//! and manager behavior can be exercised without hardware. Shipped as a
//! public module so downstream wrapper authors can use the same doubles.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::filter::DeviceRequestOptions;
use crate::raw::{
    EndpointDirection, InTransferResult, OutTransferResult, RawDeviceError, RawUsbDevice,
    TransferStatus, UsbAlternate, UsbConfiguration, UsbDeviceDescriptor, UsbEndpoint,
    UsbHost, UsbInterface,
};

/// Descriptor with a single configuration/interface/alternate carrying the
/// given endpoints.
pub fn descriptor_with_endpoints(
    vendor_id: u16,
    product_id: u16,
    endpoints: Vec<UsbEndpoint>,
) -> UsbDeviceDescriptor {
    UsbDeviceDescriptor {
        vendor_id,
        product_id,
        manufacturer_name: Some("Test Manufacturer".into()),
        product_name: Some("Test Product".into()),
        serial_number: Some(format!("SN{vendor_id:04X}{product_id:04X}")),
        configurations: vec![UsbConfiguration {
            interfaces: vec![UsbInterface {
                alternates: vec![UsbAlternate { endpoints }],
            }],
        }],
        ..UsbDeviceDescriptor::default()
    }
}

/// Descriptor for the common case: one bulk IN and one bulk OUT endpoint
/// with 64 byte packets.
pub fn bidirectional_descriptor(vendor_id: u16, product_id: u16) -> UsbDeviceDescriptor {
    descriptor_with_endpoints(
        vendor_id,
        product_id,
        vec![
            UsbEndpoint {
                endpoint_number: 1,
                direction: EndpointDirection::Out,
                packet_size: 64,
            },
            UsbEndpoint {
                endpoint_number: 2,
                direction: EndpointDirection::In,
                packet_size: 64,
            },
        ],
    )
}

/// Descriptor advertising only an output endpoint.
pub fn output_only_descriptor(vendor_id: u16, product_id: u16) -> UsbDeviceDescriptor {
    descriptor_with_endpoints(
        vendor_id,
        product_id,
        vec![UsbEndpoint {
            endpoint_number: 1,
            direction: EndpointDirection::Out,
            packet_size: 64,
        }],
    )
}

/// A scripted [`RawUsbDevice`].
///
/// Inbound transfers are served from a queue; with the queue exhausted the
/// device reads as idle and the transfer stays pending until more data is
/// queued or the device is closed, like real hardware. Everything else
/// records its arguments for later assertions. Error injection points cover
/// open, close and outbound transfers.
pub struct MockUsbDevice {
    descriptor: UsbDeviceDescriptor,
    opened: AtomicBool,
    open_error: Mutex<Option<RawDeviceError>>,
    close_error: Mutex<Option<RawDeviceError>>,
    out_error: Mutex<Option<RawDeviceError>>,
    in_results: Mutex<VecDeque<Result<InTransferResult, RawDeviceError>>>,
    sent: Mutex<Vec<Vec<u8>>>,
    cleared_halts: Mutex<Vec<(EndpointDirection, u8)>>,
    selected_configurations: Mutex<Vec<u8>>,
    claimed_interfaces: Mutex<Vec<u8>>,
    released_interfaces: Mutex<Vec<u8>>,
    requested_lengths: Mutex<Vec<usize>>,
    in_wakeup: tokio::sync::Notify,
}

impl MockUsbDevice {
    pub fn new(descriptor: UsbDeviceDescriptor) -> Self {
        Self {
            descriptor,
            opened: AtomicBool::new(false),
            open_error: Mutex::new(None),
            close_error: Mutex::new(None),
            out_error: Mutex::new(None),
            in_results: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
            cleared_halts: Mutex::new(Vec::new()),
            selected_configurations: Mutex::new(Vec::new()),
            claimed_interfaces: Mutex::new(Vec::new()),
            released_interfaces: Mutex::new(Vec::new()),
            requested_lengths: Mutex::new(Vec::new()),
            in_wakeup: tokio::sync::Notify::new(),
        }
    }

    /// Fail the next `open` with the given error.
    pub fn fail_open_with(self, error: RawDeviceError) -> Self {
        *self.open_error.lock().unwrap() = Some(error);
        self
    }

    /// Fail every `close` with the given error.
    pub fn fail_close_with(self, error: RawDeviceError) -> Self {
        *self.close_error.lock().unwrap() = Some(error);
        self
    }

    /// Fail every outbound transfer with the given error.
    pub fn fail_transfer_out_with(self, error: RawDeviceError) -> Self {
        *self.out_error.lock().unwrap() = Some(error);
        self
    }

    /// Queue a successful inbound transfer carrying `data`.
    pub fn queue_in_data(&self, data: Vec<u8>) {
        self.queue_in_result(Ok(InTransferResult {
            status: TransferStatus::Ok,
            data,
        }));
    }

    /// Queue an inbound transfer completing with a specific status.
    pub fn queue_in_status(&self, status: TransferStatus, data: Vec<u8>) {
        self.queue_in_result(Ok(InTransferResult { status, data }));
    }

    /// Queue an inbound transfer failing with a platform error.
    pub fn queue_in_error(&self, error: RawDeviceError) {
        self.queue_in_result(Err(error));
    }

    fn queue_in_result(&self, result: Result<InTransferResult, RawDeviceError>) {
        self.in_results.lock().unwrap().push_back(result);
        self.in_wakeup.notify_one();
    }

    /// Everything written through `transfer_out`, in order.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().unwrap().clone()
    }

    /// Every `clear_halt` call, in order.
    pub fn cleared_halts(&self) -> Vec<(EndpointDirection, u8)> {
        self.cleared_halts.lock().unwrap().clone()
    }

    pub fn selected_configurations(&self) -> Vec<u8> {
        self.selected_configurations.lock().unwrap().clone()
    }

    pub fn claimed_interfaces(&self) -> Vec<u8> {
        self.claimed_interfaces.lock().unwrap().clone()
    }

    pub fn released_interfaces(&self) -> Vec<u8> {
        self.released_interfaces.lock().unwrap().clone()
    }

    /// The transfer lengths requested through `transfer_in`, in order.
    pub fn requested_lengths(&self) -> Vec<usize> {
        self.requested_lengths.lock().unwrap().clone()
    }

    /// Simulate the physical device going away.
    pub fn unplug(&self) {
        self.opened.store(false, Ordering::Release);
        *self.close_error.lock().unwrap() = Some(RawDeviceError::Disconnected);
        self.in_wakeup.notify_one();
    }
}

#[async_trait]
impl RawUsbDevice for MockUsbDevice {
    fn descriptor(&self) -> &UsbDeviceDescriptor {
        &self.descriptor
    }

    fn opened(&self) -> bool {
        self.opened.load(Ordering::Acquire)
    }

    async fn open(&self) -> Result<(), RawDeviceError> {
        if let Some(error) = self.open_error.lock().unwrap().take() {
            return Err(error);
        }
        self.opened.store(true, Ordering::Release);
        Ok(())
    }

    async fn close(&self) -> Result<(), RawDeviceError> {
        if let Some(error) = self.close_error.lock().unwrap().clone() {
            return Err(error);
        }
        self.opened.store(false, Ordering::Release);
        // A close aborts any pending inbound transfer.
        self.in_wakeup.notify_one();
        Ok(())
    }

    async fn select_configuration(&self, value: u8) -> Result<(), RawDeviceError> {
        self.selected_configurations.lock().unwrap().push(value);
        Ok(())
    }

    async fn claim_interface(&self, index: u8) -> Result<(), RawDeviceError> {
        self.claimed_interfaces.lock().unwrap().push(index);
        Ok(())
    }

    async fn release_interface(&self, index: u8) -> Result<(), RawDeviceError> {
        self.released_interfaces.lock().unwrap().push(index);
        Ok(())
    }

    async fn transfer_in(
        &self,
        _endpoint: u8,
        length: usize,
    ) -> Result<InTransferResult, RawDeviceError> {
        self.requested_lengths.lock().unwrap().push(length);
        loop {
            if let Some(result) = self.in_results.lock().unwrap().pop_front() {
                return result;
            }
            if !self.opened() {
                // The handle went away under a pending transfer.
                return Err(RawDeviceError::Disconnected);
            }
            // Idle device: stay pending until data is queued or the handle
            // closes.
            self.in_wakeup.notified().await;
        }
    }

    async fn transfer_out(
        &self,
        _endpoint: u8,
        data: &[u8],
    ) -> Result<OutTransferResult, RawDeviceError> {
        if let Some(error) = self.out_error.lock().unwrap().clone() {
            return Err(error);
        }
        self.sent.lock().unwrap().push(data.to_vec());
        Ok(OutTransferResult {
            status: TransferStatus::Ok,
            bytes_written: data.len(),
        })
    }

    async fn clear_halt(
        &self,
        direction: EndpointDirection,
        endpoint: u8,
    ) -> Result<(), RawDeviceError> {
        self.cleared_halts.lock().unwrap().push((direction, endpoint));
        Ok(())
    }
}

/// A scripted [`UsbHost`].
pub struct MockUsbHost {
    devices: Mutex<Vec<Arc<dyn RawUsbDevice>>>,
    request_results: Mutex<VecDeque<Result<Arc<dyn RawUsbDevice>, RawDeviceError>>>,
}

impl MockUsbHost {
    pub fn new() -> Self {
        Self {
            devices: Mutex::new(Vec::new()),
            request_results: Mutex::new(VecDeque::new()),
        }
    }

    /// Make a device visible to enumeration.
    pub fn add_device(&self, device: Arc<dyn RawUsbDevice>) {
        self.devices.lock().unwrap().push(device);
    }

    /// Script the outcome of the next user device prompt.
    pub fn queue_request_result(&self, result: Result<Arc<dyn RawUsbDevice>, RawDeviceError>) {
        self.request_results.lock().unwrap().push_back(result);
    }
}

impl Default for MockUsbHost {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UsbHost for MockUsbHost {
    async fn devices(&self) -> Vec<Arc<dyn RawUsbDevice>> {
        self.devices.lock().unwrap().clone()
    }

    async fn request_device(
        &self,
        _options: &DeviceRequestOptions,
    ) -> Result<Arc<dyn RawUsbDevice>, RawDeviceError> {
        self.request_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(RawDeviceError::NoDeviceSelected))
    }
}

//! Integration tests for the USB device manager

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use devmux_core::{ConnectionError, Device, DeviceEvent};
use devmux_usb::manager::{DeviceFactory, UsbCommunicationOptions, UsbDeviceManager};
use devmux_usb::raw::{RawDeviceError, RawUsbDevice};
use devmux_usb::testing::{MockUsbDevice, MockUsbHost, bidirectional_descriptor};
use devmux_usb::{DeviceRequestOptions, UsbDeviceFilter};

/// Minimal wrapper device for manager tests.
#[derive(Debug)]
struct TestDevice {
    vendor_id: u16,
    disposed: AtomicBool,
}

#[async_trait]
impl Device for TestDevice {
    fn connected(&self) -> bool {
        !self.disposed.load(Ordering::Acquire)
    }

    async fn ready(&self) -> bool {
        true
    }

    async fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
    }
}

struct TestFactory {
    created: AtomicUsize,
}

impl TestFactory {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            created: AtomicUsize::new(0),
        })
    }

    fn created(&self) -> usize {
        self.created.load(Ordering::Acquire)
    }
}

#[async_trait]
impl DeviceFactory<TestDevice> for TestFactory {
    async fn create(
        &self,
        device: Arc<dyn RawUsbDevice>,
        _options: &UsbCommunicationOptions,
    ) -> Result<TestDevice, ConnectionError> {
        self.created.fetch_add(1, Ordering::AcqRel);
        Ok(TestDevice {
            vendor_id: device.descriptor().vendor_id,
            disposed: AtomicBool::new(false),
        })
    }
}

fn accept_all_options() -> UsbCommunicationOptions {
    UsbCommunicationOptions {
        request_options: DeviceRequestOptions {
            filters: vec![UsbDeviceFilter::default()],
            exclusion_filters: Vec::new(),
        },
        ..UsbCommunicationOptions::default()
    }
}

fn raw_device(vendor_id: u16, product_id: u16) -> Arc<dyn RawUsbDevice> {
    Arc::new(MockUsbDevice::new(bidirectional_descriptor(
        vendor_id, product_id,
    )))
}

fn manager_with(
    host: Arc<MockUsbHost>,
    factory: Arc<TestFactory>,
    options: UsbCommunicationOptions,
) -> UsbDeviceManager<TestDevice> {
    UsbDeviceManager::new(host, factory, options)
}

#[tokio::test]
async fn test_connect_adopts_matching_device_and_notifies_after_ready() {
    let factory = TestFactory::new();
    let manager = manager_with(Arc::new(MockUsbHost::new()), factory.clone(), accept_all_options());
    let mut events = manager.subscribe();

    manager
        .handle_connect(raw_device(0x04B8, 0x0202))
        .await
        .expect("connect should succeed");

    assert_eq!(factory.created(), 1);
    assert_eq!(manager.devices().await.len(), 1);

    let event = events.recv().await.expect("event should arrive");
    assert_eq!(event.device().vendor_id, 0x04B8);
    assert!(matches!(event, DeviceEvent::Connected(_)));
}

#[tokio::test]
async fn test_tracked_raw_handle_stays_alive_until_removed() {
    let factory = TestFactory::new();
    let manager = manager_with(Arc::new(MockUsbHost::new()), factory.clone(), accept_all_options());

    let device = raw_device(0x04B8, 0x0202);
    let liveness = Arc::downgrade(&device);
    manager.handle_connect(device).await.expect("connect");

    // The manager pins the raw handle while tracked, so its address cannot
    // be recycled and mistaken for a device we already wrapped.
    let raw = liveness.upgrade().expect("tracked raw handle should be alive");

    // A fresh handle still gets its own wrapper.
    manager
        .handle_connect(raw_device(0x04B8, 0x0303))
        .await
        .expect("connect");
    assert_eq!(factory.created(), 2);
    assert_eq!(manager.devices().await.len(), 2);

    // Removal releases the pin.
    manager.handle_disconnect(&raw).await;
    drop(raw);
    assert!(liveness.upgrade().is_none());
}

#[tokio::test]
async fn test_connect_ignores_filtered_device() {
    let factory = TestFactory::new();
    let options = UsbCommunicationOptions {
        request_options: DeviceRequestOptions {
            filters: vec![UsbDeviceFilter::for_vendor(0x9999)],
            exclusion_filters: Vec::new(),
        },
        ..UsbCommunicationOptions::default()
    };
    let manager = manager_with(Arc::new(MockUsbHost::new()), factory.clone(), options);

    manager
        .handle_connect(raw_device(0x1234, 0x0001))
        .await
        .expect("ignoring a device is not an error");

    assert_eq!(factory.created(), 0);
    assert!(manager.devices().await.is_empty());
}

#[tokio::test]
async fn test_connect_same_handle_twice_keeps_one_wrapper() {
    let factory = TestFactory::new();
    let manager = manager_with(Arc::new(MockUsbHost::new()), factory.clone(), accept_all_options());

    let device = raw_device(0x04B8, 0x0202);
    manager.handle_connect(device.clone()).await.expect("first connect");
    manager.handle_connect(device.clone()).await.expect("second connect");

    assert_eq!(factory.created(), 1);
    assert_eq!(manager.devices().await.len(), 1);
}

#[tokio::test]
async fn test_disconnect_removes_disposes_and_notifies() {
    let factory = TestFactory::new();
    let manager = manager_with(Arc::new(MockUsbHost::new()), factory.clone(), accept_all_options());

    let device = raw_device(0x04B8, 0x0202);
    manager.handle_connect(device.clone()).await.expect("connect");

    let mut events = manager.subscribe();
    manager.handle_disconnect(&device).await;

    assert!(manager.devices().await.is_empty());
    let event = events.recv().await.expect("event should arrive");
    match event {
        DeviceEvent::Disconnected(wrapper) => assert!(!wrapper.connected()),
        other => panic!("expected Disconnected event, got {other:?}"),
    }
}

#[tokio::test]
async fn test_disconnect_of_unknown_device_is_ignored() {
    let factory = TestFactory::new();
    let manager = manager_with(Arc::new(MockUsbHost::new()), factory.clone(), accept_all_options());
    let mut events = manager.subscribe();

    manager.handle_disconnect(&raw_device(0x04B8, 0x0202)).await;

    assert!(manager.devices().await.is_empty());
    assert!(matches!(
        events.try_recv(),
        Err(tokio::sync::broadcast::error::TryRecvError::Empty)
    ));
}

#[tokio::test]
async fn test_force_reconnect_disposes_old_and_adopts_present() {
    let factory = TestFactory::new();
    let host = Arc::new(MockUsbHost::new());
    let manager = manager_with(host.clone(), factory.clone(), accept_all_options());

    // One device tracked, which the host no longer reports.
    let stale = raw_device(0x04B8, 0x0001);
    manager.handle_connect(stale.clone()).await.expect("connect");
    let old_wrapper = manager.devices().await.pop().expect("tracked wrapper");

    // Two devices currently present.
    host.add_device(raw_device(0x04B8, 0x0002));
    host.add_device(raw_device(0x04B8, 0x0003));

    manager.force_reconnect().await;

    assert!(!old_wrapper.connected());
    assert_eq!(manager.devices().await.len(), 2);
    assert_eq!(factory.created(), 3);
}

#[tokio::test]
async fn test_prompt_adopts_selected_device() {
    let factory = TestFactory::new();
    let host = Arc::new(MockUsbHost::new());
    host.queue_request_result(Ok(raw_device(0x04B8, 0x0202)));
    let manager = manager_with(host, factory.clone(), accept_all_options());

    let connected = manager
        .prompt_for_new_device()
        .await
        .expect("prompt should succeed");
    assert!(connected);
    assert_eq!(manager.devices().await.len(), 1);
}

#[tokio::test]
async fn test_prompt_cancellation_is_false_not_an_error() {
    let factory = TestFactory::new();
    let host = Arc::new(MockUsbHost::new());
    host.queue_request_result(Err(RawDeviceError::NoDeviceSelected));
    let manager = manager_with(host, factory.clone(), accept_all_options());

    let connected = manager
        .prompt_for_new_device()
        .await
        .expect("cancellation is not an error");
    assert!(!connected);
    assert!(manager.devices().await.is_empty());
}

#[tokio::test]
async fn test_prompt_other_failures_propagate() {
    let factory = TestFactory::new();
    let host = Arc::new(MockUsbHost::new());
    host.queue_request_result(Err(RawDeviceError::Other("usb stack on fire".into())));
    let manager = manager_with(host, factory.clone(), accept_all_options());

    let err = manager
        .prompt_for_new_device()
        .await
        .expect_err("failure should propagate");
    assert!(matches!(err, ConnectionError::Other(_)));
}

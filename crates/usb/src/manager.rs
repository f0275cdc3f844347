//! USB device manager
//!
//! Tracks the set of adopted raw devices and maps each to exactly one
//! wrapper object. Connect notifications are gated by the filter matcher;
//! adoption is announced only once the wrapper reports itself ready, never
//! before. Disconnects remove, dispose, and announce; devices we never
//! adopted are silently ignored.
//!
//! Managers announce adoption and removal over a typed broadcast bus rather
//! than inheriting from any event-emitter machinery. If you instantiate
//! multiple managers, give them disjoint filters - otherwise they will start
//! managing each other's devices.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use devmux_core::{CommunicationOptions, ConnectionError, Device, DeviceEvent};
use futures::future::join_all;
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info};

use crate::filter::{DeviceRequestOptions, is_manageable_device};
use crate::info::UsbDeviceInformation;
use crate::raw::{RawDeviceError, RawUsbDevice, UsbHost};

/// Communication options extended with the filters describing which USB
/// devices to pay attention to.
#[derive(Debug, Clone, Default)]
pub struct UsbCommunicationOptions {
    pub comm: CommunicationOptions,
    pub request_options: DeviceRequestOptions,
}

/// Constructs the wrapper object for a newly adopted raw device.
#[async_trait]
pub trait DeviceFactory<TDevice>: Send + Sync {
    async fn create(
        &self,
        device: Arc<dyn RawUsbDevice>,
        options: &UsbCommunicationOptions,
    ) -> Result<TDevice, ConnectionError>;
}

/// Stable key for a tracked raw device, derived from its handle identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct DeviceKey(usize);

impl DeviceKey {
    fn for_device(device: &Arc<dyn RawUsbDevice>) -> Self {
        Self(Arc::as_ptr(device) as *const () as usize)
    }
}

struct TrackedDevice<TDevice> {
    /// The raw handle itself. Held for as long as the device is tracked so
    /// the address its key is derived from cannot be recycled for a
    /// different physical device.
    raw: Arc<dyn RawUsbDevice>,
    wrapper: Arc<TDevice>,
}

/// Handles USB device adoption and removal for one family of devices.
pub struct UsbDeviceManager<TDevice> {
    host: Arc<dyn UsbHost>,
    factory: Arc<dyn DeviceFactory<TDevice>>,
    options: UsbCommunicationOptions,
    /// Tracked devices, keyed by raw handle identity. At most one wrapper
    /// per raw handle, enforced by inserting under the same lock as the
    /// lookup.
    devices: Mutex<HashMap<DeviceKey, TrackedDevice<TDevice>>>,
    events: broadcast::Sender<DeviceEvent<TDevice>>,
}

impl<TDevice: Device + 'static> UsbDeviceManager<TDevice> {
    /// Create a manager over a host capability and a wrapper factory.
    pub fn new(
        host: Arc<dyn UsbHost>,
        factory: Arc<dyn DeviceFactory<TDevice>>,
        options: UsbCommunicationOptions,
    ) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            host,
            factory,
            options,
            devices: Mutex::new(HashMap::new()),
            events,
        }
    }

    /// Subscribe to adoption and removal notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent<TDevice>> {
        self.events.subscribe()
    }

    /// The communication options this manager hands to its wrappers.
    pub fn options(&self) -> &UsbCommunicationOptions {
        &self.options
    }

    /// Snapshot of the currently tracked wrapper objects.
    pub async fn devices(&self) -> Vec<Arc<TDevice>> {
        self.devices
            .lock()
            .await
            .values()
            .map(|entry| entry.wrapper.clone())
            .collect()
    }

    /// Handler for device connection notifications.
    ///
    /// Devices the filter matcher rejects are ignored. A device already
    /// tracked is not wrapped a second time; its existing wrapper is
    /// re-announced once ready.
    pub async fn handle_connect(
        &self,
        device: Arc<dyn RawUsbDevice>,
    ) -> Result<(), ConnectionError> {
        let usb_info: UsbDeviceInformation = device.descriptor().into();
        if !is_manageable_device(&usb_info, &self.options.request_options) {
            // Whatever device this is, it isn't one we'd ask the user to
            // connect to. We shouldn't attempt to talk to it.
            debug!(
                "ignoring device not matching filters: vid={:#06x} pid={:#06x}",
                usb_info.vendor_id, usb_info.product_id
            );
            return Ok(());
        }

        let key = DeviceKey::for_device(&device);

        // The construct happens under the table lock so a concurrent
        // notification for the same handle cannot produce a second wrapper.
        let wrapper = {
            let mut devices = self.devices.lock().await;
            match devices.get(&key) {
                Some(entry) => entry.wrapper.clone(),
                None => {
                    let wrapper =
                        Arc::new(self.factory.create(device.clone(), &self.options).await?);
                    devices.insert(
                        key,
                        TrackedDevice {
                            raw: device,
                            wrapper: wrapper.clone(),
                        },
                    );
                    wrapper
                }
            }
        };

        // Don't notify that the device exists until it's ready to exist.
        wrapper.ready().await;

        info!(
            "adopted device: vid={:#06x} pid={:#06x}",
            usb_info.vendor_id, usb_info.product_id
        );
        let _ = self.events.send(DeviceEvent::Connected(wrapper));
        Ok(())
    }

    /// Handler for device disconnection notifications. Unknown devices are
    /// silently ignored.
    pub async fn handle_disconnect(&self, device: &Arc<dyn RawUsbDevice>) {
        let key = DeviceKey::for_device(device);
        let entry = self.devices.lock().await.remove(&key);
        let Some(entry) = entry else {
            return;
        };

        entry.wrapper.dispose().await;

        let usb_info: UsbDeviceInformation = entry.raw.descriptor().into();
        info!(
            "removed disconnected device: vid={:#06x} pid={:#06x}",
            usb_info.vendor_id, usb_info.product_id
        );
        let _ = self.events.send(DeviceEvent::Disconnected(entry.wrapper));
    }

    /// Disconnect then reconnect all devices.
    ///
    /// Every previously tracked wrapper is disposed concurrently, then the
    /// host's currently present devices are re-adopted concurrently.
    pub async fn force_reconnect(&self) {
        let old_wrappers: Vec<Arc<TDevice>> = {
            let mut devices = self.devices.lock().await;
            devices.drain().map(|(_, entry)| entry.wrapper).collect()
        };
        join_all(old_wrappers.iter().map(|wrapper| wrapper.dispose())).await;

        let present = self.host.devices().await;
        let results = join_all(
            present
                .into_iter()
                .map(|device| self.handle_connect(device)),
        )
        .await;

        for result in results {
            if let Err(err) = result {
                debug!("device failed to reconnect: {err}");
            }
        }
    }

    /// Ask the user to connect to a device matching this manager's filters.
    ///
    /// Returns `false` when the user dismisses the prompt without picking a
    /// device; any other failure propagates.
    pub async fn prompt_for_new_device(&self) -> Result<bool, ConnectionError> {
        let device = match self
            .host
            .request_device(&self.options.request_options)
            .await
        {
            Ok(device) => device,
            Err(RawDeviceError::NoDeviceSelected) => return Ok(false),
            Err(err) => return Err(ConnectionError::Other(Box::new(err))),
        };

        self.handle_connect(device).await?;
        Ok(true)
    }
}

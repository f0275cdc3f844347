//! USB device channel
//!
//! Wraps a raw USB handle as a [`DeviceChannel`]. Connecting walks the fixed
//! sequence - check the descriptor tree, open, select the first
//! configuration, claim interface 0, classify endpoints - and any failure
//! along the way triggers a best-effort close before the error surfaces.
//! Most devices put one bulk IN and one bulk OUT endpoint on their first
//! interface; the poorer the device, the more this layout drifts, so the
//! endpoints are discovered rather than assumed.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use devmux_core::{
    ChannelType, CommunicationError, CommunicationOptions, ConnectionDirectionMode,
    ConnectionError, DeviceChannel, DeviceInformation,
};
use tracing::{debug, error, warn};

use crate::info::UsbDeviceInformation;
use crate::raw::{EndpointDirection, RawDeviceError, RawUsbDevice, TransferStatus, UsbEndpoint};

/// Library default for the receive transfer size when the caller gives no
/// override.
const DEFAULT_MAX_RECEIVE: usize = 4096;

/// Fallback packet size for endpoints reporting a non-positive one. 64 is
/// the common USB bulk packet size.
const DEFAULT_PACKET_SIZE: usize = 64;

/// Number of bytes to request per receive transfer: the largest whole
/// multiple of the device's packet size that fits in the effective maximum.
fn transfer_length(max_receive: Option<usize>, device_packet: Option<usize>) -> usize {
    // Common case shortcut: no override and a standard bulk endpoint gets
    // exactly the default, with no rounding surprises.
    if max_receive.is_none() && device_packet == Some(DEFAULT_PACKET_SIZE) {
        return DEFAULT_MAX_RECEIVE;
    }

    let max_packet = match max_receive {
        Some(max) if max > 0 => max,
        _ => DEFAULT_MAX_RECEIVE,
    };

    let device_packet_size = match device_packet {
        Some(size) if size > 0 => size,
        _ => DEFAULT_PACKET_SIZE,
    };

    device_packet_size * (max_packet / device_packet_size)
}

/// Derive the direction mode from which endpoints were discovered.
fn comm_mode(output: bool, input: bool) -> ConnectionDirectionMode {
    if !output {
        // Can't talk to something that isn't listening.
        return ConnectionDirectionMode::None;
    }
    if !input {
        return ConnectionDirectionMode::Unidirectional;
    }
    ConnectionDirectionMode::Bidirectional
}

/// A channel for communicating with a device over USB.
///
/// Owned exclusively by its consumer. Disposal is idempotent and
/// irreversible; a disposed channel reports itself disconnected forever.
pub struct UsbDeviceChannel {
    device: Arc<dyn RawUsbDevice>,
    endpoint_in: Option<UsbEndpoint>,
    endpoint_out: UsbEndpoint,
    options: CommunicationOptions,
    comm_mode: ConnectionDirectionMode,
    disposed: AtomicBool,
}

impl std::fmt::Debug for UsbDeviceChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsbDeviceChannel")
            .field("endpoint_in", &self.endpoint_in)
            .field("endpoint_out", &self.endpoint_out)
            .field("options", &self.options)
            .field("comm_mode", &self.comm_mode)
            .field("disposed", &self.disposed)
            .finish_non_exhaustive()
    }
}

impl UsbDeviceChannel {
    /// Open and claim `device`, discover its endpoint pair, and return a
    /// ready channel.
    ///
    /// On any failure the device is closed best-effort before the error is
    /// returned.
    pub async fn connect(
        device: Arc<dyn RawUsbDevice>,
        options: CommunicationOptions,
    ) -> Result<Self, ConnectionError> {
        match Self::negotiate(device.as_ref()).await {
            Ok((endpoint_in, endpoint_out)) => {
                let mode = comm_mode(true, endpoint_in.is_some());
                if options.debug {
                    debug!("comm mode with device is {:?}", mode);
                }
                Ok(Self {
                    device,
                    endpoint_in,
                    endpoint_out,
                    options,
                    comm_mode: mode,
                    disposed: AtomicBool::new(false),
                })
            }
            Err(err) => {
                // Best-effort cleanup; the connect error is what matters.
                if let Err(close_err) = device.close().await
                    && close_err != RawDeviceError::Disconnected
                {
                    debug!("cleanup close after failed connect also failed: {close_err}");
                }
                Err(err)
            }
        }
    }

    /// Run the fixed connect sequence and classify the endpoints of the
    /// first configuration/interface/alternate.
    async fn negotiate(
        device: &dyn RawUsbDevice,
    ) -> Result<(Option<UsbEndpoint>, UsbEndpoint), ConnectionError> {
        let descriptor = device.descriptor();
        let Some(alternate) = descriptor
            .configurations
            .first()
            .and_then(|c| c.interfaces.first())
            .and_then(|i| i.alternates.first())
        else {
            // Can't talk to the device at all. This is a hardware problem;
            // power-cycling the device sometimes clears it.
            return Err(ConnectionError::NoEndpointExposed);
        };

        device.open().await.map_err(|err| match err {
            // The OS (usually on Windows) holds exclusive access and won't
            // let us take control. Distinct from a generic failure so callers
            // can suggest replacing the driver.
            RawDeviceError::AccessDenied => ConnectionError::DriverAccessDenied,
            other => ConnectionError::Other(Box::new(other)),
        })?;

        device
            .select_configuration(1)
            .await
            .map_err(|err| ConnectionError::Other(Box::new(err)))?;
        device
            .claim_interface(0)
            .await
            .map_err(|err| ConnectionError::Other(Box::new(err)))?;

        let mut input = None;
        let mut output = None;
        for endpoint in &alternate.endpoints {
            match endpoint.direction {
                EndpointDirection::Out => output = Some(endpoint.clone()),
                EndpointDirection::In => input = Some(endpoint.clone()),
            }
        }

        // Some devices omit advertising one of the endpoints. A missing
        // output is fatal; a missing input degrades to unidirectional.
        let output = output.ok_or(ConnectionError::NoOutputEndpoint)?;
        if input.is_none() {
            warn!("USB device did not expose an input endpoint, using unidirectional mode");
        }

        Ok((input, output))
    }

    /// Full USB information for the device on this channel.
    pub fn usb_device_info(&self) -> UsbDeviceInformation {
        UsbDeviceInformation::from_descriptor(self.device.descriptor())
    }

    fn is_connected(&self) -> bool {
        !self.disposed.load(Ordering::Acquire) && self.device.opened()
    }
}

#[async_trait]
impl DeviceChannel for UsbDeviceChannel {
    fn channel_type(&self) -> ChannelType {
        ChannelType::Usb
    }

    fn comm_mode(&self) -> ConnectionDirectionMode {
        self.comm_mode
    }

    fn connected(&self) -> bool {
        self.is_connected()
    }

    fn device_info(&self) -> DeviceInformation {
        self.usb_device_info().basic()
    }

    async fn send(&self, data: &[u8]) -> Result<(), CommunicationError> {
        if !self.is_connected() {
            return Err(CommunicationError::NotReady);
        }

        if self.options.debug {
            debug!("sending {} byte command buffer to device", data.len());
        }

        match self
            .device
            .transfer_out(self.endpoint_out.endpoint_number, data)
            .await
        {
            Ok(result) => {
                if self.options.debug {
                    debug!("completed sending commands, wrote {} bytes", result.bytes_written);
                }
                Ok(())
            }
            Err(err) => Err(CommunicationError::TransferFailed(Box::new(err))),
        }
    }

    async fn receive(&self) -> Result<Vec<Vec<u8>>, CommunicationError> {
        let Some(endpoint_in) = &self.endpoint_in else {
            return Err(CommunicationError::NotReady);
        };
        if !self.is_connected() {
            return Err(CommunicationError::NotReady);
        }

        let length = transfer_length(
            self.options.max_receive_packet_size,
            Some(endpoint_in.packet_size),
        );

        let result = match self
            .device
            .transfer_in(endpoint_in.endpoint_number, length)
            .await
        {
            Ok(result) => result,
            // The device went away mid-transfer. Benign: report not-ready
            // and let the consumer decide whether to give up.
            Err(RawDeviceError::Disconnected) => return Err(CommunicationError::NotReady),
            Err(err) => return Err(CommunicationError::TransferFailed(Box::new(err))),
        };

        match result.status {
            TransferStatus::Stall => {
                error!(
                    "USB device gave 'stall' error on receipt of data, clearing the halt to reset the endpoint; this may indicate a problem with the device"
                );
                if let Err(err) = self
                    .device
                    .clear_halt(EndpointDirection::In, endpoint_in.endpoint_number)
                    .await
                {
                    warn!("failed to clear halt on input endpoint: {err}");
                }
            }
            TransferStatus::Babble => {
                error!(
                    "USB device gave 'babble' error on receipt of data, response data was likely lost; this may indicate an issue with the device"
                );
            }
            TransferStatus::Ok => {}
        }

        if result.data.is_empty() {
            return Ok(Vec::new());
        }

        Ok(vec![result.data])
    }

    async fn dispose(&self) -> Result<(), CommunicationError> {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        match self.device.close().await {
            Ok(()) => Ok(()),
            // Device was already gone; closing it is a no-op, not a failure.
            Err(RawDeviceError::Disconnected) => Ok(()),
            Err(err) => Err(CommunicationError::TransferFailed(Box::new(err))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_length_default_case() {
        // No override with the standard bulk packet size is exactly the
        // library default.
        assert_eq!(transfer_length(None, Some(64)), 4096);
    }

    #[test]
    fn test_transfer_length_rounds_down_to_packet_multiple() {
        assert_eq!(transfer_length(Some(100), Some(64)), 64);
        assert_eq!(transfer_length(Some(8192), Some(64)), 8192);
        assert_eq!(transfer_length(Some(1000), Some(512)), 512);
    }

    #[test]
    fn test_transfer_length_non_positive_override_falls_back() {
        assert_eq!(transfer_length(Some(0), Some(64)), 4096);
    }

    #[test]
    fn test_transfer_length_non_positive_packet_size_falls_back() {
        // A zero packet size is treated as the common 64.
        assert_eq!(transfer_length(Some(100), Some(0)), 64);
        assert_eq!(transfer_length(None, Some(0)), 4096);
        assert_eq!(transfer_length(None, None), 4096);
    }

    #[test]
    fn test_comm_mode() {
        assert_eq!(comm_mode(false, false), ConnectionDirectionMode::None);
        assert_eq!(comm_mode(false, true), ConnectionDirectionMode::None);
        assert_eq!(comm_mode(true, false), ConnectionDirectionMode::Unidirectional);
        assert_eq!(comm_mode(true, true), ConnectionDirectionMode::Bidirectional);
    }
}

//! The device channel contract
//!
//! Every transport satisfies [`DeviceChannel`]: a connected, exclusively
//! owned pipe to one physical device. Channels are not safe for concurrent
//! use by multiple readers; the intended shape is one
//! [`InputMessageListener`](crate::listener::InputMessageListener) draining
//! `receive` while direct callers use `send`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::device::DeviceInformation;
use crate::error::CommunicationError;

/// Possible ways to communicate with a device.
///
/// Only USB has a concrete channel today; the other tags are extension
/// points for future transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelType {
    Usb,
    Serial,
    Bluetooth,
    Network,
}

/// Whether data can be transmitted to, and received from, the device.
///
/// Derived from which endpoints were discovered during connect and fixed for
/// the channel's lifetime. A channel that loses an endpoint is considered
/// disconnected, never downgraded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionDirectionMode {
    /// No usable endpoints. Should not occur on a connected channel.
    #[default]
    None,
    /// Commands can be sent but nothing comes back. Operating in the blind.
    Unidirectional,
    /// Full two-way communication.
    Bidirectional,
}

/// Default number of milliseconds to wait for messages from a device before
/// assuming it is done talking.
pub const DEFAULT_MESSAGE_WAIT_TIMEOUT_MS: u64 = 500;

/// Behavior options when communicating with a device. Immutable per channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommunicationOptions {
    /// Whether to emit verbose per-transfer debug logging.
    #[serde(default)]
    pub debug: bool,

    /// Milliseconds to wait for messages from a device before assuming it's
    /// done talking.
    #[serde(default = "default_message_wait_timeout_ms")]
    pub message_wait_timeout_ms: u64,

    /// Upper bound on the payload requested per receive transfer. Unset
    /// means the library default of 4096 bytes.
    #[serde(default)]
    pub max_receive_packet_size: Option<usize>,
}

fn default_message_wait_timeout_ms() -> u64 {
    DEFAULT_MESSAGE_WAIT_TIMEOUT_MS
}

impl Default for CommunicationOptions {
    fn default() -> Self {
        Self {
            debug: false,
            message_wait_timeout_ms: DEFAULT_MESSAGE_WAIT_TIMEOUT_MS,
            max_receive_packet_size: None,
        }
    }
}

/// A communication channel for talking to a device.
#[async_trait]
pub trait DeviceChannel: Send + Sync {
    /// This channel's transport type.
    fn channel_type(&self) -> ChannelType;

    /// The mode the communication is set up as.
    fn comm_mode(&self) -> ConnectionDirectionMode;

    /// Whether the device is connected: not disposed and the underlying
    /// handle reports itself open.
    fn connected(&self) -> bool;

    /// Basic information for the device connected on this channel.
    fn device_info(&self) -> DeviceInformation;

    /// Send a series of commands to the device as a single outbound
    /// transfer.
    async fn send(&self, data: &[u8]) -> Result<(), CommunicationError>;

    /// Request data from the device. An idle device yields an empty batch,
    /// not an error.
    async fn receive(&self) -> Result<Vec<Vec<u8>>, CommunicationError>;

    /// Close the channel, disallowing future communication. Idempotent and
    /// irreversible.
    async fn dispose(&self) -> Result<(), CommunicationError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = CommunicationOptions::default();
        assert!(!options.debug);
        assert_eq!(options.message_wait_timeout_ms, 500);
        assert_eq!(options.max_receive_packet_size, None);
    }

    #[test]
    fn test_options_deserialize_with_defaults() {
        let options: CommunicationOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options.message_wait_timeout_ms, 500);
    }
}

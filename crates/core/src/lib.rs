//! Transport-agnostic core for devmux
//!
//! This crate defines the pieces every transport shares: the device channel
//! contract, the error taxonomy, basic device metadata, and the input message
//! listener that reassembles fragmented responses from slow or chatty
//! hardware. Concrete transports (USB today, Serial/Bluetooth/Network as
//! future channel types) build on these in their own crates.

pub mod channel;
pub mod device;
pub mod error;
pub mod listener;
pub mod logging;

pub use channel::{ChannelType, CommunicationOptions, ConnectionDirectionMode, DeviceChannel};
pub use device::{Device, DeviceEvent, DeviceInformation};
pub use error::{CommunicationError, ConnectionError};
pub use listener::{DataProvider, HandlerResponse, InputHandler, InputMessageListener};
pub use logging::setup_logging;

//! The OneTouch link layer: framing, CRC, the stop-and-wait sequence
//! state machine, timing discipline and bounded retry, and the
//! command-transaction primitive built on top of it.
//!
//! Everything above this (what a request payload means, how a reply
//! is decoded, the CLI) is out of scope for this crate; it only ever
//! moves opaque byte buffers in and out.

mod crc;
pub mod error;
pub mod frame;
mod link;
mod state;
pub mod timing;
pub mod transport;

pub use error::LinkError;
pub use frame::Message;
pub use link::Link;
pub use transport::{ReadByteError, Transport};

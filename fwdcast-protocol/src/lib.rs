//! Wire protocol shared between the fwdcast Relay and Origin.
//!
//! Every frame exchanged over the Origin↔Relay duplex channel is a single
//! JSON text record discriminated by a `type` tag. This crate owns the
//! frame shapes, their encode/decode, and the validation that keeps a
//! malformed or out-of-range record from ever reaching either side's
//! business logic.

mod error;
mod frame;

pub use error::{ProtocolError, Result};
pub use frame::{Frame, Method};

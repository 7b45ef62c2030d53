//! A2A session wire protocol: typed events + run envelope.
//!
//! This crate defines the wire shape of the messages exchanged between an
//! agent and its environment over the session bus. It does not depend on
//! shuttle; shuttle bridges its runtime events into [`WireEvent`] values and
//! wraps them with [`Envelope`] before they go on the wire.

pub mod envelope;
pub mod event;

pub use envelope::Envelope;
pub use event::{parse_envelope, WireError, WireEvent, WireToolCall, WireToolResult};

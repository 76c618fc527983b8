//! cosync-runtime: message types and the runtime client boundary
//!
//! This crate defines the in-memory message model, the wire format exchanged
//! with the conversational service, the pure conversions between the two,
//! and the [`RuntimeClient`] capability used to open streamed completions.

pub mod client;
pub mod convert;
pub mod error;
pub mod stream;
pub mod types;
pub mod wire;

pub use client::{RuntimeClient, RuntimeRequest, Script, ScriptStep, ScriptedClient, ScriptedResponse};
pub use convert::{collapse_adjacent_agent_state, to_app_messages, to_wire_messages};
pub use error::{Error, Result};
pub use stream::{IncrementStream, ResponseIncrement};
pub use types::*;
pub use wire::{FragmentBody, FragmentStatus, WireFragment, WireMessage};

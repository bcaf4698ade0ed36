//! Shared data model for the Vocalink call platform.
//!
//! Defines the types that flow between the pipeline stages of one call
//! session: role-tagged conversation turns, partial responses cut from a
//! streamed model reply, synthesized audio units, and the transport event
//! protocol spoken on the media-stream WebSocket.
//!
//! These types are deliberately free of any runtime or provider concerns so
//! that every crate in the workspace can depend on them.

pub mod conversation;
pub mod speech;
pub mod transport;
pub mod voice;

pub use conversation::{Role, Turn};
pub use speech::{AudioUnit, PartialResponse};
pub use transport::{CallIds, MarkName, MediaPayload, OutboundFrame, StartMeta, TransportEvent};
pub use voice::VoiceSelector;

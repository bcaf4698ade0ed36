//! Provider clients for the Vocalink pipeline boundaries.
//!
//! Implements the `vocalink-pipeline` provider traits against real
//! services: an OpenAI-compatible streaming chat endpoint, a
//! Deepgram-style live transcription WebSocket, an ElevenLabs-style
//! synthesis endpoint, and the read-only records service consulted at
//! session start. Everything provider-specific — framing, encoding,
//! endpoints, authentication — stays inside this crate.

pub mod chat;
pub mod records;
pub mod stt;
pub mod tts;

pub use chat::ChatClient;
pub use records::RecordsClient;
pub use stt::StreamingSttClient;
pub use tts::TtsClient;

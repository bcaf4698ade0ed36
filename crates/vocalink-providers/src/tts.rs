//! Text-to-speech client.
//!
//! ElevenLabs-style HTTP synthesis: text plus a voice selector in, audio
//! bytes out, already encoded for the telephony leg via the
//! `output_format` query parameter.

use serde::Serialize;
use std::fmt;
use vocalink_pipeline::{ProviderError, SpeechSynthesizer};
use vocalink_types::VoiceSelector;

/// Maximum text input size for one synthesis request. Partial responses
/// are short; anything larger is a defect upstream.
const MAX_TTS_INPUT_BYTES: usize = 8 * 1024;

/// Telephony-ready output encoding (8 kHz mu-law).
const OUTPUT_FORMAT: &str = "ulaw_8000";

/// Client for an ElevenLabs-style synthesis endpoint.
#[derive(Clone)]
pub struct TtsClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl TtsClient {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }
}

impl fmt::Debug for TtsClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TtsClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

#[derive(Serialize)]
struct SynthesisRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

#[derive(Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
}

#[async_trait::async_trait]
impl SpeechSynthesizer for TtsClient {
    async fn synthesize(
        &self,
        text: &str,
        voice: &VoiceSelector,
    ) -> Result<Vec<u8>, ProviderError> {
        if text.len() > MAX_TTS_INPUT_BYTES {
            return Err(ProviderError::Rejected(format!(
                "text exceeds maximum size: {} bytes (limit: {} bytes)",
                text.len(),
                MAX_TTS_INPUT_BYTES
            )));
        }

        let url = format!(
            "{}/v1/text-to-speech/{}/stream?output_format={}",
            self.base_url.trim_end_matches('/'),
            voice.voice_id,
            OUTPUT_FORMAT
        );
        let response = self
            .http
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .json(&SynthesisRequest {
                text,
                model_id: &voice.model_id,
                voice_settings: VoiceSettings {
                    stability: voice.stability,
                    similarity_boost: voice.similarity_boost,
                },
            })
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), body));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        Ok(audio.to_vec())
    }
}

//! Read-only records lookup.
//!
//! The record store (contacts, selected voice) is an external collaborator;
//! the pipeline only ever reads a caller-context string and a voice
//! selector at session start, by opaque id. A failed lookup falls back to
//! configured defaults at the call site — a missing record never prevents a
//! call from being answered.

use serde::Deserialize;
use vocalink_pipeline::ProviderError;
use vocalink_types::VoiceSelector;

/// Client for the record-management service.
#[derive(Debug, Clone)]
pub struct RecordsClient {
    http: reqwest::Client,
    base_url: String,
}

/// One contact record, as returned by the record store.
#[derive(Debug, Clone, Deserialize)]
pub struct ContactRecord {
    pub id: i64,
    /// Free-form caller context appended to the system instruction.
    #[serde(default)]
    pub context: String,
}

#[derive(Debug, Deserialize)]
struct SelectedVoiceRecord {
    voice_id: String,
}

impl RecordsClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    /// Fetches the caller-context string for one contact id.
    pub async fn caller_context(&self, id: i64) -> Result<String, ProviderError> {
        let url = format!("{}/contacts/{id}", self.base_url.trim_end_matches('/'));
        let record: ContactRecord = self.get_json(&url).await?;
        Ok(record.context)
    }

    /// Fetches the currently selected voice.
    pub async fn selected_voice(&self) -> Result<VoiceSelector, ProviderError> {
        let url = format!("{}/voices/selected", self.base_url.trim_end_matches('/'));
        let record: SelectedVoiceRecord = self.get_json(&url).await?;
        Ok(VoiceSelector::for_voice(record.voice_id))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
    ) -> Result<T, ProviderError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), body));
        }
        response
            .json()
            .await
            .map_err(|e| ProviderError::Protocol(format!("bad record payload: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contact_record_parses_with_and_without_context() {
        let full: ContactRecord =
            serde_json::from_str(r#"{"id":7,"context":"allergic to penicillin"}"#).unwrap();
        assert_eq!(full.id, 7);
        assert_eq!(full.context, "allergic to penicillin");

        let bare: ContactRecord = serde_json::from_str(r#"{"id":8}"#).unwrap();
        assert!(bare.context.is_empty());
    }

    #[test]
    fn selected_voice_maps_to_selector_with_default_tuning() {
        let record: SelectedVoiceRecord =
            serde_json::from_str(r#"{"voice_id":"cloned-123"}"#).unwrap();
        let voice = VoiceSelector::for_voice(record.voice_id);
        assert_eq!(voice.voice_id, "cloned-123");
        assert_eq!(voice.stability, VoiceSelector::default().stability);
    }

    #[tokio::test]
    async fn unreachable_store_is_a_network_error() {
        let client = RecordsClient::new(reqwest::Client::new(), "http://127.0.0.1:1");
        let err = client.caller_context(1).await.expect_err("no server");
        assert!(matches!(err, ProviderError::Network(_)));
    }
}

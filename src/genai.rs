//! Minimal `generateContent` REST client.
//!
//! Constructed explicitly and shared by `Arc`; there is no global client.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::GenAiError;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    pub fn text(role: Option<&str>, text: impl Into<String>) -> Self {
        Self {
            role: role.map(str::to_string),
            parts: vec![Part {
                text: Some(text.into()),
            }],
        }
    }
}

#[derive(Serialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Value>>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub content: Option<Content>,
    pub grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct GroundingMetadata {
    #[serde(default)]
    pub grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct GroundingChunk {
    pub web: Option<WebSource>,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct WebSource {
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub title: String,
}

impl GenerateContentResponse {
    /// Concatenated text of the first candidate; empty if there is none.
    pub fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| {
                c.parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }

    /// Web pages the first candidate was grounded on.
    pub fn web_sources(&self) -> Vec<WebSource> {
        self.candidates
            .first()
            .and_then(|c| c.grounding_metadata.as_ref())
            .map(|m| m.grounding_chunks.iter().filter_map(|c| c.web.clone()).collect())
            .unwrap_or_default()
    }
}

pub struct GenAiClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
}

impl GenAiClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn endpoint(&self, model: &str) -> String {
        let model = model.strip_prefix("models/").unwrap_or(model);
        format!("{}/models/{}:generateContent", self.base_url, model)
    }

    pub async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, GenAiError> {
        let api_key = self.api_key.as_deref().ok_or(GenAiError::MissingApiKey)?;
        let url = self.endpoint(model);
        log::debug!("POST {}", url);

        let resp = self
            .http
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(request)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(GenAiError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(serde_json::from_str(&body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_uses_camel_case_and_skips_empty_fields() {
        let request = GenerateContentRequest {
            contents: vec![Content::text(Some("user"), "hola")],
            system_instruction: Some(Content::text(None, "persona")),
            tools: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            json!({
                "contents": [{"role": "user", "parts": [{"text": "hola"}]}],
                "systemInstruction": {"parts": [{"text": "persona"}]}
            })
        );
    }

    #[test]
    fn response_text_and_sources() {
        let raw = json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "uno "}, {"text": "dos"}]},
                "groundingMetadata": {"groundingChunks": [
                    {"web": {"uri": "https://a.py", "title": "A"}},
                    {"retrievedContext": {}},
                    {"web": {"uri": "https://b.py", "title": "B"}}
                ]}
            }]
        });
        let resp: GenerateContentResponse = serde_json::from_value(raw).unwrap();
        assert_eq!(resp.text(), "uno dos");
        let sources = resp.web_sources();
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[1].uri, "https://b.py");
    }

    #[test]
    fn empty_response_has_no_text() {
        let resp: GenerateContentResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(resp.text(), "");
        assert!(resp.web_sources().is_empty());
    }

    #[test]
    fn endpoint_accepts_prefixed_model_names() {
        let client = GenAiClient::new("https://host/v1beta/", None);
        assert_eq!(
            client.endpoint("models/gemini-x"),
            "https://host/v1beta/models/gemini-x:generateContent"
        );
        assert_eq!(
            client.endpoint("gemini-x"),
            "https://host/v1beta/models/gemini-x:generateContent"
        );
    }

    #[tokio::test]
    async fn missing_key_fails_before_any_request() {
        let client = GenAiClient::new("http://127.0.0.1:9", None);
        let err = client
            .generate_content("m", &GenerateContentRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, GenAiError::MissingApiKey));
    }
}

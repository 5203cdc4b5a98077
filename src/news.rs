//! Business news ticker backed by a grounded search request.

use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::genai::{Content, GenAiClient, GenerateContentRequest, WebSource};

const NEWS_PROMPT: &str = "Busca 2 noticias de negocios reales en Paraguay de 2024. Responde en formato JSON: [{\"title\": \"...\", \"summary\": \"...\"}].";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewsItem {
    pub title: String,
    pub summary: String,
    pub sources: Vec<WebSource>,
}

#[derive(Deserialize)]
struct RawItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    summary: String,
}

/// Shown whenever the live feed is unavailable.
pub fn fallback_items() -> Vec<NewsItem> {
    vec![NewsItem {
        title: "Paraguay mantiene estabilidad económica".into(),
        summary: "El país se consolida como destino líder para inversiones industriales.".into(),
        sources: vec![WebSource {
            title: "Banco Central del Paraguay".into(),
            uri: "https://www.bcp.gov.py".into(),
        }],
    }]
}

/// Pull the JSON array out of a free-form reply and attach the grounding
/// sources: the first item gets all of them, later items only the second one.
///
/// `None` means the array was present but not valid JSON.
pub fn parse_items(text: &str, sources: &[WebSource]) -> Option<Vec<NewsItem>> {
    let Some(start) = text.find('[') else {
        return Some(Vec::new());
    };
    let end = text.rfind(']').filter(|&end| end > start)?;
    let raw: Vec<RawItem> = serde_json::from_str(&text[start..=end]).ok()?;

    let items = raw
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            let sources = match i {
                0 => sources.to_vec(),
                _ if sources.len() > 1 => vec![sources[1].clone()],
                _ => Vec::new(),
            };
            NewsItem {
                title: item.title,
                summary: item.summary,
                sources,
            }
        })
        .collect();
    Some(items)
}

pub struct NewsFeed {
    client: Arc<GenAiClient>,
    model: String,
}

impl NewsFeed {
    pub fn new(client: Arc<GenAiClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    pub fn request() -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![Content::text(Some("user"), NEWS_PROMPT)],
            system_instruction: None,
            tools: Some(vec![json!({ "googleSearch": {} })]),
        }
    }

    /// Never fails; any problem yields the fallback list.
    pub async fn fetch(&self) -> Vec<NewsItem> {
        let resp = match self.client.generate_content(&self.model, &Self::request()).await {
            Ok(resp) => resp,
            Err(e) => {
                log::warn!("News request failed: {}", e);
                return fallback_items();
            }
        };
        match parse_items(&resp.text(), &resp.web_sources()) {
            Some(items) => items,
            None => {
                log::warn!("News reply was not valid JSON");
                fallback_items()
            }
        }
    }
}

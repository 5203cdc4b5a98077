//! Text consultation with the persona.

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::GenAiError;
use crate::genai::{Content, GenAiClient, GenerateContentRequest, GenerateContentResponse};
use crate::persona;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Model,
}

impl Role {
    fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub text: String,
}

impl ChatMessage {
    fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }
}

/// Whole conversation plus the persona, ready to send.
pub fn build_request(history: &[ChatMessage]) -> GenerateContentRequest {
    GenerateContentRequest {
        contents: history
            .iter()
            .map(|m| Content::text(Some(m.role.as_str()), m.text.clone()))
            .collect(),
        system_instruction: Some(Content::text(None, persona::SYSTEM_INSTRUCTION)),
        tools: None,
    }
}

/// What the consultant says back, whatever happened to the request.
pub fn reply_text(result: Result<GenerateContentResponse, GenAiError>) -> String {
    match result {
        Ok(resp) => {
            let text = resp.text();
            if text.is_empty() {
                persona::EMPTY_REPLY.to_string()
            } else {
                text
            }
        }
        Err(e) => {
            log::error!("Chat request failed: {}", e);
            persona::OFFLINE_REPLY.to_string()
        }
    }
}

pub struct ConsultantChat {
    client: Arc<GenAiClient>,
    model: String,
    history: Mutex<Vec<ChatMessage>>,
    busy: AtomicBool,
}

impl ConsultantChat {
    pub fn new(client: Arc<GenAiClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            history: Mutex::new(vec![ChatMessage::new(Role::Model, persona::GREETING)]),
            busy: AtomicBool::new(false),
        }
    }

    pub fn history(&self) -> Vec<ChatMessage> {
        self.history.lock().clone()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Send one user message and return the reply that was appended.
    ///
    /// Blank input, or a call while a previous one is still waiting, does nothing.
    pub async fn send(&self, input: &str) -> Option<String> {
        let input = input.trim();
        if input.is_empty() {
            return None;
        }
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::debug!("Chat busy, ignoring input");
            return None;
        }

        let request = {
            let mut history = self.history.lock();
            history.push(ChatMessage::new(Role::User, input));
            build_request(&history)
        };

        let reply = reply_text(self.client.generate_content(&self.model, &request).await);
        self.history
            .lock()
            .push(ChatMessage::new(Role::Model, reply.clone()));
        self.busy.store(false, Ordering::Release);
        Some(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_carries_history_and_persona() {
        let history = vec![
            ChatMessage::new(Role::Model, "hola"),
            ChatMessage::new(Role::User, "¿qué es la EAS?"),
        ];
        let json = serde_json::to_value(build_request(&history)).unwrap();
        assert_eq!(json["contents"][0]["role"], "model");
        assert_eq!(json["contents"][1]["role"], "user");
        assert_eq!(json["contents"][1]["parts"][0]["text"], "¿qué es la EAS?");
        assert_eq!(
            json["systemInstruction"]["parts"][0]["text"],
            persona::SYSTEM_INSTRUCTION
        );
    }

    #[test]
    fn empty_reply_is_replaced() {
        let resp: GenerateContentResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(reply_text(Ok(resp)), persona::EMPTY_REPLY);
    }

    #[test]
    fn whitespace_reply_is_kept() {
        let resp: GenerateContentResponse = serde_json::from_value(serde_json::json!({
            "candidates": [{"content": {"parts": [{"text": " "}]}}]
        }))
        .unwrap();
        assert_eq!(reply_text(Ok(resp)), " ");
    }

    #[test]
    fn failure_gives_offline_reply() {
        assert_eq!(
            reply_text(Err(GenAiError::MissingApiKey)),
            persona::OFFLINE_REPLY
        );
    }

    #[tokio::test]
    async fn blank_input_is_ignored() {
        let chat = ConsultantChat::new(Arc::new(GenAiClient::new("http://127.0.0.1:9", None)), "m");
        assert_eq!(chat.send("   ").await, None);
        assert_eq!(chat.history().len(), 1);
        assert_eq!(chat.history()[0].text, persona::GREETING);
    }

    #[tokio::test]
    async fn failed_request_appends_user_and_offline_reply() {
        let chat = ConsultantChat::new(Arc::new(GenAiClient::new("http://127.0.0.1:9", None)), "m");
        let reply = chat.send("  hola ").await;
        assert_eq!(reply.as_deref(), Some(persona::OFFLINE_REPLY));
        let history = chat.history();
        assert_eq!(history.len(), 3);
        assert_eq!(history[1], ChatMessage::new(Role::User, "hola"));
        assert_eq!(history[2].role, Role::Model);
        assert!(!chat.is_busy());
    }
}

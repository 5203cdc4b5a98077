use crate::audio_bridge::{BridgeNotice, BridgeState, LiveAudioBridge};
use crate::chat::ConsultantChat;
use crate::error::BridgeError;
use crate::news::{NewsFeed, NewsItem};
use std::sync::Arc;

/// One line typed on the console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    StartVoice,
    StopVoice,
    News,
    Quit,
    Chat(String),
    Empty,
}

impl Command {
    pub fn parse(line: &str) -> Self {
        match line.trim() {
            "" => Command::Empty,
            "/start" => Command::StartVoice,
            "/stop" => Command::StopVoice,
            "/news" => Command::News,
            "/quit" | "/exit" => Command::Quit,
            text => Command::Chat(text.to_string()),
        }
    }
}

/// Text shown to the user for a failure notice.
pub fn notice_message(notice: &BridgeNotice) -> String {
    match notice {
        BridgeNotice::StartFailed(BridgeError::PermissionDenied(_)) => {
            "No se pudo acceder al micrófono. Verifique los permisos.".to_string()
        }
        BridgeNotice::StartFailed(e) => format!("No se pudo iniciar la consulta de voz: {}", e),
        BridgeNotice::SessionEnded(e) => format!("La consulta de voz terminó: {}", e),
    }
}

pub fn state_label(state: BridgeState) -> &'static str {
    match state {
        BridgeState::Idle => "inactiva",
        BridgeState::Connecting => "conectando...",
        BridgeState::Listening => "escuchando",
    }
}

pub fn render_news(items: &[NewsItem]) -> String {
    let mut out = String::new();
    for item in items {
        out.push_str(&format!("* {}\n  {}\n", item.title, item.summary));
        for source in &item.sources {
            out.push_str(&format!("  [{}] {}\n", source.title, source.uri));
        }
    }
    out
}

/// Routes console input to the voice bridge, the chat and the news feed.
pub struct CoreController {
    bridge: LiveAudioBridge,
    chat: Arc<ConsultantChat>,
    news: Arc<NewsFeed>,
}

impl CoreController {
    pub fn new(bridge: LiveAudioBridge, chat: Arc<ConsultantChat>, news: Arc<NewsFeed>) -> Self {
        Self { bridge, chat, news }
    }

    /// Returns false once the user asked to quit.
    pub fn handle_line(&self, line: &str) -> bool {
        match Command::parse(line) {
            Command::Empty => {}
            Command::StartVoice => {
                let bridge = self.bridge.clone();
                // start 会等待连接，不阻塞主循环
                tokio::spawn(async move {
                    if let Err(e) = bridge.start().await {
                        log::debug!("Voice start failed: {}", e);
                    }
                });
            }
            Command::StopVoice => self.bridge.stop(),
            Command::News => self.show_news(),
            Command::Chat(text) => {
                if self.chat.is_busy() {
                    println!("(Olga está escribiendo, espere un momento)");
                    return true;
                }
                let chat = self.chat.clone();
                tokio::spawn(async move {
                    if let Some(reply) = chat.send(&text).await {
                        println!("Olga: {}", reply);
                    }
                });
            }
            Command::Quit => {
                self.bridge.stop();
                return false;
            }
        }
        true
    }

    pub fn show_news(&self) {
        let news = self.news.clone();
        tokio::spawn(async move {
            let items = news.fetch().await;
            println!("--- Noticias de negocios ---\n{}", render_news(&items));
        });
    }

    pub fn handle_notice(&self, notice: BridgeNotice) {
        eprintln!("{}", notice_message(&notice));
    }

    pub fn handle_state(&self, state: BridgeState) {
        println!("Consulta de voz: {}", state_label(state));
    }

    pub fn shutdown(&self) {
        self.bridge.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genai::WebSource;

    #[test]
    fn parses_commands_and_chat_text() {
        assert_eq!(Command::parse(" /start "), Command::StartVoice);
        assert_eq!(Command::parse("/stop"), Command::StopVoice);
        assert_eq!(Command::parse("/news"), Command::News);
        assert_eq!(Command::parse("/exit"), Command::Quit);
        assert_eq!(Command::parse("   "), Command::Empty);
        assert_eq!(
            Command::parse(" ¿Cuánto cuesta una EAS? "),
            Command::Chat("¿Cuánto cuesta una EAS?".into())
        );
    }

    #[test]
    fn permission_notice_mentions_microphone() {
        let msg = notice_message(&BridgeNotice::StartFailed(BridgeError::PermissionDenied(
            "capture".into(),
        )));
        assert!(msg.contains("micrófono"));
    }

    #[test]
    fn news_lists_sources_under_items() {
        let items = vec![NewsItem {
            title: "T".into(),
            summary: "S".into(),
            sources: vec![WebSource {
                uri: "https://x.py".into(),
                title: "X".into(),
            }],
        }];
        assert_eq!(render_news(&items), "* T\n  S\n  [X] https://x.py\n");
    }
}

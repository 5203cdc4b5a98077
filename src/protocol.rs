//! Wire messages of the live `BidiGenerateContent` WebSocket session.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::audio::AudioFrame;
use crate::net_link::SessionEvent;

#[derive(Serialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ClientMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub setup: Option<Setup>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub realtime_input: Option<RealtimeInput>,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    pub model: String,
    pub generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speech_config: Option<SpeechConfig>,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Content {
    pub parts: Vec<TextPart>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TextPart {
    pub text: String,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    pub media_chunks: Vec<MediaChunk>,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct MediaChunk {
    pub mime_type: String,
    pub data: String,
}

impl ClientMessage {
    /// Session setup requesting audio-only replies in the given voice.
    pub fn setup(model: &str, voice: &str, instruction: &str) -> Self {
        Self {
            setup: Some(Setup {
                model: model.to_string(),
                generation_config: GenerationConfig {
                    response_modalities: vec!["AUDIO".to_string()],
                    speech_config: Some(SpeechConfig {
                        voice_config: VoiceConfig {
                            prebuilt_voice_config: PrebuiltVoiceConfig {
                                voice_name: voice.to_string(),
                            },
                        },
                    }),
                },
                system_instruction: Some(Content {
                    parts: vec![TextPart {
                        text: instruction.to_string(),
                    }],
                }),
            }),
            realtime_input: None,
        }
    }

    /// One captured chunk as realtime input.
    pub fn realtime_audio(frame: &AudioFrame) -> Self {
        Self {
            setup: None,
            realtime_input: Some(RealtimeInput {
                media_chunks: vec![MediaChunk {
                    mime_type: frame.mime_type(),
                    data: frame.to_base64(),
                }],
            }),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    pub setup_complete: Option<Value>,
    pub server_content: Option<ServerContent>,
    pub go_away: Option<Value>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    pub model_turn: Option<ModelTurn>,
    #[serde(default)]
    pub interrupted: bool,
    #[serde(default)]
    pub turn_complete: bool,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct ModelTurn {
    #[serde(default)]
    pub parts: Vec<ServerPart>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ServerPart {
    pub inline_data: Option<InlineData>,
    pub text: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    #[serde(default)]
    pub mime_type: Option<String>,
    pub data: String,
}

impl ServerMessage {
    /// Flatten one server message into bridge events, in message order.
    ///
    /// Audio payloads are passed through still base64-encoded; decoding (and
    /// dropping bad frames) is the bridge's job.
    pub fn into_events(self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        if self.setup_complete.is_some() {
            events.push(SessionEvent::Opened);
        }
        if let Some(content) = self.server_content {
            if content.interrupted {
                events.push(SessionEvent::Interrupted);
            }
            if let Some(turn) = content.model_turn {
                for part in turn.parts {
                    if let Some(inline) = part.inline_data {
                        let is_audio = inline
                            .mime_type
                            .as_deref()
                            .is_none_or(|m| m.starts_with("audio/"));
                        if is_audio {
                            events.push(SessionEvent::Audio(inline.data));
                        }
                    } else if let Some(text) = part.text {
                        log::debug!("Live text part: {}", text);
                    }
                }
            }
            if content.turn_complete {
                events.push(SessionEvent::TurnComplete);
            }
        }
        if let Some(reason) = self.go_away {
            log::warn!("Live server is going away: {}", reason);
        }
        events
    }
}

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    // 音频设备配置
    pub capture_device: String,
    pub playback_device: String,
    pub chunk_size: usize,
    pub input_sample_rate: u32,
    pub output_sample_rate: u32,
    pub playback_period_size: usize,

    // Live 会话配置
    pub live_ws_url: String,
    pub live_model: String,
    pub live_voice: String,
    pub live_connect_timeout_ms: u64,

    // REST 配置
    pub genai_base_url: String,
    pub chat_model: String,
    pub news_model: String,

    // 运行时从环境变量读取，不写入二进制
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

impl Config {
    /// 从编译时设置的环境变量创建配置
    /// 静态参数都在编译时从 config.toml 中读取，API key 在运行时从 `API_KEY` 读取
    pub fn new() -> Result<Self, &'static str> {
        Ok(Self {
            capture_device: env!("AUDIO_CAPTURE_DEVICE").to_string(),
            playback_device: env!("AUDIO_PLAYBACK_DEVICE").to_string(),
            chunk_size: parse_nonzero(
                env!("AUDIO_CHUNK_SIZE"),
                "Failed to parse AUDIO_CHUNK_SIZE",
                "AUDIO_CHUNK_SIZE must be greater than 0",
            )?,
            input_sample_rate: parse_nonzero(
                env!("AUDIO_INPUT_SAMPLE_RATE"),
                "Failed to parse AUDIO_INPUT_SAMPLE_RATE",
                "AUDIO_INPUT_SAMPLE_RATE must be greater than 0",
            )?,
            output_sample_rate: parse_nonzero(
                env!("AUDIO_OUTPUT_SAMPLE_RATE"),
                "Failed to parse AUDIO_OUTPUT_SAMPLE_RATE",
                "AUDIO_OUTPUT_SAMPLE_RATE must be greater than 0",
            )?,
            playback_period_size: env!("AUDIO_PLAYBACK_PERIOD_SIZE").parse()
                .map_err(|_| "Failed to parse AUDIO_PLAYBACK_PERIOD_SIZE")?,

            live_ws_url: env!("LIVE_WS_URL").to_string(),
            live_model: env!("LIVE_MODEL").to_string(),
            live_voice: env!("LIVE_VOICE").to_string(),
            live_connect_timeout_ms: env!("LIVE_CONNECT_TIMEOUT_MS").parse()
                .map_err(|_| "Failed to parse LIVE_CONNECT_TIMEOUT_MS")?,

            genai_base_url: env!("GENAI_BASE_URL").to_string(),
            chat_model: env!("GENAI_CHAT_MODEL").to_string(),
            news_model: env!("GENAI_NEWS_MODEL").to_string(),

            api_key: std::env::var("API_KEY").ok().filter(|k| !k.trim().is_empty()),
        })
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.live_connect_timeout_ms)
    }
}

// 数值为 0 时采集会空转、时长计算会除零，直接拒绝
fn parse_nonzero<T>(raw: &str, invalid: &'static str, zero: &'static str) -> Result<T, &'static str>
where
    T: FromStr + Default + PartialEq,
{
    let value: T = raw.trim().parse().map_err(|_| invalid)?;
    if value == T::default() {
        return Err(zero);
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_chunk_size_is_rejected() {
        assert_eq!(parse_nonzero::<usize>("0", "bad", "zero"), Err("zero"));
        assert_eq!(parse_nonzero::<usize>("x", "bad", "zero"), Err("bad"));
        assert_eq!(parse_nonzero::<u32>("16000", "bad", "zero"), Ok(16000));
    }

    #[test]
    fn build_time_values_parse() {
        let config = Config::new().expect("config.toml values must parse");
        assert_eq!(config.input_sample_rate, 16000);
        assert_eq!(config.output_sample_rate, 24000);
        assert!(config.chunk_size > 0);
        assert!(config.connect_timeout() > Duration::ZERO);
    }
}

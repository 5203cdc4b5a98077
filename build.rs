use std::fs;
use std::path::Path;
use serde::Deserialize;

#[derive(Deserialize)]
struct Config {
    application: Application,
    audio: Audio,
    live: Live,
    genai: GenAi,
}

#[derive(Deserialize)]
struct Application {
    name: String,
    version: String,
}

#[derive(Deserialize)]
struct Audio {
    capture_device: String,
    playback_device: String,
    chunk_size: usize,
    input_sample_rate: u32,
    output_sample_rate: u32,
    playback_period_size: usize,
}

#[derive(Deserialize)]
struct Live {
    ws_url: String,
    model: String,
    voice: String,
    connect_timeout_ms: u64,
}

#[derive(Deserialize)]
struct GenAi {
    base_url: String,
    chat_model: String,
    news_model: String,
}

// 在编译时读取 config.toml 并设置环境变量
fn main() {
    println!("cargo:rerun-if-changed=config.toml");

    let config_path = Path::new("config.toml");
    if !config_path.exists() {
        panic!("config.toml not found!");
    }

    let config_str = fs::read_to_string(config_path).expect("Failed to read config.toml");
    let config: Config = toml::from_str(&config_str).expect("Failed to parse config.toml");

    println!("cargo:rustc-env=APP_NAME={}", config.application.name);
    println!("cargo:rustc-env=APP_VERSION={}", config.application.version);

    // 音频设备
    println!("cargo:rustc-env=AUDIO_CAPTURE_DEVICE={}", config.audio.capture_device);
    println!("cargo:rustc-env=AUDIO_PLAYBACK_DEVICE={}", config.audio.playback_device);
    println!("cargo:rustc-env=AUDIO_CHUNK_SIZE={}", config.audio.chunk_size);
    println!("cargo:rustc-env=AUDIO_INPUT_SAMPLE_RATE={}", config.audio.input_sample_rate);
    println!("cargo:rustc-env=AUDIO_OUTPUT_SAMPLE_RATE={}", config.audio.output_sample_rate);
    println!("cargo:rustc-env=AUDIO_PLAYBACK_PERIOD_SIZE={}", config.audio.playback_period_size);

    // Live 会话
    println!("cargo:rustc-env=LIVE_WS_URL={}", config.live.ws_url);
    println!("cargo:rustc-env=LIVE_MODEL={}", config.live.model);
    println!("cargo:rustc-env=LIVE_VOICE={}", config.live.voice);
    println!("cargo:rustc-env=LIVE_CONNECT_TIMEOUT_MS={}", config.live.connect_timeout_ms);

    // REST
    println!("cargo:rustc-env=GENAI_BASE_URL={}", config.genai.base_url);
    println!("cargo:rustc-env=GENAI_CHAT_MODEL={}", config.genai.chat_model);
    println!("cargo:rustc-env=GENAI_NEWS_MODEL={}", config.genai.news_model);
}

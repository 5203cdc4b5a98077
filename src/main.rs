use ihara_assistant::audio::{AudioConfig, AudioSystem};
use ihara_assistant::audio_bridge::{BridgeConfig, BridgeNotice, LiveAudioBridge};
use ihara_assistant::chat::ConsultantChat;
use ihara_assistant::config::Config;
use ihara_assistant::controller::CoreController;
use ihara_assistant::genai::GenAiClient;
use ihara_assistant::net_link::GeminiLiveConnector;
use ihara_assistant::news::NewsFeed;
use ihara_assistant::persona;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    env_logger::init();

    // 加载配置
    let config = Config::new().map_err(anyhow::Error::msg)?;
    if config.api_key.is_none() {
        log::warn!("API_KEY is not set, chat, news and voice will be unavailable");
    }

    // REST 客户端，聊天和新闻共用
    let genai = Arc::new(GenAiClient::new(
        config.genai_base_url.clone(),
        config.api_key.clone(),
    ));
    let chat = Arc::new(ConsultantChat::new(genai.clone(), config.chat_model.clone()));
    let news = Arc::new(NewsFeed::new(genai, config.news_model.clone()));

    // 启动音频系统：播放设备常开，麦克风在开始语音时才打开
    let audio = AudioSystem::start(AudioConfig::from(&config));

    // 语音桥
    let (notice_tx, mut notice_rx) = mpsc::channel::<BridgeNotice>(16);
    let connector = Arc::new(GeminiLiveConnector::new(
        config.live_ws_url.clone(),
        config.api_key.clone(),
    ));
    let bridge = LiveAudioBridge::new(
        BridgeConfig::from(&config),
        audio.capture.clone(),
        audio.playback.clone(),
        connector,
        notice_tx,
    );
    let mut state_rx = bridge.subscribe();

    let controller = CoreController::new(bridge, chat, news);

    println!("{} {}", env!("APP_NAME"), env!("APP_VERSION"));
    println!("Olga: {}", persona::GREETING);
    println!("Comandos: /start (voz), /stop, /news, /quit. Cualquier otro texto se envía al chat.");
    controller.show_news();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    // 主事件循环
    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                println!("Received Ctrl+C, shutting down...");
                break;
            }

            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        if !controller.handle_line(&line) {
                            break;
                        }
                    }
                    Ok(None) => {
                        log::info!("stdin closed, shutting down");
                        break;
                    }
                    Err(e) => {
                        log::error!("Failed to read stdin: {}", e);
                        break;
                    }
                }
            }

            Some(notice) = notice_rx.recv() => controller.handle_notice(notice),

            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *state_rx.borrow_and_update();
                controller.handle_state(state);
            }
        }
    }

    controller.shutdown();
    Ok(())
}

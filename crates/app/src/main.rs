// Logging behavior:
// - Writes logs to a daily-rotated file at logs/murmur.log only; stdout
//   belongs to the TUI.
// - Controlled via --log-level or RUST_LOG (e.g., "info", "debug").
// - logs/ is created if missing.

use std::io;
use std::sync::Arc;

use clap::Parser;
use crossterm::{
    event::{
        DisableFocusChange, EnableFocusChange, KeyboardEnhancementFlags,
        PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
    },
    execute,
    terminal::{
        disable_raw_mode, enable_raw_mode, supports_keyboard_enhancement, EnterAlternateScreen,
        LeaveAlternateScreen,
    },
};
use ratatui::{backend::CrosstermBackend, Terminal};
use tokio::sync::mpsc;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use murmur_app::orchestrator::{Orchestrator, RemoteTranscriber, SessionLauncher};
use murmur_app::tui;
use murmur_audio::PlaybackThread;
use murmur_client::{ApiClient, VoiceApi, DEFAULT_BASE_URL};
use murmur_stt::{CaptureConfig, CaptureSession};

#[derive(Parser)]
#[command(author, version, about = "Push-to-talk voice chat assistant")]
struct Cli {
    /// Base URL of the voice backend
    #[arg(long = "api-url", env = "MURMUR_API_URL", default_value = DEFAULT_BASE_URL)]
    api_url: String,

    /// Input device name (host default when omitted)
    #[arg(short = 'D', long)]
    device: Option<String>,

    /// Log level filter (overrides RUST_LOG)
    #[arg(long = "log-level", default_value = "info")]
    log_level: String,

    /// RMS level below which a frame counts as silence
    #[arg(long = "silence-threshold", default_value_t = 100)]
    silence_threshold: i16,

    /// Trailing silence that ends an utterance, in milliseconds
    #[arg(long = "hangover-ms", default_value_t = 600)]
    hangover_ms: u32,
}

fn init_logging(cli_level: &str) -> Result<(), Box<dyn std::error::Error>> {
    std::fs::create_dir_all("logs")?;
    let file_appender = RollingFileAppender::new(Rotation::DAILY, "logs", "murmur.log");
    let (non_blocking_file, _guard) = tracing_appender::non_blocking(file_appender);

    let effective_level = if !cli_level.is_empty() {
        cli_level.to_string()
    } else {
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string())
    };
    let env_filter =
        EnvFilter::try_new(effective_level).unwrap_or_else(|_| EnvFilter::new("info"));

    // File-only logging so the TUI display is never corrupted.
    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .with_target(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .init();
    std::mem::forget(_guard);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;
    tracing::info!("Starting Murmur");

    let client = Arc::new(ApiClient::new(cli.api_url.clone()));
    if client.health().await {
        tracing::info!("Backend reachable at {}", client.base_url());
    } else {
        tracing::warn!(
            "Backend not reachable at {}; requests will fail until it is up",
            client.base_url()
        );
    }
    let api: Arc<dyn VoiceApi> = client;

    let playback = match PlaybackThread::spawn() {
        Ok(playback) => Some(playback),
        Err(e) => {
            tracing::warn!("Audio playback disabled: {}", e);
            None
        }
    };

    if !murmur_audio::default_input_available() {
        tracing::warn!("No input device detected; speech capture will be unavailable");
    }

    let capture_config = CaptureConfig {
        silence_threshold: cli.silence_threshold,
        hangover_ms: cli.hangover_ms,
        ..Default::default()
    };
    let session = CaptureSession::new(
        Arc::new(RemoteTranscriber::new(api.clone())),
        capture_config,
    );
    let device = cli.device.clone();
    let launcher: SessionLauncher = Box::new(move || session.start(device.clone()));

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let mut orchestrator = Orchestrator::new(api, launcher, playback, events_tx);

    // Terminal setup; hold-to-talk needs key release events, which only
    // terminals with the keyboard enhancement protocol report.
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableFocusChange)?;
    let hold_to_talk = supports_keyboard_enhancement().unwrap_or(false);
    if hold_to_talk {
        execute!(
            stdout,
            PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::REPORT_EVENT_TYPES)
        )?;
    }
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = tui::run(&mut terminal, &mut orchestrator, events_rx, hold_to_talk).await;

    if hold_to_talk {
        execute!(terminal.backend_mut(), PopKeyboardEnhancementFlags)?;
    }
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), DisableFocusChange, LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    orchestrator.shutdown();
    tracing::info!("Murmur stopped");

    if let Err(err) = res {
        eprintln!("Error: {}", err);
    }
    Ok(())
}

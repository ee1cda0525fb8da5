use std::sync::Arc;

use aida::api::{ApiClient, ApiError, ChatBackend};
use aida::audio::AudioError;
use aida::config::{Config, ConfigError};
use aida::controller::ChatController;
use aida::shell::{self, ShellError};
use bridge::embed::{EmbedConfig, EmbedError};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Api(#[from] ApiError),
    #[error("embed configuration error: {0}")]
    Embed(#[from] EmbedError),
    #[error("{0}")]
    Shell(#[from] ShellError),
    #[error("{0}")]
    Audio(#[from] AudioError),
    #[error("question must not be empty")]
    EmptyQuestion,
}

#[derive(Parser, Debug)]
#[command(name = "aida", about = "AIDA chat assistant: terminal page, embeddable widget and host")]
struct Cli {
    /// Backend base URL; overrides `AIDA_API_BASE`.
    #[arg(long, global = true)]
    api_base: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Chat in the terminal (default).
    Chat,
    /// Serve the widget protocol as JSON lines on stdin/stdout.
    Widget,
    /// Embed the widget as a child process behind a launcher button.
    Host(HostArgs),
    /// Ask one question and print the answer.
    Ask {
        #[arg(required = true)]
        question: Vec<String>,
    },
    /// Record from the microphone and print the transcription.
    #[cfg(feature = "audio")]
    Listen,
}

#[derive(Args, Debug, Default)]
struct HostArgs {
    /// `bottom-right`, `bottom-left`, `top-right` or `top-left`.
    #[arg(long, env = "AIDA_POSITION")]
    position: Option<String>,
    #[arg(long, env = "AIDA_BUTTON_TEXT")]
    button_text: Option<String>,
    #[arg(long, env = "AIDA_BUTTON_COLOR")]
    button_color: Option<String>,
    #[arg(long)]
    width: Option<String>,
    #[arg(long)]
    height: Option<String>,
}

impl HostArgs {
    fn embed_config(&self, config: &Config) -> Result<EmbedConfig, EmbedError> {
        let attributes = [
            ("data-widget-url", Some(config.widget_url.as_str())),
            ("data-position", self.position.as_deref()),
            ("data-button-text", self.button_text.as_deref()),
            ("data-button-color", self.button_color.as_deref()),
            ("data-width", self.width.as_deref()),
            ("data-height", self.height.as_deref()),
        ];
        EmbedConfig::from_attributes(attributes.into_iter().filter_map(|(name, value)| Some((name, value?))))
    }
}

fn init_tracing() {
    // Stdout carries the widget protocol; logs go to stderr.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    let mut config = Config::from_env()?;
    if let Some(api_base) = cli.api_base.as_deref() {
        config = config.with_api_base(api_base)?;
    }

    match cli.command.unwrap_or(Command::Chat) {
        Command::Chat => {
            let controller = controller(&config)?;
            shell::terminal::run(controller).await;
        }
        Command::Widget => {
            let controller = controller(&config)?;
            shell::embedded::run(controller).await;
        }
        Command::Host(args) => {
            let embed = args.embed_config(&config)?;
            shell::host::run(&config, embed).await?;
        }
        Command::Ask { question } => run_ask(&config, &question.join(" ")).await?,
        #[cfg(feature = "audio")]
        Command::Listen => run_listen(&config).await?,
    }
    Ok(())
}

fn controller(config: &Config) -> Result<ChatController, CliError> {
    let client = ApiClient::new(config)?;
    tracing::info!(api_base = client.base_url(), "aida: backend configured");
    Ok(ChatController::new(Arc::new(client), config))
}

async fn run_ask(config: &Config, question: &str) -> Result<(), CliError> {
    let question = question.trim();
    if question.is_empty() {
        return Err(CliError::EmptyQuestion);
    }
    let client = ApiClient::new(config)?;
    let reply = client.chat(question, None).await?;
    println!("{}", reply.answer_or_placeholder());
    if let Some(session_id) = reply.session_id.as_deref() {
        tracing::info!(%session_id, "aida: session");
    }
    Ok(())
}

/// Record until Enter, then transcribe.
#[cfg(feature = "audio")]
async fn run_listen(config: &Config) -> Result<(), CliError> {
    use aida::audio::{AudioCapture, device::DeviceCapture};

    let client = ApiClient::new(config)?;
    let mut capture = DeviceCapture::default();
    capture.start()?;
    eprintln!("recording, press Enter to stop");
    let mut line = String::new();
    std::io::stdin().read_line(&mut line).map_err(ShellError::from)?;
    let clip = capture.stop()?;
    match client.transcribe(clip).await? {
        Some(text) => println!("{text}"),
        None => eprintln!("(nothing recognized)"),
    }
    Ok(())
}

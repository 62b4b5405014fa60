//! Calculus tutor chat server.
//!
//! # Usage
//!
//! ```bash
//! calctutor-web                                  # interactive keys, derivadas.json
//! calctutor-web --catalog data/derivatives.json --schema english
//! GEMINI_API_KEY=... calctutor-web --preconfigured --port 8080
//! calctutor-web --config tutor.json --static-dir ./public
//! ```
//!
//! Then open the printed URL (with `--static-dir`) or drive the API directly:
//!
//! ```bash
//! curl -X POST localhost:3001/api/sessions
//! curl -X POST localhost:3001/api/sessions/$ID/credential -d '{"api_key":"..."}' -H 'content-type: application/json'
//! curl -X POST localhost:3001/api/sessions/$ID/chat -d '{"message":"1"}' -H 'content-type: application/json'
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use calctutor::catalog::FieldMapping;
use calctutor::config::{CredentialSource, TutorConfig};
use calctutor::logs::{DEFAULT_LOG_CAPACITY, LogCaptureLayer};
use calctutor::prompt::PolicyDocument;
use calctutor::tutor::Tutor;
use calctutor_web::{WebConfig, WsMessage, spawn_web};
use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Clone, Copy, ValueEnum)]
enum Schema {
    /// `function` / `derivative` / `conclusion` keys, English policy
    English,
    /// `funcion` / `derivada` keys, Spanish policy
    Spanish,
}

/// Calculus tutor chat server.
#[derive(Parser)]
#[command(about = "Calculus tutor chat server with a browser-facing API")]
struct Args {
    /// JSON config file (every field optional).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Exercise data file.
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Catalog key names and policy language.
    #[arg(long, value_enum)]
    schema: Option<Schema>,

    /// Hosted model identifier.
    #[arg(long)]
    model: Option<String>,

    /// Read the API key from GEMINI_API_KEY instead of asking each session.
    #[arg(long)]
    preconfigured: bool,

    /// Port for the web server.
    #[arg(long, default_value_t = 3001)]
    port: u16,

    /// Directory with the chat page to serve at `/`.
    #[arg(long)]
    static_dir: Option<PathBuf>,

    /// Minutes a session may sit unused before it is evicted.
    #[arg(long, default_value_t = 60)]
    session_idle_mins: u64,
}

fn build_config(args: &Args) -> Result<TutorConfig, String> {
    let mut config = match &args.config {
        Some(path) => TutorConfig::from_file(path)?,
        None => TutorConfig::default(),
    };
    if let Some(ref path) = args.catalog {
        config = config.with_catalog_path(path);
    }
    match args.schema {
        Some(Schema::English) => {
            config = config
                .with_field_mapping(FieldMapping::english())
                .with_policy(PolicyDocument::english());
        }
        Some(Schema::Spanish) => {
            config = config
                .with_field_mapping(FieldMapping::spanish())
                .with_policy(PolicyDocument::spanish());
        }
        None => {}
    }
    if let Some(ref model) = args.model {
        config = config.with_model(model);
    }
    if args.preconfigured && config.credential_source.is_interactive() {
        config = config.with_credential_source(CredentialSource::preconfigured());
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), String> {
    let args = Args::parse();

    // 1. Logging: terminal output plus a buffer the snapshots read from.
    let (capture_layer, logs) = LogCaptureLayer::new(DEFAULT_LOG_CAPACITY);
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .with(capture_layer)
        .init();

    // 2. Tutor context: policy, catalog, credential mode.
    let config = build_config(&args)?;
    let tutor = Arc::new(Tutor::from_config(config)?);
    if !tutor.availability().is_ready() {
        eprintln!("{}", tutor.policy().replies.catalog_unavailable);
    }

    // 3. Web server.
    let (ws_tx, _) = tokio::sync::broadcast::channel::<WsMessage>(256);
    let web_config = WebConfig {
        bind_addr: ([127, 0, 0, 1], args.port).into(),
        static_dir: args.static_dir.clone(),
        logs,
        session_idle_timeout: Duration::from_secs(args.session_idle_mins * 60),
    };
    let addr = spawn_web(tutor.clone(), ws_tx, web_config).await?;
    println!("Web UI: http://{addr}");
    info!(
        "Serving model {} with {} credentials",
        tutor.model(),
        tutor.config().credential_source.label()
    );

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| format!("failed to listen for shutdown signal: {e}"))?;
    info!("Shutting down");
    Ok(())
}

//! Ask the calculus tutor one question from the terminal.
//!
//! Reads the API key from `GEMINI_API_KEY` (or the variable named in the
//! config file).
//!
//! # Examples
//!
//! ```sh
//! # Start the lesson for exercise 3
//! calctutor --ask 3
//!
//! # English data set and policy
//! calctutor --catalog derivatives.json --schema english --ask "2"
//!
//! # Inspect the instruction text without calling the model
//! calctutor --print-prompt
//!
//! # List the loaded exercises
//! calctutor --list
//! ```

use calctutor::catalog::FieldMapping;
use calctutor::config::{CredentialSource, TutorConfig};
use calctutor::gateway::ReplyOutcome;
use calctutor::prompt::PolicyDocument;
use calctutor::tutor::{Availability, Tutor};
use clap::{Parser, ValueEnum};
use std::io::{self, Read};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, ValueEnum)]
enum Schema {
    /// `function` / `derivative` / `conclusion` keys, English policy
    English,
    /// `funcion` / `derivada` keys, Spanish policy
    Spanish,
}

/// Ask the calculus tutor one question.
///
/// Reads the API key from the GEMINI_API_KEY environment variable.
#[derive(Parser)]
#[command(name = "calctutor")]
struct Cli {
    // ── Configuration ──────────────────────────────────────────
    /// JSON config file (every field optional)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Exercise data file
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Catalog key names and policy language
    #[arg(long, value_enum)]
    schema: Option<Schema>,

    /// Hosted model identifier
    #[arg(long)]
    model: Option<String>,

    /// Model call timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    // ── Actions ────────────────────────────────────────────────
    /// Message to send as the first turn
    #[arg(long)]
    ask: Option<String>,

    /// Read the message from stdin
    #[arg(long)]
    stdin: bool,

    /// Print the system prompt and exit
    #[arg(long)]
    print_prompt: bool,

    /// List the loaded exercises and exit
    #[arg(long)]
    list: bool,
}

fn build_config(cli: &Cli) -> Result<TutorConfig, String> {
    let mut config = match &cli.config {
        Some(path) => TutorConfig::from_file(path)?,
        None => TutorConfig::default(),
    };
    if let Some(ref path) = cli.catalog {
        config = config.with_catalog_path(path);
    }
    match cli.schema {
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
    if let Some(ref model) = cli.model {
        config = config.with_model(model);
    }
    if let Some(secs) = cli.timeout {
        config.request_timeout_secs = secs;
    }
    // A terminal has nowhere to type a key, so the key always comes from the
    // environment here.
    if config.credential_source.is_interactive() {
        config = config.with_credential_source(CredentialSource::preconfigured());
    }
    Ok(config)
}

fn read_message(cli: &Cli) -> Result<String, String> {
    let piped = if cli.stdin {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .map_err(|e| format!("failed to read stdin: {e}"))?;
        Some(buf)
    } else {
        None
    };

    match (&cli.ask, piped) {
        (Some(msg), Some(piped)) => Ok(format!("{msg}\n\n{piped}")),
        (Some(msg), None) => Ok(msg.clone()),
        (None, Some(piped)) => Ok(piped),
        (None, None) => Err("provide --ask, --stdin, --print-prompt or --list".to_string()),
    }
}

async fn run(cli: &Cli) -> Result<String, String> {
    let mut config = build_config(cli)?;

    // Inspection needs no key.
    if cli.print_prompt || cli.list {
        config = config.with_credential_source(CredentialSource::Interactive);
        let tutor = Tutor::from_config(config)?;
        if let Availability::CatalogUnavailable { reason } = tutor.availability() {
            return Err(format!("{}: {reason}", tutor.policy().replies.catalog_unavailable));
        }
        if cli.print_prompt {
            return Ok(format!("{}\n", tutor.system_prompt()));
        }
        let listing = tutor
            .catalog()
            .map(|c| {
                c.iter()
                    .map(|r| format!("{}\t{}\n", r.id, r.function))
                    .collect::<String>()
            })
            .unwrap_or_default();
        return Ok(listing);
    }

    let message = read_message(cli)?;
    let tutor = Tutor::from_config(config)?;
    let mut session = tutor.new_session();
    let reply = session.send(&tutor, &message).await.map_err(|e| {
        match session.status_message(&tutor) {
            Some(banner) => format!("{banner} ({e})"),
            None => e.to_string(),
        }
    })?;

    match reply.outcome {
        ReplyOutcome::Failed(kind) => Err(format!("{}\n({kind})", reply.text)),
        ReplyOutcome::Answered | ReplyOutcome::SafetyBlocked => Ok(format!("{}\n", reply.text)),
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match run(&cli).await {
        Ok(output) => print!("{output}"),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}

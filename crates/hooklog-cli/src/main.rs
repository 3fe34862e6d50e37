use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hooklog_config::HooklogConfig;
use hooklog_core::{encode_form, CustomField, JsonEncoder, NotificationEvent, Recorder};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "hooklog", version, about = "Callback notification log tools")]
struct Cli {
    /// Config file (falls back to $HOOKLOG_CONFIG, then ./hooklog.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Append one notification to the log.
    Record {
        #[arg(long, default_value = "")]
        origin: String,
        /// Query string, e.g. "status=authorised&live=false" (re-encoded)
        #[arg(long, default_value = "")]
        query: String,
        /// Form body (re-encoded)
        #[arg(long, default_value = "")]
        form: String,
    },
    /// Print every recorded entry in append order.
    Replay {
        #[arg(long)]
        json: bool,
    },
    /// Encode name=value pairs as a JSON array.
    Encode { fields: Vec<String> },
    /// Validate and print the effective configuration.
    CheckConfig,
}

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .compact()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Encode { fields } => {
            let fields = fields
                .iter()
                .map(|raw| parse_field(raw))
                .collect::<Result<Vec<_>>>()?;
            println!("{}", JsonEncoder::new(fields).to_json()?);
        }
        Commands::CheckConfig => {
            let config = load_config(cli.config)?;
            print!("{}", toml::to_string_pretty(&config)?);
        }
        Commands::Record {
            origin,
            query,
            form,
        } => {
            let config = load_config(cli.config)?;
            let recorder = Recorder::new(Arc::new(config.store.open()));
            let event = NotificationEvent::now(origin)
                .with_query(encode_form(query.as_bytes()))
                .with_form(encode_form(form.as_bytes()));
            recorder
                .record(event)
                .context("failed to record notification")?;
            println!("Recorded to {}", config.store.path.display());
        }
        Commands::Replay { json } => {
            let config = load_config(cli.config)?;
            let entries = config.store.open().replay()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else if entries.is_empty() {
                println!("No entries in {}", config.store.path.display());
            } else {
                for entry in entries {
                    println!("{}\t{}", entry.timestamp(), entry.origin());
                    println!("  query: {}", entry.query);
                    println!("  form:  {}", entry.form);
                }
            }
        }
    }

    Ok(())
}

fn load_config(path: Option<PathBuf>) -> Result<HooklogConfig> {
    let config = HooklogConfig::load(path.as_deref()).context("failed to load configuration")?;
    debug!(log_path = %config.store.path.display(), "configuration loaded");
    Ok(config)
}

fn parse_field(raw: &str) -> Result<CustomField> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow::anyhow!("expected name=value, got '{raw}'"))?;
    Ok(CustomField::new(name, value))
}

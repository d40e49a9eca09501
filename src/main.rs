use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, trace};
use tracing_subscriber::EnvFilter;

use stagehand::config::{ConfigLoader, StagehandConfig};
use stagehand::error::describe_error_code;
use stagehand::retry::RetryDriver;
use stagehand::storage::{CheckpointStore, FieldValue, Identity, Level};
use stagehand::subprocess::{
    CommandAuthenticator, CommandProbe, JsonCommandRunner, ProcessCommandBuilder,
};
use stagehand::{Completion, StageRunner, StagehandError};

/// Resumable checkpoints for provisioning pipelines
#[derive(Parser)]
#[command(name = "stagehand")]
#[command(
    about = "Inspect pipeline status and run commands as resumable stages",
    long_about = None
)]
struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace, -vvv for all)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to configuration file (default: ./stagehand.toml if present)
    #[arg(short = 'c', long, global = true)]
    config: Option<PathBuf>,

    /// Status file to use instead of the configured one
    #[arg(long, global = true)]
    status_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect or edit the status document
    Status {
        #[command(subcommand)]
        command: StatusCommands,
    },
    /// Run a JSON-speaking command as a resumable stage
    Run {
        #[command(flatten)]
        target: FieldTarget,

        /// Command that reports whether the side effect exists after a timeout
        #[arg(long)]
        probe: Option<String>,

        /// Command that restores credentials after a stale-credential error
        #[arg(long)]
        reauth: Option<String>,

        /// Working directory for the command
        #[arg(long)]
        cwd: Option<PathBuf>,

        /// Environment override for the command (KEY=VALUE, repeatable)
        #[arg(long = "env", value_parser = parse_env_pair)]
        envs: Vec<(String, String)>,

        /// The command and its arguments
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },
}

#[derive(Subcommand)]
enum StatusCommands {
    /// Print the whole status document
    Show {
        /// Print JSON instead of YAML
        #[arg(long)]
        json: bool,
    },
    /// Print one field; exits with 1 when it is absent
    Get {
        #[command(flatten)]
        target: FieldTarget,
    },
    /// Write one field
    Set {
        #[command(flatten)]
        target: FieldTarget,

        /// Value; `true`/`false` are stored as booleans, other text as a string
        value: String,

        /// Parse the value as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete the status file
    Reset,
}

#[derive(Args)]
struct FieldTarget {
    /// Hub identifier
    #[arg(long)]
    hub: String,

    /// Sub-environment identifier
    #[arg(long, default_value = "")]
    sub_env: String,

    /// Sub-resource identifier
    #[arg(long, default_value = "")]
    sub_resource: String,

    /// Level the field lives at: hub, sub-env, sub-resource (or 1, 2, 3)
    #[arg(long)]
    level: Level,

    /// Field name
    #[arg(long)]
    key: String,
}

impl FieldTarget {
    fn identity(&self) -> Identity {
        Identity::new(&self.hub, &self.sub_env, &self.sub_resource)
    }
}

fn parse_env_pair(raw: &str) -> std::result::Result<(String, String), String> {
    raw.split_once('=')
        .filter(|(key, _)| !key.is_empty())
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", raw))
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_env("STAGEHAND_LOG").unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(cli.verbose >= 2)
        .with_thread_ids(cli.verbose >= 3)
        .with_line_number(cli.verbose >= 3)
        .init();

    debug!("stagehand started with verbosity level: {}", cli.verbose);
    trace!("Full CLI args: {:?}", std::env::args().collect::<Vec<_>>());

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("Fatal error: {:#}", e);
            let code = match e.downcast_ref::<StagehandError>() {
                Some(err) => {
                    debug!(
                        "Error code {} ({})",
                        err.code(),
                        describe_error_code(err.code())
                    );
                    eprintln!("Error: {}", err.user_message());
                    err.exit_code()
                }
                None => {
                    eprintln!("Error: {e:#}");
                    1
                }
            };
            std::process::exit(code);
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    let config = load_config(cli.config.as_ref(), cli.status_file).await?;
    let store = CheckpointStore::open(&config.store)
        .await
        .map_err(StagehandError::from)?;

    match cli.command {
        Commands::Status { command } => run_status(&store, command).await,
        Commands::Run {
            target,
            probe,
            reauth,
            cwd,
            envs,
            command,
        } => {
            let mut builder = ProcessCommandBuilder::from_words(command.as_slice())
                .map_err(StagehandError::from)?
                .envs(envs);
            if let Some(dir) = &cwd {
                builder = builder.current_dir(dir);
            }

            let mut driver = RetryDriver::new(config.retry.clone());
            if let Some(line) = probe {
                let probe = ProcessCommandBuilder::from_shell(&line)
                    .map_err(StagehandError::from)?
                    .build();
                let observer = CommandProbe::new(JsonCommandRunner::new(probe));
                driver = driver.with_probe(Arc::new(observer));
            }
            if let Some(line) = reauth {
                let auth = ProcessCommandBuilder::from_shell(&line)
                    .map_err(StagehandError::from)?
                    .build();
                driver = driver.with_authenticator(Arc::new(CommandAuthenticator::new(
                    JsonCommandRunner::new(auth),
                )));
            }

            let runner = StageRunner::with_driver(store, driver);
            let command = JsonCommandRunner::new(builder.build());
            let completion = runner
                .run_with_retry(&target.identity(), target.level, &target.key, &command)
                .await?;

            if let Completion::Skipped(_) = completion {
                info!("{} already recorded as done", target.key);
            }
            println!("{}", serde_json::to_string(&completion.into_inner())?);
            Ok(0)
        }
    }
}

async fn load_config(
    path: Option<&PathBuf>,
    status_file: Option<PathBuf>,
) -> Result<StagehandConfig> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = path {
        loader = loader.with_file(path);
    }
    let mut config = loader.load().await?;
    if let Some(status_file) = status_file {
        config.store.status_file = status_file;
    }
    debug!("Using status file {}", config.store.status_file.display());
    Ok(config)
}

async fn run_status(store: &CheckpointStore, command: StatusCommands) -> Result<i32> {
    match command {
        StatusCommands::Show { json } => {
            let document = store.snapshot().await.map_err(StagehandError::from)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&document)?);
            } else {
                print!("{}", serde_yaml::to_string(&document)?);
            }
            Ok(0)
        }
        StatusCommands::Get { target } => {
            let value = store
                .get(&target.identity(), target.level, &target.key)
                .await
                .map_err(StagehandError::from)?;
            match value {
                Some(FieldValue::Text(text)) => {
                    println!("{}", text);
                    Ok(0)
                }
                Some(other) => {
                    println!("{}", serde_json::to_string(&other)?);
                    Ok(0)
                }
                None => Ok(1),
            }
        }
        StatusCommands::Set {
            target,
            value,
            json,
        } => {
            let value = parse_value(&value, json)?;
            store
                .set(&target.identity(), target.level, &target.key, value)
                .await
                .map_err(StagehandError::from)?;
            Ok(0)
        }
        StatusCommands::Reset => {
            let removed = store.reset().await.map_err(StagehandError::from)?;
            if removed {
                println!("Removed {}", store.path().display());
            } else {
                println!("Nothing to reset at {}", store.path().display());
            }
            Ok(0)
        }
    }
}

fn parse_value(raw: &str, json: bool) -> Result<FieldValue> {
    if json {
        let value: serde_json::Value =
            serde_json::from_str(raw).with_context(|| format!("'{}' is not valid JSON", raw))?;
        return Ok(FieldValue::from_json(value));
    }
    Ok(match raw {
        "true" => FieldValue::Bool(true),
        "false" => FieldValue::Bool(false),
        text => FieldValue::Text(text.to_string()),
    })
}

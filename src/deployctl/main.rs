//! Deployment tool for the memories bot container.
//!
//! Generates and validates the deployment descriptor, renders the
//! Dockerfile from it, scans built images for a leaked bot token, and
//! probes the liveness endpoint (used by the image's `HEALTHCHECK`).

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use snapchat_memories_bot::config::TOKEN_ENV_VAR;
use snapchat_memories_bot::deploy::{self, DeploymentConfig};
use snapchat_memories_bot::health::{self, HealthCheck, HealthStatus};

/// Deployment descriptor tool.
#[derive(Parser, Debug)]
#[command(name = "deployctl")]
#[command(about = "Builds, audits and probes the memories bot deployment")]
#[command(version)]
struct Args {
    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "warn", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write an example descriptor.
    Example {
        #[arg(short, long, default_value = "deploy.example.json")]
        output: PathBuf,
    },

    /// Validate a descriptor.
    Validate {
        #[arg(short, long, default_value = "deploy.json")]
        file: PathBuf,
    },

    /// Render the Dockerfile for a descriptor.
    Render {
        #[arg(short, long, default_value = "deploy.json")]
        file: PathBuf,

        /// Output path; prints to stdout when omitted.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Scan an image archive (`docker save`) or a plain file for the secret.
    ///
    /// The secret is read from an environment variable so it never appears
    /// on the command line.
    Scan {
        path: PathBuf,

        /// Environment variable holding the secret.
        #[arg(long, default_value = TOKEN_ENV_VAR)]
        secret_env: String,

        /// Treat the path as a plain file instead of a tar archive.
        #[arg(long)]
        plain: bool,
    },

    /// Probe the liveness endpoint.
    Probe {
        #[arg(long, default_value = "http://localhost:5000/health")]
        url: String,

        /// Probe once and exit (for Docker HEALTHCHECK).
        #[arg(long)]
        once: bool,

        #[arg(long, default_value_t = 30)]
        interval_secs: u64,

        #[arg(long, default_value_t = 10)]
        timeout_secs: u64,

        #[arg(long, default_value_t = 5)]
        start_period_secs: u64,

        #[arg(long, default_value_t = 3)]
        retries: u32,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&args.log_level);

    match args.command {
        Command::Example { output } => generate_example(&output),
        Command::Validate { file } => validate(&file),
        Command::Render { file, output } => render(&file, output.as_deref()),
        Command::Scan {
            path,
            secret_env,
            plain,
        } => scan(&path, &secret_env, plain),
        Command::Probe {
            url,
            once,
            interval_secs,
            timeout_secs,
            start_period_secs,
            retries,
        } => {
            let check = HealthCheck {
                interval: Duration::from_secs(interval_secs),
                timeout: Duration::from_secs(timeout_secs),
                start_period: Duration::from_secs(start_period_secs),
                retries,
                url,
            };
            probe(&check, once).await
        }
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn generate_example(output: &Path) -> ExitCode {
    let example = DeploymentConfig::example();

    match example.save_to_file(output) {
        Ok(()) => {
            println!("✓ Example descriptor written to: {}", output.display());
            println!("\nSecrets to inject at runtime:");
            for name in example.secret_names() {
                println!("  - {name}");
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Failed to write example descriptor: {e}");
            ExitCode::FAILURE
        }
    }
}

fn load(file: &Path) -> Option<DeploymentConfig> {
    match DeploymentConfig::load_from_file(file) {
        Ok(config) => Some(config),
        Err(e) => {
            eprintln!("✗ Failed to load {}: {e}", file.display());
            None
        }
    }
}

fn validate(file: &Path) -> ExitCode {
    let Some(config) = load(file) else {
        return ExitCode::FAILURE;
    };

    match config.validate() {
        Ok(()) => {
            println!("✓ {} is valid", file.display());
            println!("  Entry point: {} {}", config.entry_point.binary, config.entry_point.args.join(" "));
            println!("  Port: {}", config.port);
            let secrets: Vec<&str> = config.secret_names().collect();
            if !secrets.is_empty() {
                println!("  Runtime secrets: {}", secrets.join(", "));
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ {e}");
            ExitCode::FAILURE
        }
    }
}

fn render(file: &Path, output: Option<&Path>) -> ExitCode {
    let Some(config) = load(file) else {
        return ExitCode::FAILURE;
    };

    let dockerfile = match config.render_dockerfile() {
        Ok(d) => d,
        Err(e) => {
            eprintln!("✗ {e}");
            return ExitCode::FAILURE;
        }
    };

    match output {
        Some(path) => match std::fs::write(path, dockerfile) {
            Ok(()) => {
                println!("✓ Dockerfile written to: {}", path.display());
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("✗ Failed to write {}: {e}", path.display());
                ExitCode::FAILURE
            }
        },
        None => {
            print!("{dockerfile}");
            ExitCode::SUCCESS
        }
    }
}

fn scan(path: &Path, secret_env: &str, plain: bool) -> ExitCode {
    let Ok(secret) = std::env::var(secret_env) else {
        eprintln!("✗ {secret_env} is not set; nothing to scan for");
        return ExitCode::from(2);
    };

    let findings = if plain {
        deploy::scan_file(path, secret.as_bytes()).map(|f| f.into_iter().collect::<Vec<_>>())
    } else {
        deploy::scan_archive_file(path, secret.as_bytes())
    };

    match findings {
        Ok(findings) if findings.is_empty() => {
            println!("✓ {} does not contain the value of {secret_env}", path.display());
            ExitCode::SUCCESS
        }
        Ok(findings) => {
            eprintln!("✗ Value of {secret_env} found in {} place(s):", findings.len());
            for finding in findings {
                eprintln!("  - {} (offset {})", finding.location, finding.offset);
            }
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("✗ Scan failed: {e}");
            ExitCode::from(2)
        }
    }
}

async fn probe(check: &HealthCheck, once: bool) -> ExitCode {
    let client = reqwest::Client::new();

    if once {
        return match health::probe_once(&client, check).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("✗ {e}");
                ExitCode::FAILURE
            }
        };
    }

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            eprintln!("✗ Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    match health::run_probe(&client, check, shutdown).await {
        HealthStatus::Unhealthy => {
            eprintln!("✗ {} is unhealthy after {} consecutive failures", check.url, check.retries);
            ExitCode::FAILURE
        }
        status => {
            println!("Last status: {status}");
            ExitCode::SUCCESS
        }
    }
}

//! authrelay CLI
//!
//! Command-line interface for making authenticated API calls with
//! transparent credential refresh.
//!
//! # Usage
//!
//! ```bash
//! # Store a session issued by the API's sign-in flow
//! authrelay login --access eyJhbGci... --refresh 8f2c...
//!
//! # Show whether a session is stored
//! authrelay status --format json
//!
//! # Call the API; an expired access credential is refreshed on the way
//! authrelay request GET jobs
//! authrelay request POST applications --data '{"job": 42}'
//!
//! # Forget the session
//! authrelay logout
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use authrelay_core::{ApiError, ApiRequest, CredentialPair, Method};
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt};

mod client;
mod config;

/// `status` flags a session whose access credential expires within this many minutes.
const EXPIRY_WARNING_MINUTES: i64 = 5;

#[derive(Parser)]
#[command(name = "authrelay")]
#[command(about = "Authenticated API calls with automatic credential refresh")]
#[command(version)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a credential pair as the current session
    Login {
        /// Access credential sent with every request
        #[arg(long)]
        access: String,

        /// Refresh credential used to obtain new access credentials
        #[arg(long)]
        refresh: Option<String>,

        /// Access credential lifetime in seconds
        #[arg(long)]
        expires_in: Option<i64>,
    },

    /// Forget the current session
    Logout,

    /// Show whether a session is stored
    Status {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Send one authenticated request and print the response body
    Request {
        /// HTTP method (GET, POST, PUT, PATCH, DELETE, HEAD, OPTIONS)
        method: Method,

        /// Path relative to the API base URL, or an absolute URL
        path: String,

        /// JSON request body
        #[arg(short, long)]
        data: Option<String>,

        /// Extra header as 'Name: value' (repeatable)
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = config::load_config(cli.config)?;
    init_logging(&config.log_level, cli.verbose);
    debug!("Loaded configuration from {:?}", config.config_path);

    match cli.command {
        Commands::Login {
            access,
            refresh,
            expires_in,
        } => login(&config, access, refresh, expires_in).await,
        Commands::Logout => logout(&config).await,
        Commands::Status { format } => status(&config, &format).await,
        Commands::Request {
            method,
            path,
            data,
            headers,
        } => request(&config, method, path, data, &headers).await,
    }
}

fn init_logging(level: &str, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn login(
    config: &config::CliConfig,
    access: String,
    refresh: Option<String>,
    expires_in: Option<i64>,
) -> Result<()> {
    let mut pair = CredentialPair::new(access);
    if let Some(refresh) = refresh {
        pair = pair.with_refresh(refresh);
    }
    if let Some(seconds) = expires_in {
        pair = pair.expiring_in(seconds);
    }

    let store = client::open_store(config).await?;
    store.set(&pair).await.context("Failed to store session")?;

    info!("Stored session in {:?} store", config.store);
    println!("Signed in");
    Ok(())
}

async fn logout(config: &config::CliConfig) -> Result<()> {
    let store = client::open_store(config).await?;
    store.clear().await.context("Failed to clear session")?;

    println!("Signed out");
    Ok(())
}

async fn status(config: &config::CliConfig, format: &str) -> Result<()> {
    let store = client::open_store(config).await?;
    let session = store.get().await.context("Failed to read session")?;
    let warning = chrono::Duration::minutes(EXPIRY_WARNING_MINUTES);

    match format {
        "json" => {
            let report = match &session {
                Some(pair) => serde_json::json!({
                    "signed_in": true,
                    "has_refresh": pair.refresh.is_some(),
                    "expires_at": pair.expires_at,
                    "expired": pair.is_expired(),
                    "expiring_soon": pair.expires_within(warning),
                }),
                None => serde_json::json!({ "signed_in": false }),
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        _ => match &session {
            Some(pair) => {
                println!("Signed in");
                println!(
                    "  Refresh credential: {}",
                    if pair.refresh.is_some() { "yes" } else { "no" }
                );
                if let Some(expires_at) = pair.expires_at {
                    let state = if pair.is_expired() {
                        "expired"
                    } else if pair.expires_within(warning) {
                        "expires soon"
                    } else {
                        "expires"
                    };
                    println!("  Access credential {} at {}", state, expires_at.to_rfc3339());
                }
            }
            None => println!("Not signed in"),
        },
    }
    Ok(())
}

async fn request(
    config: &config::CliConfig,
    method: Method,
    path: String,
    data: Option<String>,
    headers: &[String],
) -> Result<()> {
    let mut request = ApiRequest::new(method, path);

    for raw in headers {
        let (name, value) = parse_header(raw)?;
        request = request.header(name, value);
    }

    if let Some(data) = data {
        let body: serde_json::Value =
            serde_json::from_str(&data).context("--data is not valid JSON")?;
        request = request.json(&body)?;
    }

    let client = client::connect(config).await?;

    match client.send(request).await {
        Ok(response) => {
            println!("{}", response.text());
            Ok(())
        }
        Err(ApiError::Status(response)) => {
            bail!("HTTP {}: {}", response.status, response.text())
        }
        Err(e) => Err(e.into()),
    }
}

/// Split a `Name: value` header argument.
fn parse_header(raw: &str) -> Result<(&str, &str)> {
    let (name, value) = raw
        .split_once(':')
        .with_context(|| format!("Invalid header {:?}, expected 'Name: value'", raw))?;

    let name = name.trim();
    if name.is_empty() {
        bail!("Invalid header {:?}: empty name", raw);
    }

    Ok((name, value.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_header() {
        assert_eq!(parse_header("Accept: application/json").unwrap(), ("Accept", "application/json"));
        assert_eq!(parse_header("X-Trace:abc").unwrap(), ("X-Trace", "abc"));
        assert_eq!(parse_header("X-Url: http://a:b").unwrap(), ("X-Url", "http://a:b"));
    }

    #[test]
    fn test_parse_header_rejects_malformed() {
        assert!(parse_header("no-colon").is_err());
        assert!(parse_header(": value").is_err());
    }

    #[test]
    fn test_cli_parses_request() {
        let cli = Cli::try_parse_from([
            "authrelay", "request", "post", "jobs", "--data", "{}", "-H", "A: b",
        ])
        .unwrap();

        match cli.command {
            Commands::Request {
                method, headers, ..
            } => {
                assert_eq!(method, Method::Post);
                assert_eq!(headers, vec!["A: b".to_string()]);
            }
            _ => panic!("expected request command"),
        }
    }
}

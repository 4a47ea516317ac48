//! # dgramrpc CLI Entry Point
//!
//! Main binary for the dgramrpc UDP RPC system. Starts servers, makes single
//! calls and runs the smoke test.
//!
//! ## Usage
//!
//! ```bash
//! # Start a server on the default address (DGRAMRPC_ADDR:DGRAMRPC_PORT)
//! dgramrpc serve
//!
//! # Start a server that stalls one request in five for 3 seconds
//! dgramrpc serve -b 127.0.0.1:5000 --fault-probability 0.2 --fault-delay-ms 3000
//!
//! # Make an RPC call (prints the response envelope as JSON)
//! dgramrpc call 127.0.0.1:5000 add -p '{"a": 5, "b": 7}'
//!
//! # Exercise every builtin method
//! dgramrpc smoke 127.0.0.1:5000
//! ```

use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use argh::FromArgs;
use dgramrpc_cli::config::EnvDefaults;
use dgramrpc_cli::smoke::run_smoke;
use dgramrpc_client::Client;
use dgramrpc_common::{Params, Status, Value};
use dgramrpc_server::{FaultInjection, LedgerConfig, MethodRegistry, ServerConfig, UdpServer};
use tokio_util::sync::CancellationToken;

#[derive(FromArgs)]
/// dgramrpc - at-most-once RPC over UDP
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Serve(ServeArgs),
    Call(CallArgs),
    Smoke(SmokeArgs),
}

/// Arguments for starting a dgramrpc server.
///
/// The server exposes the builtin methods and suppresses re-execution of
/// any request id it has seen within the retention window.
#[derive(FromArgs)]
#[argh(subcommand, name = "serve")]
/// start a dgramrpc server
struct ServeArgs {
    /// address to bind the server's UDP socket to
    ///
    /// Defaults to DGRAMRPC_ADDR:DGRAMRPC_PORT, or 0.0.0.0:5000 when those
    /// are unset.
    #[argh(option, short = 'b')]
    bind: Option<String>,

    /// how long a request id suppresses duplicates, in seconds
    #[argh(option, long = "retention-secs", default = "300")]
    retention_secs: u64,

    /// interval between sweeps of expired request ids, in seconds
    #[argh(option, long = "sweep-interval-secs", default = "30")]
    sweep_interval_secs: u64,

    /// chance in [0, 1] that a request is artificially delayed
    ///
    /// Defaults to 0 (never).
    #[argh(option, long = "fault-probability", default = "0.0")]
    fault_probability: f64,

    /// length of the artificial delay, in milliseconds
    #[argh(option, long = "fault-delay-ms", default = "3000")]
    fault_delay_ms: u64,
}

/// Arguments for making a single RPC call.
///
/// Prints the raw response envelope to stdout, so the output can be piped to
/// other tools (e.g. `jq`). Exits non-zero when the server answers ERROR or
/// no answer arrives.
#[derive(FromArgs)]
#[argh(subcommand, name = "call")]
/// call an RPC method on a server
struct CallArgs {
    /// address of the server to call (host:port)
    #[argh(positional)]
    server_address: String,

    /// name of the RPC method to call
    #[argh(positional)]
    method: String,

    /// JSON object with the method's parameters
    ///
    /// Defaults to `{}`.
    #[argh(option, short = 'p', long = "params", default = "\"{}\".into()")]
    params: String,

    /// per-attempt timeout in milliseconds (default: DGRAMRPC_TIMEOUT_MS or 2000)
    #[argh(option, short = 't', long = "timeout-ms")]
    timeout_ms: Option<u64>,

    /// retries after the first attempt (default: DGRAMRPC_RETRIES or 3)
    #[argh(option, short = 'r', long = "retries")]
    retries: Option<u32>,
}

/// Arguments for the smoke test.
#[derive(FromArgs)]
#[argh(subcommand, name = "smoke")]
/// run every builtin method against a server
struct SmokeArgs {
    /// address of the server to test (host:port)
    #[argh(positional)]
    server_address: String,

    /// per-attempt timeout in milliseconds (default: DGRAMRPC_TIMEOUT_MS or 2000)
    #[argh(option, short = 't', long = "timeout-ms")]
    timeout_ms: Option<u64>,

    /// retries after the first attempt (default: DGRAMRPC_RETRIES or 3)
    #[argh(option, short = 'r', long = "retries")]
    retries: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // call: keep stdout clean for piping the envelope into other tools
    if !matches!(cli.command, Commands::Call(_)) {
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let defaults = EnvDefaults::from_env()?;

    match cli.command {
        Commands::Serve(args) => run_serve(args, &defaults).await,
        Commands::Call(args) => run_call(args, &defaults).await,
        Commands::Smoke(args) => run_smoke_command(args, &defaults).await,
    }
}

fn server_config(args: &ServeArgs) -> Result<ServerConfig> {
    let config = ServerConfig::default()
        .with_ledger(
            LedgerConfig::default()
                .with_retention(Duration::from_secs(args.retention_secs))
                .with_sweep_interval(Duration::from_secs(args.sweep_interval_secs)),
        )
        .with_fault(FaultInjection::new(
            args.fault_probability,
            Duration::from_millis(args.fault_delay_ms),
        ));

    config.validate()?;
    Ok(config)
}

async fn run_serve(args: ServeArgs, defaults: &EnvDefaults) -> Result<()> {
    let bind = args.bind.clone().unwrap_or_else(|| defaults.bind_addr());
    let config = server_config(&args)?;

    tracing::info!("Starting dgramrpc server on {}", bind);
    tracing::info!(
        "Dedup retention: {}s, sweep interval: {}s",
        args.retention_secs,
        args.sweep_interval_secs
    );
    if config.dispatcher.fault.is_enabled() {
        tracing::warn!(
            "Fault injection enabled: {:.0}% of requests delayed by {}ms",
            args.fault_probability * 100.0,
            args.fault_delay_ms
        );
    }

    let server = UdpServer::bind(&bind, MethodRegistry::with_builtins(), config).await?;

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Received Ctrl-C, shutting down");
                signal.cancel();
            }
            Err(e) => tracing::error!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    server.run_until(shutdown).await?;
    Ok(())
}

fn parse_params(raw: &str) -> Result<Params> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| anyhow!("Invalid JSON in params: {}", e))?;
    Ok(Params::try_from(value)?)
}

/// Executes the `call` subcommand.
///
/// No tracing is initialized for this command; the only stdout output is
/// the response envelope.
async fn run_call(args: CallArgs, defaults: &EnvDefaults) -> Result<()> {
    let params = parse_params(&args.params)?;
    let policy = defaults.retry_policy(args.timeout_ms, args.retries);

    let client = Client::connect(&args.server_address, policy).await?;
    let response = client.call(&args.method, params).await?;

    println!("{}", serde_json::to_string(&response)?);

    if response.status == Status::Error {
        bail!(
            "{} failed: {}",
            args.method,
            response.error_message.as_deref().unwrap_or("unknown error")
        );
    }

    Ok(())
}

async fn run_smoke_command(args: SmokeArgs, defaults: &EnvDefaults) -> Result<()> {
    let policy = defaults.retry_policy(args.timeout_ms, args.retries);
    let client = Client::connect(&args.server_address, policy).await?;

    tracing::info!("Running smoke test against {}", client.server_addr());
    let report = run_smoke(&client).await;
    println!("{}", report);

    if !report.all_passed() {
        bail!("{} of {} smoke cases failed", report.failed(), report.outcomes.len());
    }

    Ok(())
}

/// CLI argument parsing tests.
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_serve_defaults() {
        let args: Cli = Cli::from_args(&["dgramrpc"], &["serve"]).unwrap();
        match args.command {
            Commands::Serve(ServeArgs {
                bind,
                retention_secs,
                sweep_interval_secs,
                fault_probability,
                fault_delay_ms,
            }) => {
                assert!(bind.is_none());
                assert_eq!(retention_secs, 300);
                assert_eq!(sweep_interval_secs, 30);
                assert_eq!(fault_probability, 0.0);
                assert_eq!(fault_delay_ms, 3000);
            }
            _ => panic!("Expected Serve command"),
        }
    }

    #[test]
    fn test_cli_parse_serve_with_options() {
        let args: Cli = Cli::from_args(
            &["dgramrpc"],
            &[
                "serve",
                "-b", "127.0.0.1:6000",
                "--retention-secs", "60",
                "--sweep-interval-secs", "5",
                "--fault-probability", "0.2",
                "--fault-delay-ms", "1500",
            ],
        )
        .unwrap();
        match args.command {
            Commands::Serve(serve) => {
                assert_eq!(serve.bind.as_deref(), Some("127.0.0.1:6000"));

                let config = server_config(&serve).unwrap();
                assert_eq!(config.ledger.retention, Duration::from_secs(60));
                assert_eq!(config.ledger.sweep_interval, Duration::from_secs(5));
                assert_eq!(config.dispatcher.fault, FaultInjection::new(0.2, Duration::from_millis(1500)));
            }
            _ => panic!("Expected Serve command"),
        }
    }

    #[test]
    fn test_serve_rejects_bad_fault_probability() {
        let args: Cli = Cli::from_args(&["dgramrpc"], &["serve", "--fault-probability", "1.5"]).unwrap();
        match args.command {
            Commands::Serve(serve) => assert!(server_config(&serve).is_err()),
            _ => panic!("Expected Serve command"),
        }
    }

    #[test]
    fn test_cli_parse_call() {
        let args: Cli = Cli::from_args(
            &["dgramrpc"],
            &["call", "127.0.0.1:5000", "add", "-p", r#"{"a": 5, "b": 7}"#],
        )
        .unwrap();
        match args.command {
            Commands::Call(CallArgs {
                server_address,
                method,
                params,
                timeout_ms,
                retries,
            }) => {
                assert_eq!(server_address, "127.0.0.1:5000");
                assert_eq!(method, "add");
                assert_eq!(parse_params(&params).unwrap(), Params::new().with("a", 5).with("b", 7));
                assert!(timeout_ms.is_none());
                assert!(retries.is_none());
            }
            _ => panic!("Expected Call command"),
        }
    }

    #[test]
    fn test_cli_parse_call_default_params() {
        let args: Cli = Cli::from_args(&["dgramrpc"], &["call", "127.0.0.1:5000", "get_time", "-t", "500", "-r", "1"]).unwrap();
        match args.command {
            Commands::Call(CallArgs {
                params,
                timeout_ms,
                retries,
                ..
            }) => {
                assert_eq!(params, "{}");
                assert_eq!(timeout_ms, Some(500));
                assert_eq!(retries, Some(1));
            }
            _ => panic!("Expected Call command"),
        }
    }

    #[test]
    fn test_cli_parse_smoke() {
        let args: Cli = Cli::from_args(&["dgramrpc"], &["smoke", "127.0.0.1:5000", "--timeout-ms", "250"]).unwrap();
        match args.command {
            Commands::Smoke(SmokeArgs {
                server_address,
                timeout_ms,
                retries,
            }) => {
                assert_eq!(server_address, "127.0.0.1:5000");
                assert_eq!(timeout_ms, Some(250));
                assert!(retries.is_none());
            }
            _ => panic!("Expected Smoke command"),
        }
    }

    #[test]
    fn test_cli_call_requires_method() {
        assert!(Cli::from_args(&["dgramrpc"], &["call", "127.0.0.1:5000"]).is_err());
    }

    #[test]
    fn test_parse_params() {
        assert!(parse_params("null").unwrap().is_empty());
        assert!(parse_params("[1, 2]").is_err());
        assert!(parse_params("{not json").is_err());
    }
}

//! gsslayer acceptor server.
//!
//! Acquires a credential for the service, accepts TCP connections, negotiates
//! a security context with each client, reports the client and the negotiated
//! context, receives one message and sends back its MIC.
//!
//! # Usage
//!
//! ```text
//! gss-server --port 44444 --service TestService --keytab /etc/gsslayer.keytab
//! ```
//!
//! Unrecognized arguments print a usage line and exit successfully without
//! opening any socket.

use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;

use clap::error::ErrorKind;
use clap::Parser;
use gsslayer::config::{Config, DEFAULT_PORT, DEFAULT_SERVICE};
use gsslayer::{CredentialStore, KeytabMechanism, NameType, Server, VERSION};

#[derive(Parser, Debug)]
#[command(name = "gss-server")]
#[command(version = VERSION)]
#[command(about = "GSS-API style acceptor: negotiate, report, receive one message, send its MIC", long_about = None)]
struct Cli {
    /// Port to listen on
    #[arg(long, value_name = "PORT")]
    port: Option<String>,

    /// Service name to acquire credentials for
    #[arg(long, value_name = "NAME")]
    service: Option<String>,

    /// Keytab file
    #[arg(long, value_name = "PATH")]
    keytab: Option<PathBuf>,

    /// TOML config file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Serve a single connection and exit
    #[arg(long)]
    once: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

/// Resolved command-line options.
#[derive(Debug, PartialEq, Eq)]
struct Options {
    port: Option<u16>,
    bad_port: bool,
    service: Option<String>,
    keytab: Option<PathBuf>,
    config: Option<PathBuf>,
    once: bool,
    verbose: bool,
}

#[derive(Debug)]
enum Invocation {
    Run(Options),
    /// `--help` or `--version`
    Info(clap::Error),
    /// Bad invocation; carries the service named before the bad argument
    Usage(String),
}

fn usage_line(service: &str) -> String {
    format!("usage: gss-server --port {DEFAULT_PORT} --service <{service}>")
}

/// Service given on the command line up to the first argument that cannot
/// be parsed.
fn service_before_error(args: &[OsString]) -> String {
    let mut service = DEFAULT_SERVICE.to_string();
    let mut iter = args.iter().skip(1).map(|a| a.to_string_lossy());
    while let Some(arg) = iter.next() {
        match &*arg {
            "--service" => match iter.next() {
                Some(value) => service = value.into_owned(),
                None => break,
            },
            "--port" | "--keytab" | "--config" => {
                if iter.next().is_none() {
                    break;
                }
            },
            "--once" | "--verbose" | "-v" => {},
            other => {
                if let Some(value) = other.strip_prefix("--service=") {
                    service = value.to_string();
                } else if !["--port=", "--keytab=", "--config="]
                    .iter()
                    .any(|prefix| other.starts_with(prefix))
                {
                    break;
                }
            },
        }
    }
    service
}

fn parse_args<I, T>(args: I) -> Invocation
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let args: Vec<OsString> = args.into_iter().map(Into::into).collect();
    let cli = match Cli::try_parse_from(args.iter().cloned()) {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            return Invocation::Info(e);
        },
        Err(_) => return Invocation::Usage(service_before_error(&args)),
    };

    let (port, bad_port) = match cli.port.as_deref().map(str::parse::<u16>) {
        None => (None, false),
        Some(Ok(port)) => (Some(port), false),
        Some(Err(_)) => (Some(DEFAULT_PORT), true),
    };

    Invocation::Run(Options {
        port,
        bad_port,
        service: cli.service,
        keytab: cli.keytab,
        config: cli.config,
        once: cli.once,
        verbose: cli.verbose,
    })
}

/// Layer the config file, then `GSSLAYER_*` variables from `env`, then the
/// command line.
fn build_config(opts: &Options, env: impl Fn(&str) -> Option<String>) -> anyhow::Result<Config> {
    let mut config = match &opts.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    }
    .with_vars(env);

    if let Some(port) = opts.port {
        config.server.port = port;
    }
    if let Some(service) = &opts.service {
        config.server.service.clone_from(service);
    }
    if let Some(keytab) = &opts.keytab {
        config.keytab.path.clone_from(keytab);
    }
    config.server.once |= opts.once;
    config.validate()?;
    Ok(config)
}

async fn serve(config: Config) -> anyhow::Result<()> {
    tracing::info!("service id: {}", config.server.service);

    let mechanism = KeytabMechanism::from_keytab_file(&config.keytab.path).with_max_lifetime(config.context.lifetime());
    let store = CredentialStore::new(Arc::new(mechanism));
    let credential = store.acquire(&config.server.service, NameType::HostBasedService)?;

    let server = Server::bind(config.server.listen_addr(), credential, config.transport)
        .await?
        .with_required_flags(config.context.required_flags());

    if config.server.once {
        let report = server.serve_one().await?;
        tracing::debug!(?report, "connection complete");
    } else {
        server.run().await?;
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let opts = match parse_args(std::env::args_os()) {
        Invocation::Run(opts) => opts,
        Invocation::Info(e) => {
            e.print()?;
            return Ok(());
        },
        Invocation::Usage(service) => {
            println!("{}", usage_line(&service));
            return Ok(());
        },
    };

    // Initialize logging
    let log_level = if opts.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    if opts.bad_port {
        eprintln!("incorrect port number");
        tracing::warn!(port = DEFAULT_PORT, "incorrect port number, using default");
    }

    let config = build_config(&opts, |key| std::env::var(key).ok())?;
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(serve(config))
}

//! Demo initiator for `gss-server`.
//!
//! Negotiates a context with the built-in keytab mechanism, sends one
//! integrity-protected message and verifies the MIC the server returns.

use std::path::PathBuf;

use anyhow::{anyhow, bail, Context};
use clap::Parser;
use gsslayer::config::{DEFAULT_PORT, DEFAULT_SERVICE};
use gsslayer::mechanism::{Initiator, Keytab};
use gsslayer::transport::{self, TokenTransport, TransportConfig};
use gsslayer::{FlagSet, Name, NameType, Oid, VERSION};

#[derive(Parser, Debug)]
#[command(name = "gss-client")]
#[command(version = VERSION)]
#[command(about = "Demo initiator for gss-server", long_about = None)]
struct Cli {
    /// Server host
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Server port
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Target service name
    #[arg(long, default_value = DEFAULT_SERVICE)]
    service: String,

    /// Name to authenticate as
    #[arg(long, default_value = "client@LOCAL")]
    principal: String,

    /// Keytab holding the service key
    #[arg(long, default_value = "gsslayer.keytab")]
    keytab: PathBuf,

    /// Message to send
    #[arg(short, long, default_value = "Hello, GSS-API")]
    message: String,

    /// Request mutual authentication
    #[arg(long)]
    mutual: bool,

    /// Request replay detection
    #[arg(long)]
    replay: bool,

    /// Mechanism OID to offer (repeatable, defaults to the keytab mechanism)
    #[arg(long = "mech", value_name = "OID")]
    mechs: Vec<Oid>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let keytab = Keytab::from_file(&cli.keytab)?;
    let target = Name::parse(&cli.service, NameType::HostBasedService)?;
    let entry = keytab
        .find(&target)
        .ok_or_else(|| anyhow!("no keytab entry for {target}"))?;

    let mut flags = FlagSet::INTEG;
    if cli.mutual {
        flags |= FlagSet::MUTUAL;
    }
    if cli.replay {
        flags |= FlagSet::REPLAY;
    }
    let mut initiator = Initiator::new(&cli.principal, &cli.service, entry.key.clone()).with_flags(flags);
    if !cli.mechs.is_empty() {
        initiator = initiator.with_mechs(cli.mechs);
    }

    let mut transport = transport::connect((cli.host.as_str(), cli.port), TransportConfig::default())
        .await
        .with_context(|| format!("connecting to {}:{}", cli.host, cli.port))?;

    let init = initiator.initial_token().map_err(|s| anyhow!("initial token: {s}"))?;
    transport.send_token(&init).await?;
    let accept = transport.recv_token().await?;
    let step = initiator.finish(&accept).map_err(|s| anyhow!("acceptor rejected: {s}"))?;
    if let Some(confirm) = &step.output {
        transport.send_token(confirm).await?;
    }
    let mut session = step.session;
    tracing::info!(flags = %session.flags(), "context established");

    let wrapped = session.wrap(cli.message.as_bytes()).map_err(|s| anyhow!("wrap: {s}"))?;
    transport.send_token(&wrapped).await?;
    let mic = transport.recv_token().await?;

    if session.verify_mic(cli.message.as_bytes(), &mic) {
        println!("mic verified: {} bytes", mic.len());
        Ok(())
    } else {
        bail!("mic verification failed")
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run(cli))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mech_oids_parsed() {
        let cli = Cli::try_parse_from(["gss-client", "--mech", "1.2.840.113554.1.2.2", "--mech", "2.25.1"]).unwrap();
        assert_eq!(cli.mechs.len(), 2);
        assert_eq!(cli.mechs[0].as_str(), "1.2.840.113554.1.2.2");
        assert!(Cli::try_parse_from(["gss-client", "--mech", "not-an-oid"]).is_err());
    }
}

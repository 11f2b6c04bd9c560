pub mod file_lock;
pub mod wizard;

use anyhow::{Context, bail};
use clap::{ArgAction, Args as ClapArgs, Parser, Subcommand};
use log::debug;
use nmtether::{ControlState, SessionPhase, Tether, TimeoutConfig, classify};
use std::sync::Arc;
use std::time::Duration;

use crate::file_lock::acquire_app_lock;
use crate::wizard::TerminalWizard;

#[derive(Parser, Debug)]
#[command(name = "nmtether")]
#[command(about = "Set up Bluetooth tethering with NetworkManager")]
#[command(disable_version_flag = true)]
#[command(version)]
struct Args {
    #[arg(short = 'V', long = "version", action = ArgAction::SetTrue)]
    version: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show which tethering profile a phone supports
    Check(Peer),
    /// Turn tethering on for a phone
    Enable {
        #[command(flatten)]
        peer: Peer,
        /// Seconds to spend detecting the phone before giving up
        #[arg(long, default_value_t = 30)]
        timeout: u64,
    },
    /// Turn tethering off and delete the saved connection
    Disable(Peer),
    /// Delete every saved connection for a phone that was unpaired
    Forget {
        /// Bluetooth address, e.g. 00:1A:7D:DA:71:13
        address: String,
    },
}

#[derive(ClapArgs, Debug)]
struct Peer {
    /// Bluetooth address, e.g. 00:1A:7D:DA:71:13
    address: String,

    /// Service the phone advertises (NAP, DialupNetworking or a UUID)
    #[arg(short, long = "service", required = true)]
    services: Vec<String>,
}

pub fn run() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    if args.version {
        println!("nmtether {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let Some(command) = args.command else {
        bail!("no command given, see --help");
    };

    let runtime = tokio::runtime::Runtime::new().context("failed to start runtime")?;
    runtime.block_on(dispatch(command))
}

async fn dispatch(command: Command) -> anyhow::Result<()> {
    match command {
        Command::Check(peer) => {
            let profile = classify(&peer.services);
            if profile.is_eligible() {
                println!("{}: {profile}", peer.address);
            } else {
                println!("{}: no tethering service", peer.address);
            }
            Ok(())
        }
        Command::Enable { peer, timeout } => {
            let config = TimeoutConfig::new().with_negotiation_timeout(Duration::from_secs(timeout));
            enable(peer, config).await
        }
        Command::Disable(peer) => {
            let tether = system_tether().await?;
            let Some(control) = tether.build_control(&peer.address, &peer.services).await? else {
                bail!("{} offers no tethering service", peer.address);
            };
            control.disable().await?;
            println!("Tethering disabled for {}", peer.address);
            Ok(())
        }
        Command::Forget { address } => {
            let tether = system_tether().await?;
            let removed = tether.peer_removed(&address).await?;
            println!("Removed {removed} connection(s) for {address}");
            Ok(())
        }
    }
}

async fn system_tether() -> anyhow::Result<Tether> {
    Tether::system(Arc::new(TerminalWizard))
        .await
        .context("failed to reach the system bus")
}

async fn enable(peer: Peer, config: TimeoutConfig) -> anyhow::Result<()> {
    let _lock = match acquire_app_lock() {
        Ok(lock) => lock,
        Err(e) => bail!("Failed to start: {e}"),
    };

    let tether = system_tether().await?.with_timeout_config(config);
    let Some(control) = tether.build_control(&peer.address, &peer.services).await? else {
        bail!("{} offers no tethering service", peer.address);
    };

    if control.state().active {
        println!("Tethering is already set up for {}", peer.address);
        return Ok(());
    }

    control.enable().await?;

    let mut updates = control.subscribe();
    let mut last_status = String::new();
    let last = loop {
        let state: ControlState = updates.borrow_and_update().clone();
        if !state.status.is_empty() && state.status != last_status {
            println!("{}", state.status);
            last_status = state.status.clone();
        }
        if !state.phase.is_active() {
            break state;
        }
        updates.changed().await.context("negotiation stopped unexpectedly")?;
    };

    debug!("Negotiation finished: {:?}", last.phase);
    match last.phase {
        SessionPhase::Aborted(kind) => bail!("tethering was not enabled ({kind:?})"),
        _ if last.active => Ok(()),
        _ => bail!("tethering was not enabled"),
    }
}

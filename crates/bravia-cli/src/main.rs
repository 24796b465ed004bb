//! Command-line remote for Sony Bravia televisions.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bravia_control::{ActionResolver, BraviaTv, DeviceConfig};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::broadcast::error::RecvError;

/// Environment variables read when no flag is given.
mod env_vars {
    pub const HOST: &str = "BRAVIA_HOST";
    pub const PSK: &str = "BRAVIA_PSK";
    pub const MAC: &str = "BRAVIA_MAC";
    pub const LOG_JSON: &str = "BRAVIA_LOG_JSON";
}

/// Bravia remote - drive a Sony TV over its IP control API.
#[derive(Parser, Debug)]
#[command(name = "bravia")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Action to perform.
    #[command(subcommand)]
    command: Command,

    /// TOML device configuration.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Host name or IP address of the TV.
    #[arg(long, global = true)]
    host: Option<String>,

    /// Pre-shared key.
    #[arg(long, global = true)]
    psk: Option<String>,

    /// MAC address for wake-on-LAN.
    #[arg(long, global = true)]
    mac: Option<String>,

    /// Verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Toggle {
    On,
    Off,
}

impl Toggle {
    fn is_on(self) -> bool {
        self == Toggle::On
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Send one remote key.
    Action {
        name: String,
    },
    /// Send remote keys in order.
    Sequence {
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Go home, navigate and confirm.
    OpenApp {
        /// Name recorded as the open app.
        #[arg(short, long)]
        label: String,
        /// Navigation keys.
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Show or set the volume; negative values are relative.
    Volume {
        #[arg(allow_negative_numbers = true)]
        value: Option<i32>,
    },
    /// Show or set the channel.
    Channel {
        #[arg(allow_negative_numbers = true)]
        value: Option<i64>,
    },
    /// Show or set the power state.
    Power {
        #[arg(value_enum)]
        state: Option<Toggle>,
    },
    /// Set mute.
    Mute {
        #[arg(value_enum)]
        state: Toggle,
    },
    /// List known action names.
    Actions,
    /// Poll the TV and print state changes until interrupted.
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    if let Command::Actions = args.command {
        for name in ActionResolver::global().action_names() {
            println!("{}", name);
        }
        return Ok(());
    }

    let config = load_config(&args)?;
    let tv = BraviaTv::connect(config).context("Failed to set up TV")?;

    match args.command {
        Command::Action { name } => {
            tv.send_action(&name).await?;
            println!("Sent {}", name);
        }
        Command::Sequence { names } => {
            let report = tv.send_sequence(&names).await?;
            println!(
                "Sent {} in {}ms",
                report.actions.join(" "),
                report.elapsed.as_millis()
            );
        }
        Command::OpenApp { label, names } => {
            tv.open_app_sequence(&names, &label).await?;
            println!("Opened {}", label);
        }
        Command::Volume { value } => {
            let volume = match value {
                Some(level) => tv.set_volume(level).await?,
                None => tv.get_volume().await?,
            };
            println!("Volume: {}", volume);
        }
        Command::Channel { value } => {
            let channel = match value {
                Some(channel) => tv.set_channel(channel).await?,
                None => tv.get_channel().await?,
            };
            println!("Channel: {}", channel);
        }
        Command::Power { state } => {
            let on = match state {
                Some(state) => {
                    tv.set_power(state.is_on()).await?;
                    state.is_on()
                }
                None => tv.get_power().await?,
            };
            println!("Power: {}", if on { "on" } else { "off" });
        }
        Command::Mute { state } => {
            let muted = tv.set_mute(state.is_on()).await?;
            println!("Mute: {}", if muted { "on" } else { "off" });
        }
        Command::Watch => watch(&tv).await?,
        Command::Actions => {}
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let json_logging = std::env::var(env_vars::LOG_JSON)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(false);

    // Prefix match covers both bravia_control and bravia_cli targets.
    let default_level = if verbose { "bravia=debug" } else { "bravia=info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .compact()
            .init();
    }
}

/// File first, then flags, then environment for anything still unset.
fn load_config(args: &Args) -> Result<DeviceConfig> {
    let mut config = match &args.config {
        Some(path) => read_config(path)?,
        None => {
            let host = args
                .host
                .clone()
                .or_else(|| std::env::var(env_vars::HOST).ok())
                .ok_or_else(|| {
                    anyhow::anyhow!("No TV configured. Pass --config or --host, or set BRAVIA_HOST.")
                })?;
            DeviceConfig::new(host)
        }
    };

    if let Some(host) = &args.host {
        config.host = host.clone();
    }
    if let Some(psk) = args.psk.clone().or_else(|| std::env::var(env_vars::PSK).ok()) {
        config.psk = psk;
    }
    if let Some(mac) = args.mac.clone().or_else(|| std::env::var(env_vars::MAC).ok()) {
        config.mac_address = Some(mac);
    }

    config.validate()?;
    Ok(config)
}

fn read_config(path: &Path) -> Result<DeviceConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))
}

async fn watch(tv: &BraviaTv) -> Result<()> {
    let mut events = tv.subscribe();
    let poller = tv.poller();
    poller.poll_once().await;
    poller.start().await;
    println!("Watching {} (Ctrl-C to stop)", tv.name());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(event) => println!(
                    "{} {} {:?} {:?}",
                    event.timestamp.format("%H:%M:%S"),
                    event.control,
                    event.property,
                    event.value
                ),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event stream lagged");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    poller.stop().await;
    Ok(())
}

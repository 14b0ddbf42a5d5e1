mod config_commands;
mod relay_commands;

use std::path::PathBuf;

use {
    clap::{Parser, Subcommand},
    echo_config::EchoConfig,
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(
    name = "discord-echo",
    about = "discord-echo: relay in-game channel chat to and from Discord"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file (overrides discovery in ./ and ~/.config/discord-echo/).
    #[arg(long, global = true, env = "DISCORD_ECHO_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the relay next to the map server (default when no subcommand is provided).
    Run,
    /// Validate the configuration file and report errors/warnings.
    Check {
        /// Show informational diagnostics in addition to errors and warnings.
        #[arg(long)]
        verbose: bool,
    },
    /// Write a documented default configuration file.
    Init {
        /// Destination (default: ~/.config/discord-echo/discord-echo.toml).
        path: Option<PathBuf>,
    },
    /// Post one message through a channel's webhook.
    Send {
        /// In-game channel whose webhook to use.
        #[arg(long)]
        channel: String,
        /// Display name for the post.
        #[arg(long, default_value = "discord-echo")]
        author: String,
        #[arg(short, long)]
        message: String,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

/// Load the explicit config file or discover one, then apply env overrides.
fn load_config(cli: &Cli) -> anyhow::Result<EchoConfig> {
    let mut config = match &cli.config {
        Some(path) => echo_config::load_config(path)?,
        None => echo_config::discover_and_load(),
    };
    echo_config::apply_env_overrides(&mut config);
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "discord-echo starting");

    match cli.command {
        None | Some(Commands::Run) => {
            let config = load_config(&cli)?;
            relay_commands::run(config).await
        },
        Some(Commands::Check { verbose }) => config_commands::check(cli.config.as_deref(), verbose),
        Some(Commands::Init { ref path }) => config_commands::init(path.clone()),
        Some(Commands::Send {
            ref channel,
            ref author,
            ref message,
        }) => {
            let config = load_config(&cli)?;
            relay_commands::send(config, channel.clone(), author.clone(), message.clone()).await
        },
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_run() {
        let cli = Cli::try_parse_from(["discord-echo"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.log_level, "info");
        assert!(!cli.json_logs);
    }

    #[test]
    fn send_arguments() {
        let cli = Cli::try_parse_from([
            "discord-echo",
            "--json-logs",
            "send",
            "--channel",
            "trade",
            "-m",
            "WTS sword",
        ])
        .unwrap();
        assert!(cli.json_logs);
        match cli.command {
            Some(Commands::Send {
                channel,
                author,
                message,
            }) => {
                assert_eq!(channel, "trade");
                assert_eq!(author, "discord-echo");
                assert_eq!(message, "WTS sword");
            },
            _ => panic!("expected send"),
        }
    }

    #[test]
    fn send_requires_channel() {
        assert!(Cli::try_parse_from(["discord-echo", "send", "-m", "hi"]).is_err());
    }

    #[test]
    fn explicit_config_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.toml");
        std::fs::write(
            &path,
            "[[channels]]\ningame_channel = \"main\"\ndiscord_channel_id = \"1\"\n",
        )
        .unwrap();
        let cli = Cli::try_parse_from([
            "discord-echo",
            "--config",
            path.to_str().unwrap(),
            "check",
        ])
        .unwrap();
        let config = load_config(&cli).unwrap();
        assert_eq!(config.channels[0].ingame_channel, "main");
    }
}

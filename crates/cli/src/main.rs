use std::path::Path;

use beacon_core::config::BeaconConfig;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "beacon", about = "Client-side telemetry event pipeline", version)]
struct Cli {
    /// Path to configuration file
    #[arg(long, default_value = "beacon.toml")]
    config: String,

    /// Path to the preference store (opt-in flag and vendor id)
    #[arg(long, default_value = "beacon-prefs.json")]
    prefs: String,

    /// Log at debug level
    #[arg(long, short)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing configuration file
        #[arg(long)]
        force: bool,
    },
    /// Show endpoint, opt-in flag and vendor id
    Status,
    /// Opt in to telemetry
    Enable,
    /// Opt out of telemetry
    Disable,
    /// Send events from a newline-delimited JSON file through the pipeline
    Replay {
        /// File with one JSON event object per line
        file: String,
    },
}

impl Cli {
    fn log_level(&self) -> &'static str {
        let debug_logging = BeaconConfig::load(Path::new(&self.config))
            .map(|c| c.telemetry.debug_logging)
            .unwrap_or(false);
        if self.verbose || debug_logging {
            "debug"
        } else {
            "info"
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_level())),
        )
        .init();

    match cli.command {
        Commands::Init { force } => {
            commands::init::run(&cli.config, force).await?;
        }
        Commands::Status => {
            commands::status::run(&cli.config, &cli.prefs).await?;
        }
        Commands::Enable => {
            commands::toggle::run(&cli.config, &cli.prefs, true).await?;
        }
        Commands::Disable => {
            commands::toggle::run(&cli.config, &cli.prefs, false).await?;
        }
        Commands::Replay { file } => {
            commands::replay::run(&cli.config, &cli.prefs, &file).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn cli_parse_defaults() {
        let cli = Cli::parse_from(["beacon", "status"]);
        assert_eq!(cli.config, "beacon.toml");
        assert_eq!(cli.prefs, "beacon-prefs.json");
        assert!(!cli.verbose);
        assert!(matches!(cli.command, Commands::Status));
    }

    #[test]
    fn cli_parse_init() {
        let cli = Cli::parse_from(["beacon", "init"]);
        assert!(matches!(cli.command, Commands::Init { force: false }));

        let cli = Cli::parse_from(["beacon", "--config", "/etc/beacon.toml", "init", "--force"]);
        assert_eq!(cli.config, "/etc/beacon.toml");
        assert!(matches!(cli.command, Commands::Init { force: true }));
    }

    #[test]
    fn cli_parse_toggles() {
        let cli = Cli::parse_from(["beacon", "enable"]);
        assert!(matches!(cli.command, Commands::Enable));
        let cli = Cli::parse_from(["beacon", "--prefs", "/tmp/p.json", "disable"]);
        assert_eq!(cli.prefs, "/tmp/p.json");
        assert!(matches!(cli.command, Commands::Disable));
    }

    #[test]
    fn cli_parse_replay() {
        let cli = Cli::parse_from(["beacon", "-v", "replay", "events.ndjson"]);
        assert!(cli.verbose);
        match cli.command {
            Commands::Replay { file } => assert_eq!(file, "events.ndjson"),
            _ => panic!("expected Replay command"),
        }
    }

    #[test]
    fn cli_replay_requires_file() {
        assert!(Cli::try_parse_from(["beacon", "replay"]).is_err());
    }

    #[test]
    fn cli_rejects_unknown_command() {
        assert!(Cli::try_parse_from(["beacon", "sync"]).is_err());
    }

    #[test]
    fn log_level_follows_verbose_flag() {
        let cli = Cli::parse_from(["beacon", "--config", "/nonexistent/beacon.toml", "status"]);
        assert_eq!(cli.log_level(), "info");
        let cli = Cli::parse_from([
            "beacon",
            "--config",
            "/nonexistent/beacon.toml",
            "--verbose",
            "status",
        ]);
        assert_eq!(cli.log_level(), "debug");
    }
}

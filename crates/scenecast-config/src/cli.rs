//! Command-line argument parsing for scenecast hosts.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// scenecast command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug)]
#[command(name = "scenecast", about = "Multi-client scene synchronization")]
pub struct CliArgs {
    /// Synchronization channel.
    #[arg(long)]
    pub channel: Option<String>,

    /// Broadcast interval in host clock units.
    #[arg(long)]
    pub interval: Option<f64>,

    /// Remote database URL.
    #[arg(long)]
    pub database_url: Option<String>,

    /// Page location whose query string may carry a channel override.
    #[arg(long)]
    pub location: Option<String>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(ref channel) = args.channel {
            self.channel = channel.clone();
        }
        if let Some(interval) = args.interval {
            self.interval = interval;
        }
        if let Some(ref url) = args.database_url {
            self.database_url = url.clone();
        }
        if let Some(ref level) = args.log_level {
            self.log_level = level.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_args() -> CliArgs {
        CliArgs {
            channel: None,
            interval: None,
            database_url: None,
            location: None,
            log_level: None,
            config: None,
        }
    }

    #[test]
    fn test_cli_override() {
        let mut config = Config::default();
        let args = CliArgs {
            channel: Some("room1".to_string()),
            interval: Some(20.0),
            ..empty_args()
        };
        config.apply_cli_overrides(&args);
        assert_eq!(config.channel, "room1");
        assert_eq!(config.interval, 20.0);
        // Non-overridden fields retain defaults
        assert_eq!(config.log_level, "info");
        assert!(config.database_url.is_empty());
    }

    #[test]
    fn test_cli_no_override() {
        let original = Config::default();
        let mut config = Config::default();
        config.apply_cli_overrides(&empty_args());
        assert_eq!(config, original);
    }

    #[test]
    fn test_cli_parses_flags() {
        let args = CliArgs::parse_from([
            "scenecast",
            "--channel",
            "lobby",
            "--interval",
            "25",
            "--location",
            "?aframe-firebase-channel=x",
        ]);
        assert_eq!(args.channel.as_deref(), Some("lobby"));
        assert_eq!(args.interval, Some(25.0));
        assert_eq!(args.location.as_deref(), Some("?aframe-firebase-channel=x"));
    }
}

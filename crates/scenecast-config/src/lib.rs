//! Configuration for scenecast clients.
//!
//! Connection settings arrive either as a structured [`Config`] or as an
//! inline `key: value; key: value` string. The sync channel can be
//! overridden at runtime through a URL query parameter. Settings persist to
//! disk as RON files and accept CLI overrides via clap.

mod channel;
mod cli;
mod config;
mod declarations;
mod error;

pub use channel::{CHANNEL_QUERY_PARAM, DEFAULT_CHANNEL, channel_from_location, resolve_channel};
pub use cli::CliArgs;
pub use config::{Config, ConfigSource, DEFAULT_INTERVAL, default_config_dir};
pub use declarations::parse_declarations;
pub use error::ConfigError;

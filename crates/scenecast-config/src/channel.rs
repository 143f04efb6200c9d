//! Sync channel resolution.

use url::Url;

use crate::Config;

/// Query parameter that overrides the configured channel at runtime.
pub const CHANNEL_QUERY_PARAM: &str = "aframe-firebase-channel";

/// Channel used when neither the location nor the config names one.
pub const DEFAULT_CHANNEL: &str = "default";

/// Extracts a non-empty channel override from a page location.
///
/// `location` may be a full URL (`https://host/page?aframe-firebase-channel=x`)
/// or a bare query string (`?aframe-firebase-channel=x`).
pub fn channel_from_location(location: &str) -> Option<String> {
    let query = match Url::parse(location) {
        Ok(url) => url.query().unwrap_or_default().to_string(),
        Err(_) => location
            .split_once('?')
            .map_or(location, |(_, query)| query)
            .to_string(),
    };

    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == CHANNEL_QUERY_PARAM)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

/// Resolves the channel with precedence: location query parameter, then the
/// configured channel, then [`DEFAULT_CHANNEL`].
pub fn resolve_channel(location: Option<&str>, config: &Config) -> String {
    location
        .and_then(channel_from_location)
        .or_else(|| (!config.channel.is_empty()).then(|| config.channel.clone()))
        .unwrap_or_else(|| DEFAULT_CHANNEL.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_channel(channel: &str) -> Config {
        Config {
            channel: channel.to_string(),
            ..Config::default()
        }
    }

    #[test]
    fn test_query_param_wins() {
        let config = config_with_channel("room1");
        let channel = resolve_channel(
            Some("https://example.com/scene.html?foo=1&aframe-firebase-channel=party"),
            &config,
        );
        assert_eq!(channel, "party");
    }

    #[test]
    fn test_bare_query_string() {
        assert_eq!(
            channel_from_location("?aframe-firebase-channel=lobby").as_deref(),
            Some("lobby")
        );
        assert_eq!(
            channel_from_location("aframe-firebase-channel=lobby").as_deref(),
            Some("lobby")
        );
    }

    #[test]
    fn test_percent_encoded_value() {
        assert_eq!(
            channel_from_location("?aframe-firebase-channel=room%201").as_deref(),
            Some("room 1")
        );
    }

    #[test]
    fn test_configured_channel_without_query() {
        let config = config_with_channel("room1");
        assert_eq!(resolve_channel(Some("https://example.com/"), &config), "room1");
        assert_eq!(resolve_channel(None, &config), "room1");
    }

    #[test]
    fn test_empty_query_value_falls_through() {
        let config = config_with_channel("room1");
        assert_eq!(
            resolve_channel(Some("?aframe-firebase-channel="), &config),
            "room1"
        );
    }

    #[test]
    fn test_default_channel() {
        assert_eq!(resolve_channel(None, &Config::default()), DEFAULT_CHANNEL);
    }
}

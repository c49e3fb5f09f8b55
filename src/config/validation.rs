//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.

use super::Config;
use thiserror::Error;

/// Validation errors for configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("upstream.username is required")]
    MissingUsername,
    #[error("upstream.bridge_url must be a ws:// URL, got '{0}'")]
    InvalidBridgeUrl(String),
    #[error("http.backend_url must be a ws:// or wss:// URL, got '{0}'")]
    InvalidBackendUrl(String),
    #[error("lifecycle.retry_base_secs must be greater than zero")]
    ZeroRetryBase,
    #[error("lifecycle.retry_base_secs ({base}) exceeds lifecycle.retry_max_secs ({max})")]
    RetryBaseAboveMax { base: u64, max: u64 },
    #[error("listen.send_queue must be greater than zero")]
    ZeroSendQueue,
}

fn is_ws_url(url: &str) -> bool {
    url.starts_with("ws://") || url.starts_with("wss://")
}

// The bridge client is built without TLS; bridges run next to the relay.
fn is_plain_ws_url(url: &str) -> bool {
    url.starts_with("ws://")
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.upstream.username.trim_start_matches('@').is_empty() {
        errors.push(ValidationError::MissingUsername);
    }
    if !is_plain_ws_url(&config.upstream.bridge_url) {
        errors.push(ValidationError::InvalidBridgeUrl(
            config.upstream.bridge_url.clone(),
        ));
    }
    if let Some(ref backend) = config.http.backend_url
        && !is_ws_url(backend)
    {
        errors.push(ValidationError::InvalidBackendUrl(backend.clone()));
    }

    let lifecycle = &config.lifecycle;
    if lifecycle.retry_base_secs == 0 {
        errors.push(ValidationError::ZeroRetryBase);
    } else if lifecycle.retry_base_secs > lifecycle.retry_max_secs {
        errors.push(ValidationError::RetryBaseAboveMax {
            base: lifecycle.retry_base_secs,
            max: lifecycle.retry_max_secs,
        });
    }

    if config.listen.send_queue == 0 {
        errors.push(ValidationError::ZeroSendQueue);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_passes() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_empty_username_fails() {
        let config: Config = toml::from_str(
            r#"
[upstream]
username = "@"
"#,
        )
        .unwrap();
        let errors = validate(&config).unwrap_err();
        assert!(errors.iter().any(|e| matches!(e, ValidationError::MissingUsername)));
    }

    #[test]
    fn test_http_bridge_url_fails() {
        let config: Config = toml::from_str(
            r#"
[upstream]
bridge_url = "http://127.0.0.1:8787"
"#,
        )
        .unwrap();
        let errors = validate(&config).unwrap_err();
        assert!(errors.iter().any(|e| matches!(e, ValidationError::InvalidBridgeUrl(_))));
    }

    #[test]
    fn test_backend_url_must_be_websocket() {
        let config: Config = toml::from_str(
            r#"
[http]
backend_url = "relay.example:8081"
"#,
        )
        .unwrap();
        let errors = validate(&config).unwrap_err();
        assert!(errors.iter().any(|e| matches!(e, ValidationError::InvalidBackendUrl(_))));
    }

    #[test]
    fn test_retry_bounds() {
        let config: Config = toml::from_str(
            r#"
[lifecycle]
retry_base_secs = 600
retry_max_secs = 300
"#,
        )
        .unwrap();
        let errors = validate(&config).unwrap_err();
        assert!(errors.iter().any(|e| matches!(
            e,
            ValidationError::RetryBaseAboveMax { base: 600, max: 300 }
        )));

        let config: Config = toml::from_str("[lifecycle]\nretry_base_secs = 0\n").unwrap();
        let errors = validate(&config).unwrap_err();
        assert!(errors.iter().any(|e| matches!(e, ValidationError::ZeroRetryBase)));
    }

    #[test]
    fn test_multiple_errors_collected() {
        let config: Config = toml::from_str(
            r#"
[listen]
send_queue = 0

[upstream]
username = ""
"#,
        )
        .unwrap();
        let errors = validate(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
    }
}

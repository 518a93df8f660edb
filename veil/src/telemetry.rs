// Copyright (c) 2024 Botho Foundation

//! Console tracing setup.
//!
//! Configured via the `[logging]` table of the engine config:
//!
//! ```toml
//! [logging]
//! verbose = true            # debug level for everything
//! filter = "veil=trace"     # or explicit EnvFilter directives
//! ```

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::{config::LoggingConfig, onion::Onion};

/// The `EnvFilter` directives for `config`.
pub fn directives(config: &LoggingConfig) -> String {
    match &config.filter {
        Some(filter) => filter.clone(),
        None if config.verbose => "debug".to_string(),
        None => "info".to_string(),
    }
}

/// Install the global tracing subscriber.
///
/// Fails if the directives do not parse or a subscriber is already set.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_new(directives(config))
        .with_context(|| format!("Invalid log filter {:?}", directives(config)))?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_filter(filter);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .try_init()
        .context("Failed to install tracing subscriber")
}

/// Helper function to get the layer name for tracing
pub fn layer_name(onion: &Onion) -> &'static str {
    match onion {
        Onion::Crypt(_) => "Crypt",
        Onion::Forward(_) => "Forward",
        Onion::Reverse(_) => "Reverse",
        Onion::Exit(_) => "Exit",
        Onion::Session(_) => "Session",
        Onion::Confirmation(_) => "Confirmation",
        Onion::Delay(_) => "Delay",
        Onion::GetBalance(_) => "GetBalance",
        Onion::Balance(_) => "Balance",
        Onion::Route(_) => "Route",
        Onion::Ready(_) => "Ready",
        Onion::IntroQuery(_) => "IntroQuery",
        Onion::HiddenService(_) => "HiddenService",
        Onion::Whisper(_) => "Whisper",
        Onion::Response(_) => "Response",
        Onion::End => "End",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::onion::Confirmation;
    use crate::wire::Id;
    use serial_test::serial;

    #[test]
    fn test_directives() {
        assert_eq!(directives(&LoggingConfig::default()), "info");

        let verbose = LoggingConfig {
            verbose: true,
            filter: None,
        };
        assert_eq!(directives(&verbose), "debug");

        let explicit = LoggingConfig {
            verbose: true,
            filter: Some("veil=trace".to_string()),
        };
        assert_eq!(directives(&explicit), "veil=trace");
    }

    #[test]
    #[serial]
    fn test_init_tracing_once() {
        let config = LoggingConfig::default();
        // Another test binary may already own the global subscriber
        let first = init_tracing(&config);
        assert!(init_tracing(&config).is_err() || first.is_err());
    }

    #[test]
    fn test_layer_name() {
        let onion = Onion::Confirmation(Confirmation { id: Id(1) });
        assert_eq!(layer_name(&onion), "Confirmation");
        assert_eq!(layer_name(&Onion::End), "End");
    }
}

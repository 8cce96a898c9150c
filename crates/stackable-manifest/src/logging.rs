//! Logging setup for binaries embedding the manifest generation.
//!
//! Library code only emits `tracing` events, installing a subscriber is left
//! to the binary. [`initialize_logging`] provides the usual setup.
use snafu::{ResultExt, Snafu};
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to install the global tracing subscriber"))]
    InstallSubscriber {
        source: tracing_subscriber::util::TryInitError,
    },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum LogFormat {
    /// Human readable lines.
    #[default]
    Plain,

    /// One JSON object per event.
    Json,
}

/// Initializes `tracing` logging with options from the environment variable
/// given in the `env` parameter.
///
/// We force users to provide a variable name so it can be different per
/// product, e.g. `FOOBAR_MANIFEST_LOG`. If the variable is not set (or
/// invalid), the maximum log level is set to INFO.
///
/// Fails if a global subscriber is already installed.
pub fn initialize_logging(env: &str, format: LogFormat) -> Result<(), Error> {
    let filter = EnvFilter::try_from_env(env)
        .unwrap_or_else(|_| EnvFilter::new(tracing::Level::INFO.to_string()));

    let (plain, json) = match format {
        LogFormat::Plain => (Some(tracing_subscriber::fmt::layer()), None),
        LogFormat::Json => (None, Some(tracing_subscriber::fmt::layer().json())),
    };

    Registry::default()
        .with(filter)
        .with(plain)
        .with(json)
        .try_init()
        .context(InstallSubscriberSnafu)?;

    tracing::debug!(%format, "logging initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use tracing::{debug, error, info};

    use super::*;

    #[test]
    fn parse_log_format() {
        assert_eq!(LogFormat::from_str("json"), Ok(LogFormat::Json));
        assert_eq!(LogFormat::from_str("plain"), Ok(LogFormat::Plain));
        assert!(LogFormat::from_str("xml").is_err());
    }

    // This is mostly a sanity check for the implementation above. Run
    //      NOT_SET=debug cargo test default_tracing -- --nocapture
    // to see all messages.
    #[test]
    fn test_default_tracing_level_is_set_to_info() {
        initialize_logging("NOT_SET", LogFormat::Plain).unwrap();

        error!("ERROR level messages should be seen.");
        info!("INFO level messages should also be seen by default.");
        debug!("DEBUG level messages should be seen only if you set the NOT_SET env var.");

        // A second subscriber cannot be installed
        assert!(initialize_logging("NOT_SET", LogFormat::Json).is_err());
    }
}

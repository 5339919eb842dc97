//! Configuration for the catalog binaries
//!
//! CLI arguments with environment fallbacks (clap), plus the tracing setup
//! both binaries share.

use crate::gate::{GateConfig, DEFAULT_VERIFY_URL};
use clap::{Args as ClapArgs, Parser};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Upper bound for `FRESHNESS_SECS` (one day)
pub const MAX_FRESHNESS_SECS: u64 = 86_400;

/// Where the catalog lives
#[derive(ClapArgs, Debug, Clone)]
pub struct StoreArgs {
    /// SQLite database file
    #[arg(long, env = "CATALOG_DB", default_value = "buildings.db")]
    pub db_path: PathBuf,
}

/// Anti-abuse verification settings
#[derive(ClapArgs, Debug, Clone)]
pub struct VerificationArgs {
    /// reCAPTCHA secret key (required to serve mutations)
    #[arg(long, env = "RECAPTCHA_SECRET_KEY", hide_env_values = true)]
    pub recaptcha_secret: Option<String>,

    /// Token verification endpoint
    #[arg(long, env = "RECAPTCHA_VERIFY_URL", default_value = DEFAULT_VERIFY_URL)]
    pub recaptcha_verify_url: String,

    /// Lowest accepted verification score
    #[arg(long, env = "RECAPTCHA_MIN_SCORE", default_value = "0.7")]
    pub min_score: f64,

    /// Largest accepted gap between client submission time and server time
    #[arg(long, env = "FRESHNESS_SECS", default_value = "120")]
    pub freshness_secs: u64,

    /// Timeout for one verification round-trip
    #[arg(long, env = "VERIFY_TIMEOUT_MS", default_value = "10000")]
    pub verify_timeout_ms: u64,
}

impl VerificationArgs {
    pub fn gate_config(&self) -> GateConfig {
        GateConfig {
            freshness: chrono::Duration::seconds(self.freshness_secs.min(MAX_FRESHNESS_SECS) as i64),
            min_score: self.min_score,
        }
    }

    pub fn verify_timeout(&self) -> Duration {
        Duration::from_millis(self.verify_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.min_score) {
            return Err("RECAPTCHA_MIN_SCORE must be between 0 and 1".to_string());
        }

        if !(1..=MAX_FRESHNESS_SECS).contains(&self.freshness_secs) {
            return Err(format!(
                "FRESHNESS_SECS must be between 1 and {}",
                MAX_FRESHNESS_SECS
            ));
        }

        match self.recaptcha_secret.as_deref().map(str::trim) {
            None | Some("") => Err("RECAPTCHA_SECRET_KEY is required".to_string()),
            Some(_) => Ok(()),
        }
    }
}

/// Building catalog HTTP server
#[derive(Parser, Debug, Clone)]
#[command(name = "catalog-server")]
#[command(about = "Crowd-moderated building catalog API")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:3000")]
    pub listen: SocketAddr,

    #[command(flatten)]
    pub store: StoreArgs,

    #[command(flatten)]
    pub verification: VerificationArgs,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Args {
    pub fn validate(&self) -> Result<(), String> {
        self.verification.validate()
    }
}

/// Install the global subscriber. `RUST_LOG` wins over `log_level`.
pub fn init_tracing(log_level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("building_catalog={},tower_http=info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Args {
        let mut argv = vec!["catalog-server"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn test_defaults() {
        let args = parse(&["--recaptcha-secret", "s3cret"]);

        assert_eq!(args.listen.port(), 3000);
        assert_eq!(args.verification.min_score, 0.7);
        assert_eq!(args.verification.gate_config().freshness, chrono::Duration::seconds(120));
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let score = parse(&["--recaptcha-secret", "s", "--min-score", "1.5"]);
        assert!(score.validate().is_err());

        let window = parse(&["--recaptcha-secret", "s", "--freshness-secs", "0"]);
        assert!(window.validate().is_err());

        let blank = parse(&["--recaptcha-secret", "  "]);
        assert!(blank.validate().is_err());
    }

    #[test]
    fn test_oversized_freshness_window_is_a_config_error() {
        let args = parse(&["--recaptcha-secret", "s", "--freshness-secs", "18446744073709551615"]);

        assert!(args.validate().is_err());
        // still builds a gate config without overflowing
        assert_eq!(
            args.verification.gate_config().freshness,
            chrono::Duration::seconds(MAX_FRESHNESS_SECS as i64)
        );

        let day = parse(&["--recaptcha-secret", "s", "--freshness-secs", "86400"]);
        assert!(day.validate().is_ok());
    }
}

use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use footage_engine::EngineConfig;

/// Pulls footage from cameras based on policy alerts or manual time ranges
/// and stores it to the filesystem.
#[derive(Debug, Parser)]
#[command(name = "footage", version)]
pub struct Args {
    /// API key
    #[arg(long, short = 'a', env = "FOOTAGE_API_KEY")]
    pub api_key: String,

    /// Path to API cert (switches the auth scheme to certificate-based)
    #[arg(long, short = 'c', requires = "private_key")]
    pub cert: Option<PathBuf>,

    /// Path to API private key
    #[arg(long, short = 'p', requires = "cert")]
    pub private_key: Option<PathBuf>,

    /// Start time in epoch seconds (default: one hour ago; ignored in
    /// --alerts mode)
    #[arg(long, short = 's')]
    pub start_time: Option<i64>,

    /// Duration in seconds (ignored in --alerts mode)
    #[arg(long, short = 'u', default_value_t = 3600)]
    pub duration: i64,

    /// Print debug logging
    #[arg(long, short = 'g')]
    pub debug: bool,

    /// Use a WAN connection to download rather than a LAN connection
    #[arg(long, short = 'w')]
    pub usewan: bool,

    /// Location UUID filter
    #[arg(long)]
    pub location_uuid: Option<String>,

    /// Camera UUID filter
    #[arg(long)]
    pub camera_uuid: Option<String>,

    /// Download footage based on policy alerts instead of a manual time range
    #[arg(long)]
    pub alerts: bool,

    /// Maximum number of alerts to retrieve
    #[arg(long, default_value_t = 100)]
    pub max_alerts: u32,

    /// Only get alerts before this timestamp (epoch seconds)
    #[arg(long)]
    pub before_time: Option<i64>,

    /// Only get alerts after this timestamp (epoch seconds)
    #[arg(long)]
    pub after_time: Option<i64>,

    /// Buffer time in seconds before and after each alert
    #[arg(long, default_value_t = 30)]
    pub alert_buffer: i64,

    /// Maximum number of concurrent downloads
    #[arg(long, default_value_t = footage_engine::config::DEFAULT_CONCURRENCY)]
    pub concurrency: usize,

    /// Directory to write output files into
    #[arg(long, short = 'o', default_value = ".")]
    pub output_dir: PathBuf,
}

impl Args {
    /// Effective manual-mode start time: the flag value, or one hour ago.
    pub fn effective_start_time(&self) -> i64 {
        self.start_time
            .unwrap_or_else(|| Utc::now().timestamp() - 3600)
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            api_key: self.api_key.clone(),
            client_cert: self
                .cert
                .clone()
                .zip(self.private_key.clone()),
            use_wan: self.usewan,
            concurrency: self.concurrency,
            dispatch_delay: Duration::from_millis(100),
            output_dir: self.output_dir.clone(),
            ..EngineConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let args = Args::try_parse_from(["footage", "-a", "key"]).unwrap();
        assert_eq!(args.duration, 3600);
        assert_eq!(args.max_alerts, 100);
        assert_eq!(args.alert_buffer, 30);
        assert_eq!(args.concurrency, 4);
        assert!(!args.alerts);
        assert!(!args.usewan);
    }

    #[test]
    fn cert_requires_private_key() {
        assert!(Args::try_parse_from(["footage", "-a", "key", "-c", "cert.pem"]).is_err());
        let args = Args::try_parse_from([
            "footage", "-a", "key", "-c", "cert.pem", "-p", "key.pem",
        ])
        .unwrap();
        assert!(args.engine_config().client_cert.is_some());
        assert_eq!(args.engine_config().auth_scheme(), "api");
    }

    #[test]
    fn start_time_defaults_to_roughly_one_hour_ago() {
        let args = Args::try_parse_from(["footage", "-a", "key"]).unwrap();
        let expected = Utc::now().timestamp() - 3600;
        assert!((args.effective_start_time() - expected).abs() <= 2);
    }
}

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://api2.rhombussystems.com";

/// Number of workers the scheduler runs by default.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Delay inserted before each task dispatch to stay under remote rate limits.
pub const DEFAULT_DISPATCH_DELAY: Duration = Duration::from_millis(100);

/// Immutable per-run configuration for the download engine.
///
/// Built once at startup and shared by reference afterwards; per-task timing
/// lives in [`crate::task::TaskWindow`], never here.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Base URL of the remote API service.
    pub api_base: String,

    /// API key sent as the `x-auth-apikey` header.
    pub api_key: String,

    /// Optional client certificate and private key (PEM paths). When present
    /// the auth scheme switches from `api-token` to `api`.
    pub client_cert: Option<(PathBuf, PathBuf)>,

    /// Download over the WAN VOD template rather than the LAN one.
    pub use_wan: bool,

    /// Skip TLS verification. Cameras on a LAN commonly serve self-signed
    /// certificates, so LAN downloads need this.
    pub accept_invalid_certs: bool,

    /// Maximum number of tasks downloading at once.
    pub concurrency: usize,

    /// Pause before each task dispatch.
    pub dispatch_delay: Duration,

    /// Connection timeout for all HTTP requests.
    pub connect_timeout: Duration,

    /// Directory output files are written into.
    pub output_dir: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_owned(),
            api_key: String::new(),
            client_cert: None,
            use_wan: false,
            accept_invalid_certs: true,
            concurrency: DEFAULT_CONCURRENCY,
            dispatch_delay: DEFAULT_DISPATCH_DELAY,
            connect_timeout: Duration::from_secs(30),
            output_dir: PathBuf::from("."),
        }
    }
}

impl EngineConfig {
    pub fn auth_scheme(&self) -> &'static str {
        if self.client_cert.is_some() {
            "api"
        } else {
            "api-token"
        }
    }
}

use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid URL `{input}`: {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error("HTTP request failed: {source}")]
    Network {
        #[from]
        source: reqwest::Error,
    },

    #[error("request failed with HTTP {status} during {operation} for {url}")]
    HttpStatus {
        status: StatusCode,
        url: String,
        operation: &'static str,
    },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("session negotiation failed: {reason}")]
    Session { reason: String },

    #[error("no usable media URI template for device {device_id}: {reason}")]
    MediaUri { device_id: String, reason: String },

    #[error("manifest parse error: {source}")]
    Manifest {
        #[from]
        source: mpd::MpdError,
    },

    #[error("manifest URI `{uri}` has no recognized trailing filename")]
    UnknownManifestSuffix { uri: String },

    #[error("segment fetch failed for {uri}: {reason}")]
    SegmentFetch { uri: String, reason: String },

    #[error("mux failed: {reason}")]
    Mux { reason: String },

    #[error("configuration error: {reason}")]
    Configuration { reason: String },
}

impl EngineError {
    pub fn invalid_url(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            input: input.into(),
            reason: reason.into(),
        }
    }

    pub fn http_status(
        status: StatusCode,
        url: impl Into<String>,
        operation: &'static str,
    ) -> Self {
        Self::HttpStatus {
            status,
            url: url.into(),
            operation,
        }
    }

    pub fn session(reason: impl Into<String>) -> Self {
        Self::Session {
            reason: reason.into(),
        }
    }

    pub fn media_uri(device_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MediaUri {
            device_id: device_id.into(),
            reason: reason.into(),
        }
    }

    pub fn segment_fetch(uri: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SegmentFetch {
            uri: uri.into(),
            reason: reason.into(),
        }
    }

    pub fn mux(reason: impl Into<String>) -> Self {
        Self::Mux {
            reason: reason.into(),
        }
    }

    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }
}

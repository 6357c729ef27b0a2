// Shared HTTP client for the remote API and the per-device media endpoints.
//
// API calls are JSON POSTs authenticated by the `x-auth-scheme` /
// `x-auth-apikey` header pair. Media calls (manifest and segment GETs) are
// authenticated by a session cookie instead; the cookie is supplied per
// request because each task owns its own session credential.

use std::sync::OnceLock;

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, COOKIE};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, trace};
use url::Url;

use crate::config::EngineConfig;
use crate::error::EngineError;

fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            // Safe to ignore: can happen if another crate installed it first.
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    api_base: String,
}

impl ApiClient {
    pub fn new(config: &EngineConfig) -> Result<Self, EngineError> {
        install_rustls_provider();

        let mut headers = HeaderMap::new();
        headers.insert(reqwest::header::ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            "x-auth-scheme",
            HeaderValue::from_static(config.auth_scheme()),
        );
        headers.insert(
            "x-auth-apikey",
            HeaderValue::from_str(&config.api_key)
                .map_err(|e| EngineError::configuration(format!("invalid API key: {e}")))?,
        );

        let mut builder = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(config.connect_timeout)
            .danger_accept_invalid_certs(config.accept_invalid_certs);

        if let Some((cert, key)) = &config.client_cert {
            let mut pem = std::fs::read(cert)?;
            pem.extend_from_slice(&std::fs::read(key)?);
            let identity = reqwest::Identity::from_pem(&pem)?;
            builder = builder.identity(identity);
        }

        Ok(Self {
            client: builder.build()?,
            api_base: config.api_base.trim_end_matches('/').to_owned(),
        })
    }

    /// POST a JSON body to an API path and deserialize the JSON response.
    pub async fn post_json<B, T>(
        &self,
        path: &str,
        body: &B,
        operation: &'static str,
    ) -> Result<T, EngineError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.api_base, path);
        trace!(%url, operation, "api request");
        let response = self.client.post(&url).json(body).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::http_status(status, url, operation));
        }

        Ok(response.json().await?)
    }

    /// GET a media URL authenticated with a session cookie, returning the
    /// body as text. Used for manifest documents.
    pub async fn get_text(&self, url: &str, cookie: &str) -> Result<String, EngineError> {
        let response = self.media_get(url, cookie, "manifest fetch").await?;
        Ok(response.text().await?)
    }

    /// GET a media URL authenticated with a session cookie, returning the raw
    /// body. Used for init and data segments.
    pub async fn get_bytes(&self, url: &str, cookie: &str) -> Result<Bytes, EngineError> {
        let response = self.media_get(url, cookie, "segment fetch").await?;
        Ok(response.bytes().await?)
    }

    async fn media_get(
        &self,
        url: &str,
        cookie: &str,
        operation: &'static str,
    ) -> Result<reqwest::Response, EngineError> {
        let parsed =
            Url::parse(url).map_err(|e| EngineError::invalid_url(url, e.to_string()))?;
        let cookie_value = HeaderValue::from_str(cookie)
            .map_err(|e| EngineError::configuration(format!("invalid session cookie: {e}")))?;

        debug!(url = %parsed, operation, "media request");
        let response = self
            .client
            .get(parsed)
            .header(COOKIE, cookie_value)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::http_status(status, url.to_owned(), operation));
        }
        Ok(response)
    }
}

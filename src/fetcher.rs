//! Bounded HTTP client for remote assets.
//!
//! No browser involvement: every request goes out through `reqwest` with the
//! configured user agent, a per-request timeout and a capped redirect chain.

use std::time::Duration;

use base64::Engine as Base64Engine;
use log::debug;
use reqwest::header::CONTENT_TYPE;
use reqwest::{redirect, Client};
use url::Url;

use crate::{Error, ExtractConfig, Result};

const MAX_REDIRECTS: usize = 10;
const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// A successfully fetched resource
#[derive(Debug, Clone)]
pub struct FetchedResource {
    /// Declared `Content-Type`, if the server sent one
    pub content_type: Option<String>,
    /// Response body
    pub body: Vec<u8>,
    /// URL after redirects
    pub final_url: String,
}

impl FetchedResource {
    /// Encode the body as a `data:` URI carrying the declared content type.
    pub fn to_data_uri(&self) -> String {
        let mime = self
            .content_type
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(FALLBACK_CONTENT_TYPE);
        let b64 = base64::engine::general_purpose::STANDARD.encode(&self.body);
        format!("data:{};base64,{}", mime, b64)
    }
}

/// Shared asset client. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    max_bytes: usize,
}

impl Fetcher {
    pub fn new(user_agent: &str, timeout: Duration, max_bytes: usize) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .redirect(redirect::Policy::limited(MAX_REDIRECTS))
            .build()
            .map_err(|e| Error::Initialization(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, max_bytes })
    }

    pub fn from_config(config: &ExtractConfig) -> Result<Self> {
        Self::new(&config.user_agent, config.asset_timeout(), config.asset_max_bytes)
    }

    /// GET `url`, failing on transport errors, non-2xx statuses and
    /// oversized bodies.
    pub async fn fetch(&self, url: &Url) -> Result<FetchedResource> {
        let resp = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| Error::AssetFetch(format!("GET {} failed: {}", url, e)))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::AssetFetch(format!("GET {} returned {}", url, status)));
        }

        if let Some(len) = resp.content_length() {
            if len as usize > self.max_bytes {
                return Err(Error::AssetFetch(format!(
                    "{} is {} bytes, limit is {}",
                    url, len, self.max_bytes
                )));
            }
        }

        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let final_url = resp.url().to_string();

        let body = resp
            .bytes()
            .await
            .map_err(|e| Error::AssetFetch(format!("Failed to read body of {}: {}", url, e)))?;

        // Chunked responses carry no Content-Length
        if body.len() > self.max_bytes {
            return Err(Error::AssetFetch(format!(
                "{} is {} bytes, limit is {}",
                url,
                body.len(),
                self.max_bytes
            )));
        }

        debug!("Fetched {} ({} bytes, {:?})", final_url, body.len(), content_type);

        Ok(FetchedResource {
            content_type,
            body: body.to_vec(),
            final_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_uri_uses_declared_type() {
        let res = FetchedResource {
            content_type: Some("image/png".into()),
            body: vec![0x89, b'P', b'N', b'G'],
            final_url: "https://example.com/logo.png".into(),
        };
        assert_eq!(res.to_data_uri(), "data:image/png;base64,iVBORw==");
    }

    #[test]
    fn data_uri_defaults_to_octet_stream() {
        let res = FetchedResource {
            content_type: None,
            body: b"hi".to_vec(),
            final_url: String::new(),
        };
        assert_eq!(res.to_data_uri(), "data:application/octet-stream;base64,aGk=");
    }
}

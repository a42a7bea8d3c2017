//! Indexing signal
//!
//! One HTTP call telling the indexing service that fresh artifacts are in the
//! document store.

use crate::config::EmbeddingConfig;
use crate::notify::UploadCounters;
use crate::state::JobKind;
use crate::url::{is_loopback, sanitize_target_url};
use crate::UploadError;
use reqwest::Client;
use serde_json::json;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

/// Value of the `source` field in the signal payload
pub const SIGNAL_SOURCE: &str = "catalog_harvester";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalMethod {
    Get,
    Post,
}

impl FromStr for SignalMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            other => Err(format!("unsupported signal method '{}'", other)),
        }
    }
}

impl fmt::Display for SignalMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Get => "GET",
            Self::Post => "POST",
        })
    }
}

/// A configured indexing endpoint
#[derive(Debug, Clone)]
pub struct IndexSignal {
    client: Client,
    url: Url,
    method: SignalMethod,
}

impl IndexSignal {
    pub fn new(
        url: Url,
        method: SignalMethod,
        verify_ssl: bool,
        timeout: Duration,
    ) -> Result<Self, UploadError> {
        let client = Client::builder()
            .danger_accept_invalid_certs(!verify_ssl)
            .timeout(timeout)
            .build()
            .map_err(|e| UploadError::Signal {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        Ok(Self {
            client,
            url,
            method,
        })
    }

    /// Builds the signal from config; `None` when no server is configured
    pub fn from_config(config: &EmbeddingConfig) -> Result<Option<Self>, UploadError> {
        let Some(server) = config.server.as_deref().filter(|s| !s.trim().is_empty()) else {
            return Ok(None);
        };

        let url = sanitize_target_url(server, &config.endpoint).map_err(|e| {
            UploadError::Signal {
                url: server.to_string(),
                message: e.to_string(),
            }
        })?;
        let method = config
            .method
            .parse::<SignalMethod>()
            .map_err(|message| UploadError::Signal {
                url: url.to_string(),
                message,
            })?;
        let timeout = Duration::from_secs_f64(config.timeout_secs.max(0.1));

        Self::new(url, method, config.verify_ssl, timeout).map(Some)
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn method(&self) -> SignalMethod {
        self.method
    }

    /// Sends the signal and returns the response status
    ///
    /// An HTTPS target on the local machine that fails at the transport level
    /// is tried once more over plain HTTP.
    pub async fn send(&self, kind: JobKind, counters: &UploadCounters) -> Result<u16, UploadError> {
        let payload = json!({
            "source": SIGNAL_SOURCE,
            "event": "upload_completed",
            "job": kind.as_str(),
            "counters": counters,
        });

        match self.attempt(&self.url, &payload).await {
            Err(AttemptFailure::Transport(e))
                if self.url.scheme() == "https" && is_loopback(&self.url) =>
            {
                let mut plain = self.url.clone();
                if plain.set_scheme("http").is_err() {
                    return Err(self.signal_error(&self.url, e));
                }
                tracing::warn!(
                    "Index signal to {} failed over TLS ({}), retrying over HTTP",
                    self.url,
                    e
                );
                self.attempt(&plain, &payload)
                    .await
                    .map_err(|failure| self.signal_error(&plain, failure.to_string()))
            }
            result => result.map_err(|failure| self.signal_error(&self.url, failure.to_string())),
        }
    }

    async fn attempt(&self, url: &Url, payload: &serde_json::Value) -> Result<u16, AttemptFailure> {
        let request = match self.method {
            SignalMethod::Get => self.client.get(url.clone()),
            SignalMethod::Post => self.client.post(url.clone()).json(payload),
        };

        let response = request
            .send()
            .await
            .map_err(|e| AttemptFailure::Transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(AttemptFailure::Status(status.as_u16()));
        }
        tracing::info!("Index signal {} {} -> {}", self.method, url, status.as_u16());
        Ok(status.as_u16())
    }

    fn signal_error(&self, url: &Url, message: impl fmt::Display) -> UploadError {
        UploadError::Signal {
            url: url.to_string(),
            message: message.to_string(),
        }
    }
}

enum AttemptFailure {
    Transport(String),
    Status(u16),
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(message) => f.write_str(message),
            Self::Status(code) => write!(f, "HTTP {}", code),
        }
    }
}

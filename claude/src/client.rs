use crate::message::{Request, Response};
use crate::wire::{Incoming, Outgoing};
use crate::Error;
use std::time::Duration;

const ENDPOINT: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const FALLBACK_MODEL: &str = "claude-sonnet-4-20250514";

/// Dialogue turns are short; scenario generation is the slow call.
const REQUEST_DEADLINE: Duration = Duration::from_secs(120);
const CONNECT_DEADLINE: Duration = Duration::from_secs(30);

/// Handle to the Messages API. Cheap to clone.
#[derive(Clone)]
pub struct Claude {
    http: reqwest::Client,
    key: String,
    default_model: String,
    endpoint: String,
}

impl Claude {
    pub fn new(api_key: impl Into<String>) -> Result<Self, Error> {
        Ok(Self {
            http: http_client(REQUEST_DEADLINE)?,
            key: api_key.into(),
            default_model: FALLBACK_MODEL.to_string(),
            endpoint: ENDPOINT.to_string(),
        })
    }

    /// Read the key from `ANTHROPIC_API_KEY`. Blank counts as missing.
    pub fn from_env() -> Result<Self, Error> {
        match std::env::var("ANTHROPIC_API_KEY") {
            Ok(key) if !key.trim().is_empty() => Self::new(key),
            _ => Err(Error::NoApiKey),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// Send requests somewhere other than api.anthropic.com, e.g. a proxy.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.endpoint = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, Error> {
        self.http = http_client(timeout)?;
        Ok(self)
    }

    /// Model used by requests that leave theirs unset.
    pub fn model(&self) -> &str {
        &self.default_model
    }

    /// One non-streaming completion.
    pub async fn complete(&self, request: Request) -> Result<Response, Error> {
        let body = Outgoing::new(&request, &self.default_model);
        let reply = self
            .http
            .post(format!("{}/messages", self.endpoint))
            .header("x-api-key", self.key.as_str())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = reply.status();
        if !status.is_success() {
            let message = reply.text().await.unwrap_or_default();
            return Err(Error::Api {
                status: status.as_u16(),
                message,
            });
        }

        let incoming: Incoming = reply.json().await?;
        Ok(incoming.into())
    }
}

fn http_client(timeout: Duration) -> Result<reqwest::Client, Error> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(CONNECT_DEADLINE.min(timeout))
        .build()
        .map_err(|e| Error::Config(e.to_string()))
}

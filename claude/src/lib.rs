//! Thin client for the Anthropic Messages endpoint.
//!
//! Covers one round trip: a system prompt plus a conversation goes in, a
//! single block of text comes out. Streaming, tool use and images are not
//! supported.
//!
//! ```ignore
//! let claude = claude::Claude::from_env()?;
//! let reply = claude
//!     .complete(claude::Request::new(vec![claude::Message::user("Who are you?")])
//!         .with_system("You are the night porter."))
//!     .await?;
//! println!("{}", reply.text);
//! ```

mod client;
mod message;
mod wire;

pub use client::Claude;
pub use message::{Message, Request, Response, Role, StopReason, Usage};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("ANTHROPIC_API_KEY is not set")]
    NoApiKey,

    #[error("transport failure: {0}")]
    Network(String),

    #[error("no answer before the request deadline")]
    Timeout,

    #[error("Anthropic returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("unreadable response body: {0}")]
    Parse(String),

    #[error("client misconfigured: {0}")]
    Config(String),
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Timeout
        } else if e.is_decode() {
            Error::Parse(e.to_string())
        } else {
            Error::Network(e.to_string())
        }
    }
}

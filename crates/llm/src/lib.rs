pub mod client;
pub mod provider;

use thiserror::Error;

pub use client::{GenerationClient, RelatedDocument};
pub use provider::{TextGenerator, build_generator};

/// Failures raised by the generation backends.
///
/// Tag and insight generation propagate these to the caller — a missing
/// suggestion must be visible, not silently absorbed.  Summarization is the
/// one exception: it degrades to a truncated prefix instead (see
/// [`GenerationClient::summarize`]).
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend error ({status}): {body}")]
    Backend { status: String, body: String },

    #[error("malformed reply: {0}")]
    MalformedReply(String),
}

//! Error taxonomy for the onion request layer.

use serde_json::Value;
use snode_crypto::CryptoError;
use thiserror::Error;

/// Everything that can go wrong between building a request and handing the
/// decrypted response back to the caller. Callers match exhaustively; hop
/// and path level trouble is repaired internally and only shows up here
/// once the retry budget runs out.
#[derive(Clone, Debug, Error)]
pub enum Error {
    /// An error occurred.
    #[error("An error occurred")]
    Generic,
    /// The local clock disagrees with network time; signatures will keep
    /// being rejected until it is fixed, so this is never silently retried.
    #[error("The user's clock is out of sync with the service node network")]
    ClockOutOfSync,
    /// No user key pair is available for a signed operation.
    #[error("Missing user key pair")]
    NoKeyPair,
    /// Building the verification signature failed.
    #[error("Couldn't sign verification data")]
    SigningFailed,
    /// The pool does not hold enough distinct snodes to build a path or
    /// swarm. Callers should back off instead of retrying immediately.
    #[error("Couldn't find enough snodes to build a path")]
    InsufficientSnodes,
    /// The final destination answered with a non-2xx status, decoded from
    /// inside the onion. Does not penalize the network topology.
    #[error("HTTP request failed at destination ({destination}) with status code {code}")]
    HttpRequestFailedAtDestination {
        code: u16,
        info: Value,
        destination: String,
    },
    /// The destination server requires blinded ids.
    #[error("Destination ({destination}) requires the use of blinded ids")]
    BlindingRequired { destination: String },
    /// HTTP failure at a hop, before the response could be decrypted.
    /// Status 0 means the guard could not be reached at all.
    #[error("Onion request failed with status code {status}")]
    Transport { status: u16, info: Option<Value> },
    /// Encryption or decryption failed. Non-retryable.
    #[error("Crypto error")]
    Crypto(#[from] CryptoError),
    /// The response framing or JSON was malformed. Non-retryable.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl Error {
    /// Whether a bounded retry with a fresh snode/path can plausibly fix
    /// this error.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Generic
            | Error::Transport { .. }
            | Error::HttpRequestFailedAtDestination { .. } => true,
            Error::ClockOutOfSync
            | Error::NoKeyPair
            | Error::SigningFailed
            | Error::InsufficientSnodes
            | Error::BlindingRequired { .. }
            | Error::Crypto(_)
            | Error::InvalidResponse(_) => false,
        }
    }
}

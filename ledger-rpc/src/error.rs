use thiserror::Error;

/// Failures surfaced by the ledger client. The drivers do not distinguish
/// transient from permanent node rejections; both land in [`RpcError::Node`]
/// and the slot is left for a later pass.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
    #[error("http status {status} from {method}")]
    Http { method: &'static str, status: u16 },
    #[error("{method} rejected by node: {message} (code {code})")]
    Node {
        method: &'static str,
        code: i64,
        message: String,
    },
    #[error("malformed {method} response: {detail}")]
    Malformed {
        method: &'static str,
        detail: &'static str,
    },
}

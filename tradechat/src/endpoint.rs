//! Chat endpoint derivation.
//!
//! The chat socket lives on the same host as the hosting page: the page's
//! scheme is upgraded to its WebSocket equivalent (`http` → `ws`,
//! `https` → `wss`), the path is replaced by the chat path, and the bearer
//! token rides along as the `token` query parameter.

use url::Url;

/// Query parameter carrying the bearer token.
pub const TOKEN_PARAM: &str = "token";

/// Errors deriving the chat endpoint.
#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    /// The origin is not a URL.
    #[error("invalid origin {origin:?}: {source}")]
    InvalidOrigin {
        /// Text that failed to parse.
        origin: String,
        /// Parser error.
        source: url::ParseError,
    },

    /// The origin's scheme has no WebSocket equivalent.
    #[error("unsupported origin scheme {0:?}")]
    UnsupportedScheme(String),

    /// The origin has no host.
    #[error("origin has no host")]
    MissingHost,
}

/// Builds the chat endpoint for `origin`.
///
/// # Errors
///
/// Returns [`EndpointError`] if `origin` does not parse, has no host, or
/// uses a scheme other than `http`, `https`, `ws` or `wss`.
pub fn chat_endpoint(origin: &str, chat_path: &str, token: &str) -> Result<Url, EndpointError> {
    let mut url = Url::parse(origin).map_err(|source| EndpointError::InvalidOrigin {
        origin: origin.to_string(),
        source,
    })?;

    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => return Err(EndpointError::UnsupportedScheme(other.to_string())),
    };
    if url.host_str().is_none() {
        return Err(EndpointError::MissingHost);
    }
    url.set_scheme(scheme)
        .map_err(|()| EndpointError::UnsupportedScheme(url.scheme().to_string()))?;

    url.set_path(chat_path);
    url.set_fragment(None);
    url.set_query(None);
    url.query_pairs_mut().append_pair(TOKEN_PARAM, token);
    Ok(url)
}

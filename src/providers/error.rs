//! Classified failures from the LLM HTTP boundary.

use std::fmt;

/// Why a provider call failed. The engine treats every one of these as
/// fatal for the current query; the classification exists so logs and error
/// messages can say something more useful than "request failed".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// 401/403: key rejected or lacks permission.
    Auth,
    /// 429: provider is shedding load.
    RateLimit,
    /// 404: the configured model id does not exist at this endpoint.
    BadModel,
    /// Request or provider-side timeout.
    Timeout,
    /// DNS failure, refused connection, broken transport.
    Network,
    /// 5xx from the provider.
    ServerError,
    /// 2xx whose body did not match the chat-completions shape.
    Protocol,
    Other,
}

#[derive(Debug)]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub status: Option<u16>,
    pub detail: String,
}

impl ProviderError {
    /// Classify a non-success HTTP response.
    pub fn http(status: u16, body: &str) -> Self {
        let kind = match status {
            401 | 403 => ProviderErrorKind::Auth,
            404 => ProviderErrorKind::BadModel,
            408 => ProviderErrorKind::Timeout,
            429 => ProviderErrorKind::RateLimit,
            500..=599 => ProviderErrorKind::ServerError,
            _ => ProviderErrorKind::Other,
        };
        Self {
            kind,
            status: Some(status),
            detail: clip(body, 600),
        }
    }

    /// Classify a transport-level failure.
    pub fn transport(err: &reqwest::Error) -> Self {
        Self {
            kind: if err.is_timeout() {
                ProviderErrorKind::Timeout
            } else {
                ProviderErrorKind::Network
            },
            status: None,
            detail: err.to_string(),
        }
    }

    /// A 2xx response whose body could not be interpreted.
    pub fn protocol(detail: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::Protocol,
            status: None,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(code) => write!(f, "llm provider {:?} (http {}): {}", self.kind, code, self.detail),
            None => write!(f, "llm provider {:?}: {}", self.kind, self.detail),
        }
    }
}

impl std::error::Error for ProviderError {}

/// Bound a response body for logging and error text, ending on a char
/// boundary.
pub(crate) fn clip(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &text[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_map_to_kinds() {
        assert_eq!(ProviderError::http(401, "").kind, ProviderErrorKind::Auth);
        assert_eq!(ProviderError::http(404, "").kind, ProviderErrorKind::BadModel);
        assert_eq!(ProviderError::http(429, "").kind, ProviderErrorKind::RateLimit);
        assert_eq!(ProviderError::http(502, "").kind, ProviderErrorKind::ServerError);
        assert_eq!(ProviderError::http(418, "").kind, ProviderErrorKind::Other);
    }

    #[test]
    fn clip_respects_char_boundaries() {
        let body = "é".repeat(400);
        let clipped = clip(&body, 601);
        assert!(clipped.len() <= 601 + '…'.len_utf8());
        assert!(clipped.ends_with('…'));
        // Even lengths slice cleanly through the 2-byte chars.
        assert_eq!(clip("abc", 600), "abc");
    }

    #[test]
    fn display_carries_status_when_present() {
        let err = ProviderError::http(503, "overloaded");
        assert!(err.to_string().contains("503"));
        assert!(err.to_string().contains("overloaded"));
        let err = ProviderError::protocol("no choices");
        assert!(!err.to_string().contains("http"));
    }
}

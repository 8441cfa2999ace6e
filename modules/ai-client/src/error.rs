use thiserror::Error;

#[derive(Debug, Error)]
pub enum AiError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Empty response from provider")]
    EmptyResponse,
}

impl AiError {
    /// Only rate limiting is worth retrying; everything else fails the call.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, AiError::RateLimited(_))
    }

    /// Map a non-success HTTP response onto the error taxonomy.
    pub fn from_status(status: u16, body: String) -> Self {
        if status == 429 {
            return AiError::RateLimited(body);
        }
        AiError::Api {
            status,
            message: body,
        }
    }
}

impl From<reqwest::Error> for AiError {
    fn from(e: reqwest::Error) -> Self {
        AiError::Network(e.to_string())
    }
}

impl From<serde_json::Error> for AiError {
    fn from(e: serde_json::Error) -> Self {
        AiError::Parse(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_429_is_rate_limited() {
        let err = AiError::from_status(429, "slow down".into());
        assert!(err.is_rate_limited());
    }

    #[test]
    fn other_statuses_are_api_errors() {
        let err = AiError::from_status(502, "bad gateway".into());
        assert!(!err.is_rate_limited());
        assert_eq!(err.to_string(), "API error (502): bad gateway");
    }
}

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ApifyError>;

/// Failures resolving a dataset reference.
#[derive(Debug, Error)]
pub enum ApifyError {
    #[error("Dataset reference is missing or empty")]
    MissingDataset,

    #[error("Dataset {0} not found")]
    NotFound(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl ApifyError {
    /// Map a non-success dataset response onto the error taxonomy.
    pub fn from_status(dataset_id: &str, status: u16, body: String) -> Self {
        match status {
            404 => ApifyError::NotFound(dataset_id.to_string()),
            _ => ApifyError::Api {
                status,
                message: body,
            },
        }
    }
}

impl From<reqwest::Error> for ApifyError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApifyError::Parse(err.to_string())
        } else {
            ApifyError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ApifyError {
    fn from(err: serde_json::Error) -> Self {
        ApifyError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_dataset_maps_to_not_found() {
        let err = ApifyError::from_status("ds-1", 404, "{}".into());
        assert_eq!(err.to_string(), "Dataset ds-1 not found");
    }

    #[test]
    fn other_statuses_keep_body() {
        let err = ApifyError::from_status("ds-1", 401, "token invalid".into());
        assert_eq!(err.to_string(), "API error (status 401): token invalid");
    }
}

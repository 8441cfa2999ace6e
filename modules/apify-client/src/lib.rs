pub mod error;
pub mod types;

pub use error::{ApifyError, Result};
pub use types::{FacebookAttachment, FacebookGroupPost, FacebookImage, FacebookUser, RunData};

use serde::de::DeserializeOwned;

const BASE_URL: &str = "https://api.apify.com/v2";

pub struct ApifyClient {
    client: reqwest::Client,
    token: Option<String>,
    base_url: String,
}

impl ApifyClient {
    /// Client for dataset reads. Public datasets need no token.
    pub fn new(token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            token: token.filter(|t| !t.is_empty()),
            base_url: BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    fn dataset_items_url(&self, dataset_id: &str) -> String {
        format!(
            "{}/datasets/{}/items?clean=true&format=json",
            self.base_url, dataset_id
        )
    }

    /// Fetch all items of a dataset.
    pub async fn get_dataset_items<T: DeserializeOwned>(&self, dataset_id: &str) -> Result<Vec<T>> {
        let dataset_id = dataset_id.trim();
        if dataset_id.is_empty() {
            return Err(ApifyError::MissingDataset);
        }

        let mut request = self.client.get(self.dataset_items_url(dataset_id));
        if let Some(ref token) = self.token {
            request = request.bearer_auth(token);
        }
        let resp = request.send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApifyError::from_status(dataset_id, status.as_u16(), body));
        }

        // Decode through Value so a non-array body is a Parse error, not a panic
        // deep inside a typed decode.
        let body: serde_json::Value = resp.json().await?;
        if !body.is_array() {
            return Err(ApifyError::Parse(
                "Invalid dataset format: expected array of items".to_string(),
            ));
        }
        let items: Vec<T> = serde_json::from_value(body)?;
        Ok(items)
    }

    /// Fetch the Facebook group posts stored in a dataset, undecoded.
    ///
    /// Items stay as JSON so the caller can decode them one by one into
    /// [`FacebookGroupPost`]; a single malformed item must not fail the dataset.
    pub async fn facebook_group_posts(&self, dataset_id: &str) -> Result<Vec<serde_json::Value>> {
        tracing::info!(dataset_id, "Fetching Facebook group posts from dataset");
        let posts: Vec<serde_json::Value> = self.get_dataset_items(dataset_id).await?;
        tracing::info!(dataset_id, count = posts.len(), "Fetched Facebook group posts");
        Ok(posts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dataset_url_requests_clean_json() {
        let client = ApifyClient::new(None).with_base_url("https://api.example.com/v2/");
        assert_eq!(
            client.dataset_items_url("abc"),
            "https://api.example.com/v2/datasets/abc/items?clean=true&format=json"
        );
    }

    #[test]
    fn empty_token_is_ignored() {
        let client = ApifyClient::new(Some(String::new()));
        assert!(client.token.is_none());
    }

    #[tokio::test]
    async fn blank_dataset_id_is_rejected_before_any_request() {
        let client = ApifyClient::new(None).with_base_url("http://127.0.0.1:9");
        let err = client.facebook_group_posts("  ").await.unwrap_err();
        assert!(matches!(err, ApifyError::MissingDataset));
    }
}

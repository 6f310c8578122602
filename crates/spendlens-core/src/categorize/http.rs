//! HTTP classifier backend
//!
//! Talks to the external classification service: POSTs a batch of
//! `{description, amount}` pairs and reads back `{index, category,
//! confidence}` entries. Malformed entries are dropped here, field by field;
//! semantic validation (index range, category coercion, confidence clamping)
//! happens in the gateway.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::{ClassificationRequest, ClassificationResult, Classifier};
use crate::error::{Error, Result};

/// Per-request timeout. Transport failures inside this window degrade the
/// batch at the gateway; nothing is retried or cancelled.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Classifier service client
#[derive(Clone)]
pub struct HttpClassifier {
    http_client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpClassifier {
    /// Create a client for the given classification endpoint
    pub fn new(endpoint: &str) -> Self {
        Self {
            http_client: Client::new(),
            endpoint: endpoint.to_string(),
            api_key: None,
        }
    }

    /// Create a client that sends a bearer token with each request
    pub fn with_api_key(endpoint: &str, api_key: &str) -> Self {
        Self {
            http_client: Client::new(),
            endpoint: endpoint.to_string(),
            api_key: Some(api_key.to_string()),
        }
    }

    /// Create from environment variables
    ///
    /// Requires `CLASSIFIER_URL`; `CLASSIFIER_API_KEY` is optional.
    pub fn from_env() -> Option<Self> {
        let endpoint = std::env::var("CLASSIFIER_URL").ok()?;
        let api_key = std::env::var("CLASSIFIER_API_KEY").ok();
        Some(Self {
            http_client: Client::new(),
            endpoint,
            api_key,
        })
    }
}

#[derive(Debug, Serialize)]
struct ClassifyPayload<'a> {
    transactions: &'a [ClassificationRequest],
}

#[derive(Debug, Deserialize)]
struct ClassifyResponse {
    results: Vec<Value>,
}

/// Pull a usable result out of one response entry
///
/// Entries without a non-negative integer index are unusable and dropped; a
/// missing or non-numeric confidence degrades to 0 rather than dropping the
/// entry.
fn sanitize_entry(value: &Value) -> Option<ClassificationResult> {
    let entry = value.as_object()?;
    let index = entry.get("index")?.as_u64()? as usize;
    let category = entry
        .get("category")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();
    let confidence = entry
        .get("confidence")
        .and_then(Value::as_f64)
        .unwrap_or(0.0);
    Some(ClassificationResult {
        index,
        category,
        confidence,
    })
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn classify(&self, batch: &[ClassificationRequest]) -> Result<Vec<ClassificationResult>> {
        let mut request = self
            .http_client
            .post(&self.endpoint)
            .timeout(REQUEST_TIMEOUT)
            .json(&ClassifyPayload {
                transactions: batch,
            });
        if let Some(ref api_key) = self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(Error::Http(response.error_for_status().unwrap_err()));
        }

        let body: ClassifyResponse = response.json().await?;
        let results: Vec<ClassificationResult> =
            body.results.iter().filter_map(sanitize_entry).collect();

        debug!(
            sent = batch.len(),
            received = results.len(),
            "classifier response parsed"
        );
        Ok(results)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

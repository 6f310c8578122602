//! Transaction categorization gateway
//!
//! Sends raw transactions to the external classifier collaborator in
//! fixed-size batches, dispatched concurrently, and reassembles the results
//! by each entry's declared index. A failed batch degrades every member to
//! the fallback category instead of failing the upload: categorization
//! always returns a result for every input.

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

mod http;
mod mock;

pub use http::HttpClassifier;
pub use mock::MockClassifier;

use crate::error::Result;
use crate::models::{Category, CategorizedTransaction, RawTransaction};

/// Largest batch the classifier collaborator accepts per request
pub const MAX_BATCH_SIZE: usize = 200;

/// Descriptions are truncated to this many characters before dispatch
pub const MAX_DESCRIPTION_LEN: usize = 500;

/// One transaction in a classification request
#[derive(Debug, Clone, Serialize)]
pub struct ClassificationRequest {
    pub description: String,
    pub amount: f64,
}

/// One entry of a classifier response
///
/// `index` references the request position within its batch. The collaborator
/// is not required to return complete or ordered results; the gateway
/// validates every field before use.
#[derive(Debug, Clone, Deserialize)]
pub struct ClassificationResult {
    pub index: usize,
    pub category: String,
    pub confidence: f64,
}

/// Interface to the external classification collaborator
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Classify one batch of transactions. Batch size is bounded by
    /// [`MAX_BATCH_SIZE`]; results may be partial or unordered.
    async fn classify(&self, batch: &[ClassificationRequest]) -> Result<Vec<ClassificationResult>>;

    /// Backend name (for logging)
    fn name(&self) -> &'static str;
}

/// Concrete classifier enum
///
/// Provides Clone and compile-time dispatch without Box<dyn> overhead.
#[derive(Clone)]
pub enum ClassifierClient {
    /// HTTP classifier service
    Http(HttpClassifier),
    /// Mock classifier for testing
    Mock(MockClassifier),
}

impl ClassifierClient {
    /// Create a classifier from environment variables
    ///
    /// Requires `CLASSIFIER_URL`; `CLASSIFIER_API_KEY` is optional.
    /// Returns None when no endpoint is configured.
    pub fn from_env() -> Option<Self> {
        HttpClassifier::from_env().map(ClassifierClient::Http)
    }

    /// Create a mock classifier for testing
    pub fn mock() -> Self {
        ClassifierClient::Mock(MockClassifier::new())
    }
}

#[async_trait]
impl Classifier for ClassifierClient {
    async fn classify(&self, batch: &[ClassificationRequest]) -> Result<Vec<ClassificationResult>> {
        match self {
            ClassifierClient::Http(c) => c.classify(batch).await,
            ClassifierClient::Mock(c) => c.classify(batch).await,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            ClassifierClient::Http(c) => c.name(),
            ClassifierClient::Mock(c) => c.name(),
        }
    }
}

/// The result of running categorization over an upload
#[derive(Debug, Clone)]
pub struct CategorizationOutcome {
    /// One categorized transaction per input, in input order
    pub transactions: Vec<CategorizedTransaction>,
    /// Batches that failed and fell back to the default category
    pub failed_batches: usize,
    pub total_batches: usize,
}

impl CategorizationOutcome {
    /// Whether any batch fell back to the default category. Degradation is
    /// surfaced as a warning banner, never as a hard failure.
    pub fn is_degraded(&self) -> bool {
        self.failed_batches > 0
    }
}

/// Categorize every raw transaction, degrading failed batches to
/// `Other`/0.0 instead of erroring
///
/// Batches run concurrently with no ordering dependency; each writes into a
/// disjoint slice of the index-keyed assignment table, so a failure in one
/// batch cannot corrupt its siblings.
pub async fn categorize<C: Classifier>(
    classifier: &C,
    raw: Vec<RawTransaction>,
) -> CategorizationOutcome {
    if raw.is_empty() {
        return CategorizationOutcome {
            transactions: Vec::new(),
            failed_batches: 0,
            total_batches: 0,
        };
    }

    let requests: Vec<ClassificationRequest> = raw
        .iter()
        .map(|tx| ClassificationRequest {
            description: truncate_chars(&tx.description, MAX_DESCRIPTION_LEN),
            amount: tx.amount,
        })
        .collect();

    let batches: Vec<&[ClassificationRequest]> = requests.chunks(MAX_BATCH_SIZE).collect();
    let total_batches = batches.len();

    let responses = join_all(batches.iter().map(|&batch| classifier.classify(batch))).await;

    // One fallback slot per input; valid entries overwrite their own slot
    let mut assigned: Vec<(Category, f64)> = vec![(Category::Other, 0.0); raw.len()];
    let mut failed_batches = 0usize;

    for (batch_index, response) in responses.into_iter().enumerate() {
        let offset = batch_index * MAX_BATCH_SIZE;
        let batch_len = batches[batch_index].len();

        match response {
            Ok(results) => {
                for entry in results {
                    if entry.index >= batch_len {
                        debug!(
                            batch = batch_index,
                            index = entry.index,
                            "discarding classification entry with out-of-range index"
                        );
                        continue;
                    }
                    let category = entry.category.parse().unwrap_or(Category::Other);
                    let confidence = if entry.confidence.is_finite() {
                        entry.confidence.clamp(0.0, 1.0)
                    } else {
                        0.0
                    };
                    assigned[offset + entry.index] = (category, confidence);
                }
            }
            Err(e) => {
                warn!(
                    batch = batch_index,
                    error = %e,
                    "classification batch failed; falling back to Other"
                );
                failed_batches += 1;
            }
        }
    }

    let transactions = raw
        .into_iter()
        .enumerate()
        .map(|(i, tx)| {
            let (category, confidence) = assigned[i];
            CategorizedTransaction {
                id: format!("tx-{}", i),
                date: tx.date,
                description: tx.description,
                amount: tx.amount,
                raw_category: tx.raw_category,
                category,
                confidence,
                is_overridden: false,
            }
        })
        .collect();

    debug!(
        total_batches,
        failed_batches, "categorization pass complete"
    );

    CategorizationOutcome {
        transactions,
        failed_batches,
        total_batches,
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn raw(description: &str, amount: f64) -> RawTransaction {
        RawTransaction {
            date: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
            description: description.to_string(),
            amount,
            raw_category: None,
        }
    }

    /// Returns results reversed, partial, and with junk entries, to exercise
    /// the index-keyed reassembly defenses
    struct ScramblingClassifier;

    #[async_trait]
    impl Classifier for ScramblingClassifier {
        async fn classify(
            &self,
            batch: &[ClassificationRequest],
        ) -> Result<Vec<ClassificationResult>> {
            let mut results = vec![
                ClassificationResult {
                    index: batch.len() + 7,
                    category: "Dining".to_string(),
                    confidence: 0.9,
                },
                ClassificationResult {
                    index: 1,
                    category: "NotACategory".to_string(),
                    confidence: 3.5,
                },
                ClassificationResult {
                    index: 0,
                    category: "Groceries".to_string(),
                    confidence: 0.8,
                },
            ];
            results.reverse();
            Ok(results)
        }

        fn name(&self) -> &'static str {
            "scrambling"
        }
    }

    #[tokio::test]
    async fn test_total_failure_degrades_every_transaction() {
        let classifier = ClassifierClient::Mock(MockClassifier::failing());
        let inputs: Vec<RawTransaction> = (0..5).map(|i| raw(&format!("TX {}", i), -1.0)).collect();

        let outcome = categorize(&classifier, inputs).await;
        assert_eq!(outcome.transactions.len(), 5);
        assert!(outcome.is_degraded());
        assert_eq!(outcome.failed_batches, 1);
        for tx in &outcome.transactions {
            assert_eq!(tx.category, Category::Other);
            assert_eq!(tx.confidence, 0.0);
            assert!(!tx.is_overridden);
        }
    }

    #[tokio::test]
    async fn test_reassembly_by_declared_index() {
        let inputs = vec![raw("FIRST", -1.0), raw("SECOND", -2.0), raw("THIRD", -3.0)];
        let outcome = categorize(&ScramblingClassifier, inputs).await;

        assert!(!outcome.is_degraded());
        // Entry with index 0 lands on the first transaction despite arriving last
        assert_eq!(outcome.transactions[0].category, Category::Groceries);
        assert_eq!(outcome.transactions[0].confidence, 0.8);
        // Unknown category coerces to Other, confidence clamps to 1.0
        assert_eq!(outcome.transactions[1].category, Category::Other);
        assert_eq!(outcome.transactions[1].confidence, 1.0);
        // Omitted entry stays at the fallback
        assert_eq!(outcome.transactions[2].category, Category::Other);
        assert_eq!(outcome.transactions[2].confidence, 0.0);
    }

    #[tokio::test]
    async fn test_batch_partitioning() {
        let inputs: Vec<RawTransaction> = (0..(MAX_BATCH_SIZE + 1))
            .map(|i| raw(&format!("NETFLIX {}", i), -9.99))
            .collect();

        let outcome = categorize(&ClassifierClient::mock(), inputs).await;
        assert_eq!(outcome.total_batches, 2);
        assert_eq!(outcome.transactions.len(), MAX_BATCH_SIZE + 1);
        // Ids follow original input order across batches
        assert_eq!(outcome.transactions[MAX_BATCH_SIZE].id, format!("tx-{}", MAX_BATCH_SIZE));
        assert_eq!(
            outcome.transactions[MAX_BATCH_SIZE].category,
            Category::Subscriptions
        );
    }

    #[tokio::test]
    async fn test_empty_input() {
        let outcome = categorize(&ClassifierClient::mock(), Vec::new()).await;
        assert!(outcome.transactions.is_empty());
        assert_eq!(outcome.total_batches, 0);
        assert!(!outcome.is_degraded());
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("abcdef", 3), "abc");
    }
}

//! Mock classifier for testing
//!
//! Classifies by keyword lookup on well-known merchants. Useful for unit
//! tests and development without the classifier service running.

use async_trait::async_trait;

use super::{ClassificationRequest, ClassificationResult, Classifier};
use crate::error::{Error, Result};

/// Mock classifier with predictable keyword-based results
#[derive(Clone, Default)]
pub struct MockClassifier {
    /// When set, every call fails (for degradation tests)
    failing: bool,
}

impl MockClassifier {
    pub fn new() -> Self {
        Self { failing: false }
    }

    /// A classifier whose every batch fails
    pub fn failing() -> Self {
        Self { failing: true }
    }

    fn classify_one(request: &ClassificationRequest) -> &'static str {
        if request.amount > 0.0 {
            return "Income";
        }

        let upper = request.description.to_uppercase();
        if upper.contains("NETFLIX") || upper.contains("SPOTIFY") || upper.contains("HULU") {
            "Subscriptions"
        } else if upper.contains("STARBUCKS")
            || upper.contains("COFFEE")
            || upper.contains("RESTAURANT")
            || upper.contains("DOORDASH")
        {
            "Dining"
        } else if upper.contains("UBER")
            || upper.contains("SHELL")
            || upper.contains("CHEVRON")
            || upper.contains("TRANSIT")
        {
            "Transport"
        } else if upper.contains("WHOLE FOODS")
            || upper.contains("TRADER JOE")
            || upper.contains("SAFEWAY")
            || upper.contains("GROCERY")
        {
            "Groceries"
        } else if upper.contains("AMAZON") || upper.contains("TARGET") {
            "Shopping"
        } else if upper.contains("RENT") || upper.contains("MORTGAGE") {
            "Housing"
        } else if upper.contains("PHARMACY") || upper.contains("CLINIC") {
            "Health"
        } else {
            "Other"
        }
    }
}

#[async_trait]
impl Classifier for MockClassifier {
    async fn classify(&self, batch: &[ClassificationRequest]) -> Result<Vec<ClassificationResult>> {
        if self.failing {
            return Err(Error::InvalidData(
                "mock classifier configured to fail".to_string(),
            ));
        }

        Ok(batch
            .iter()
            .enumerate()
            .map(|(index, request)| ClassificationResult {
                index,
                category: Self::classify_one(request).to_string(),
                confidence: 0.9,
            })
            .collect())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

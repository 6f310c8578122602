//! Upload session pipeline
//!
//! One session per uploaded file: parse, normalize, categorize, and hold the
//! dashboard-ready transaction set until reset. Owns its classifier; nothing
//! here is global or persisted.

use tracing::{info, warn};

use crate::categorize::{self, Classifier, ClassifierClient};
use crate::error::{Error, Result};
use crate::import::{apply_mapping, detect_columns};
use crate::models::{
    Category, CategorizedTransaction, ColumnMapping, RawTransaction, Table,
};
use crate::statement::{self, TextFragment};

/// Pipeline state for a single uploaded file
pub struct Session {
    classifier: ClassifierClient,
    transactions: Vec<CategorizedTransaction>,
    warning: Option<String>,
}

impl Session {
    pub fn new(classifier: ClassifierClient) -> Self {
        Self {
            classifier,
            transactions: Vec::new(),
            warning: None,
        }
    }

    /// Ingest a CSV-shaped table
    ///
    /// With no mapping supplied, columns are auto-detected; roles that stay
    /// unresolved fall back to the first three headers positionally.
    pub async fn ingest_table(
        &mut self,
        table: &Table,
        mapping: Option<ColumnMapping>,
    ) -> Result<&[CategorizedTransaction]> {
        let mapping = resolve_mapping(&table.headers, mapping);
        let raw = apply_mapping(table, &mapping);
        if raw.is_empty() {
            return Err(Error::Import(
                "No valid transactions found. Check that your file has date, description, and amount columns.".to_string(),
            ));
        }

        self.run_categorization(raw).await;
        Ok(&self.transactions)
    }

    /// Ingest a statement's extracted text fragments, one list per page
    pub async fn ingest_statement(
        &mut self,
        pages: &[Vec<TextFragment>],
    ) -> Result<&[CategorizedTransaction]> {
        let table = statement::parse_statement(pages)?;
        let raw = apply_mapping(&table, &statement::statement_mapping());
        if raw.is_empty() {
            return Err(Error::UnsupportedFormat(
                "No valid transactions found in the statement. Try a CSV export from your bank instead.".to_string(),
            ));
        }

        self.run_categorization(raw).await;
        Ok(&self.transactions)
    }

    async fn run_categorization(&mut self, raw: Vec<RawTransaction>) {
        let count = raw.len();
        let outcome = categorize::categorize(&self.classifier, raw).await;

        self.warning = degradation_warning(&outcome);
        self.transactions = outcome.transactions;
        info!(
            transactions = count,
            classifier = self.classifier.name(),
            degraded = self.warning.is_some(),
            "upload processed"
        );
    }

    /// Re-run classification over the current set, leaving overridden rows
    /// untouched. Ids are stable across the pass.
    pub async fn recategorize(&mut self) {
        if self.transactions.is_empty() {
            return;
        }

        let raw: Vec<RawTransaction> = self
            .transactions
            .iter()
            .map(|tx| RawTransaction {
                date: tx.date,
                description: tx.description.clone(),
                amount: tx.amount,
                raw_category: tx.raw_category.clone(),
            })
            .collect();

        let outcome = categorize::categorize(&self.classifier, raw).await;
        self.warning = degradation_warning(&outcome);

        for (tx, fresh) in self.transactions.iter_mut().zip(outcome.transactions) {
            if tx.is_overridden {
                continue;
            }
            tx.category = fresh.category;
            tx.confidence = fresh.confidence;
        }
    }

    /// Manually reassign a transaction's category. Returns false for an
    /// unknown id. The override sticks: later categorization passes skip
    /// this row.
    pub fn override_category(&mut self, id: &str, category: Category) -> bool {
        match self.transactions.iter_mut().find(|tx| tx.id == id) {
            Some(tx) => {
                tx.override_category(category);
                true
            }
            None => false,
        }
    }

    /// Discard all session state
    pub fn reset(&mut self) {
        self.transactions.clear();
        self.warning = None;
    }

    pub fn transactions(&self) -> &[CategorizedTransaction] {
        &self.transactions
    }

    /// Non-fatal warning from the last categorization pass, if any
    pub fn warning(&self) -> Option<&str> {
        self.warning.as_deref()
    }
}

/// Supplied mapping wins; otherwise auto-detect with positional fallback to
/// the first three headers
fn resolve_mapping(headers: &[String], mapping: Option<ColumnMapping>) -> ColumnMapping {
    if let Some(mapping) = mapping {
        return mapping;
    }

    let detected = detect_columns(headers);
    let positional = |index: usize| headers.get(index).cloned().unwrap_or_default();

    ColumnMapping {
        date_column: detected.date_column.unwrap_or_else(|| positional(0)),
        description_column: detected.description_column.unwrap_or_else(|| positional(1)),
        amount_column: detected.amount_column.unwrap_or_else(|| positional(2)),
        category_column: detected.category_column,
    }
}

fn degradation_warning(outcome: &categorize::CategorizationOutcome) -> Option<String> {
    if !outcome.is_degraded() {
        return None;
    }
    warn!(
        failed = outcome.failed_batches,
        total = outcome.total_batches,
        "categorization degraded; affected transactions fall back to Other"
    );
    Some(format!(
        "Categorization was unavailable for {} of {} batches; affected transactions are marked \"Other\".",
        outcome.failed_batches, outcome.total_batches
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::categorize::MockClassifier;

    fn csv_table() -> Table {
        Table {
            headers: vec![
                "Date".to_string(),
                "Description".to_string(),
                "Amount".to_string(),
            ],
            rows: vec![
                vec![
                    "2024-01-05".to_string(),
                    "NETFLIX.COM".to_string(),
                    "-15.99".to_string(),
                ],
                vec![
                    "2024-01-06".to_string(),
                    "PAYROLL".to_string(),
                    "2400.00".to_string(),
                ],
            ],
        }
    }

    #[tokio::test]
    async fn test_ingest_table_with_detection() {
        let mut session = Session::new(ClassifierClient::mock());
        let transactions = session.ingest_table(&csv_table(), None).await.unwrap();

        assert_eq!(transactions.len(), 2);
        assert_eq!(transactions[0].category, Category::Subscriptions);
        assert_eq!(transactions[1].category, Category::Income);
        assert!(session.warning().is_none());
    }

    #[tokio::test]
    async fn test_positional_fallback_for_unrecognized_headers() {
        let table = Table {
            headers: vec!["A".to_string(), "B".to_string(), "C".to_string()],
            rows: vec![vec![
                "2024-01-05".to_string(),
                "NETFLIX.COM".to_string(),
                "-15.99".to_string(),
            ]],
        };

        let mut session = Session::new(ClassifierClient::mock());
        let transactions = session.ingest_table(&table, None).await.unwrap();
        assert_eq!(transactions.len(), 1);
        assert_eq!(transactions[0].description, "NETFLIX.COM");
    }

    #[tokio::test]
    async fn test_ingest_rejects_unusable_table() {
        let table = Table {
            headers: vec!["Date".to_string(), "Description".to_string(), "Amount".to_string()],
            rows: vec![vec![
                "garbage".to_string(),
                "".to_string(),
                "nope".to_string(),
            ]],
        };

        let mut session = Session::new(ClassifierClient::mock());
        let err = session.ingest_table(&table, None).await.unwrap_err();
        assert!(matches!(err, Error::Import(_)));
    }

    #[tokio::test]
    async fn test_degraded_categorization_sets_warning_not_error() {
        let mut session = Session::new(ClassifierClient::Mock(MockClassifier::failing()));
        let transactions = session.ingest_table(&csv_table(), None).await.unwrap();

        assert_eq!(transactions.len(), 2);
        assert!(transactions.iter().all(|tx| tx.category == Category::Other));
        assert!(session.warning().is_some());
    }

    #[tokio::test]
    async fn test_override_survives_recategorization() {
        let mut session = Session::new(ClassifierClient::mock());
        session.ingest_table(&csv_table(), None).await.unwrap();

        assert!(session.override_category("tx-0", Category::Entertainment));
        assert!(!session.override_category("tx-99", Category::Other));

        session.recategorize().await;

        let tx0 = &session.transactions()[0];
        assert_eq!(tx0.category, Category::Entertainment);
        assert!(tx0.is_overridden);
        // Non-overridden rows do get refreshed
        assert_eq!(session.transactions()[1].category, Category::Income);
    }

    #[tokio::test]
    async fn test_reset_discards_state() {
        let mut session = Session::new(ClassifierClient::mock());
        session.ingest_table(&csv_table(), None).await.unwrap();
        assert!(!session.transactions().is_empty());

        session.reset();
        assert!(session.transactions().is_empty());
        assert!(session.warning().is_none());
    }
}

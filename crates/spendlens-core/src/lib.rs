//! Spendlens Core Library
//!
//! Shared functionality for the Spendlens spending dashboard:
//! - CSV import, column detection, and row normalization
//! - Statement text segmentation for PDF text layers
//! - Categorization gateway for the external classifier service
//! - Dashboard analytics (category breakdown, timeline, merchants, summary)
//! - Subscription detection
//! - Spending anomaly detection
//! - Upload session pipeline and request rate limiting

pub mod analytics;
pub mod anomaly;
pub mod categorize;
pub mod detect;
pub mod error;
pub mod import;
pub mod limit;
pub mod models;
pub mod session;
pub mod statement;

pub use analytics::{
    CategoryBreakdown, MerchantSummary, SummaryStats, TimelinePeriod, DEFAULT_MERCHANT_LIMIT,
};
pub use anomaly::{AnomalyConfig, AnomalyDetector};
pub use categorize::{
    CategorizationOutcome, ClassificationRequest, ClassificationResult, Classifier,
    ClassifierClient, HttpClassifier, MockClassifier, MAX_BATCH_SIZE,
};
pub use detect::SubscriptionDetector;
pub use error::{Error, Result};
pub use import::{DetectedColumns, MAX_SOURCE_ROWS};
pub use limit::{RateLimitConfig, RateLimitInfo, RateLimiter};
pub use models::{
    Anomaly, AnomalyType, Category, CategorizedTransaction, ColumnMapping, Frequency,
    RawTransaction, Severity, Subscription, Table,
};
pub use session::Session;
pub use statement::TextFragment;

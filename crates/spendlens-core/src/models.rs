//! Domain models for Spendlens

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Spending categories assigned to every transaction
///
/// Closed set: the classifier collaborator returns one of these names and
/// anything else is coerced to `Other` at the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Category {
    Groceries,
    Dining,
    Transport,
    Entertainment,
    Subscriptions,
    Housing,
    Utilities,
    Health,
    Shopping,
    Income,
    Transfer,
    Other,
}

impl Category {
    /// All categories, in display order
    pub const ALL: [Category; 12] = [
        Self::Groceries,
        Self::Dining,
        Self::Transport,
        Self::Entertainment,
        Self::Subscriptions,
        Self::Housing,
        Self::Utilities,
        Self::Health,
        Self::Shopping,
        Self::Income,
        Self::Transfer,
        Self::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Groceries => "Groceries",
            Self::Dining => "Dining",
            Self::Transport => "Transport",
            Self::Entertainment => "Entertainment",
            Self::Subscriptions => "Subscriptions",
            Self::Housing => "Housing",
            Self::Utilities => "Utilities",
            Self::Health => "Health",
            Self::Shopping => "Shopping",
            Self::Income => "Income",
            Self::Transfer => "Transfer",
            Self::Other => "Other",
        }
    }

    /// Money movement rather than spending. Income and Transfer are excluded
    /// from spending breakdowns, merchant rankings, and the anomaly passes.
    pub fn is_cash_flow(&self) -> bool {
        matches!(self, Self::Income | Self::Transfer)
    }

    /// Display color (hex) for dashboard charts
    pub fn color(&self) -> &'static str {
        match self {
            Self::Groceries => "#22c55e",
            Self::Dining => "#f97316",
            Self::Transport => "#3b82f6",
            Self::Entertainment => "#a855f7",
            Self::Subscriptions => "#6366f1",
            Self::Housing => "#64748b",
            Self::Utilities => "#eab308",
            Self::Health => "#ef4444",
            Self::Shopping => "#ec4899",
            Self::Income => "#10b981",
            Self::Transfer => "#06b6d4",
            Self::Other => "#94a3b8",
        }
    }

    /// Display icon for dashboard chips
    pub fn icon(&self) -> &'static str {
        match self {
            Self::Groceries => "\u{1F6D2}",
            Self::Dining => "\u{1F37D}\u{FE0F}",
            Self::Transport => "\u{1F697}",
            Self::Entertainment => "\u{1F3AC}",
            Self::Subscriptions => "\u{1F504}",
            Self::Housing => "\u{1F3E0}",
            Self::Utilities => "\u{1F4A1}",
            Self::Health => "\u{1F3E5}",
            Self::Shopping => "\u{1F6CD}\u{FE0F}",
            Self::Income => "\u{1F4B0}",
            Self::Transfer => "\u{1F501}",
            Self::Other => "\u{1F4CB}",
        }
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|c| c.as_str() == s)
            .copied()
            .ok_or_else(|| format!("Unknown category: {}", s))
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A parsed but not yet categorized transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTransaction {
    pub date: NaiveDate,
    pub description: String,
    /// Negative = expense, positive = income/credit
    pub amount: f64,
    /// Category label carried over from the source file, if any
    pub raw_category: Option<String>,
}

/// A transaction with an assigned category
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategorizedTransaction {
    /// Stable for the session; positional (`tx-0`, `tx-1`, ...)
    pub id: String,
    pub date: NaiveDate,
    pub description: String,
    /// Negative = expense, positive = income/credit
    pub amount: f64,
    pub raw_category: Option<String>,
    pub category: Category,
    /// Classifier confidence in [0, 1]; 0 for fallback assignments
    pub confidence: f64,
    /// Set once the user manually reassigns the category; overridden rows
    /// are never touched by re-categorization
    pub is_overridden: bool,
}

impl CategorizedTransaction {
    /// Manually reassign the category. One-way: the override flag never clears.
    pub fn override_category(&mut self, category: Category) {
        self.category = category;
        self.confidence = 1.0;
        self.is_overridden = true;
    }
}

/// Maps source table columns onto transaction fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub date_column: String,
    pub description_column: String,
    pub amount_column: String,
    pub category_column: Option<String>,
}

/// The tabular shape delivered by the CSV reader and synthesized by the
/// statement segmenter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Recurrence cadence of a detected subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Weekly,
    Monthly,
    Yearly,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
        }
    }

    /// Nominal days between charges
    pub fn interval_days(&self) -> i64 {
        match self {
            Self::Weekly => 7,
            Self::Monthly => 30,
            Self::Yearly => 365,
        }
    }

    /// Normalize a per-cycle amount to a monthly-equivalent cost
    pub fn monthly_cost(&self, amount: f64) -> f64 {
        match self {
            Self::Weekly => amount * 52.0 / 12.0,
            Self::Monthly => amount,
            Self::Yearly => amount / 12.0,
        }
    }
}

impl std::fmt::Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A detected recurring charge, recomputed from scratch on every pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    /// Canonical display name (first-seen casing)
    pub merchant: String,
    /// Representative per-cycle amount, rounded to cents
    pub amount: f64,
    pub frequency: Frequency,
    /// Weighted recurrence score in [0, 1]
    pub confidence: f64,
    pub last_charge: NaiveDate,
    pub next_expected_charge: NaiveDate,
    pub total_spent: f64,
    pub occurrences: usize,
    /// Ids of the contributing transactions
    pub transaction_ids: Vec<String>,
}

/// What kind of irregularity an anomaly flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyType {
    UnusuallyLarge,
    NewMerchant,
    CategorySpike,
    Duplicate,
    UnusualTiming,
}

impl AnomalyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnusuallyLarge => "unusually_large",
            Self::NewMerchant => "new_merchant",
            Self::CategorySpike => "category_spike",
            Self::Duplicate => "duplicate",
            Self::UnusualTiming => "unusual_timing",
        }
    }
}

impl std::fmt::Display for AnomalyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How much attention an anomaly deserves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    /// Numeric priority for sorting (higher = more urgent)
    pub fn priority(&self) -> u8 {
        match self {
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 3,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A flagged transaction. At most one anomaly survives per transaction
/// (highest severity wins).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anomaly {
    pub id: String,
    pub transaction_id: String,
    #[serde(rename = "type")]
    pub anomaly_type: AnomalyType,
    pub severity: Severity,
    /// Human-readable explanation of why this was flagged
    pub description: String,
    pub amount: f64,
    pub merchant: String,
    pub date: NaiveDate,
}

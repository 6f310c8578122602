//! Dashboard analytics over categorized transactions
//!
//! Pure functions: every view is recomputed from scratch over the current
//! transaction set and mutates nothing.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use crate::models::{Category, CategorizedTransaction};

/// Default cutoff for the merchant ranking
pub const DEFAULT_MERCHANT_LIMIT: usize = 10;

/// Spending share of one category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryBreakdown {
    pub category: Category,
    /// Sum of absolute amounts
    pub total: f64,
    pub count: usize,
    /// Share of all included categories, 0-100
    pub percentage: f64,
}

/// One calendar month of activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelinePeriod {
    /// `YYYY-MM`
    pub period: String,
    pub total: f64,
    /// All 12 categories present, zero-filled
    pub by_category: BTreeMap<Category, f64>,
}

/// Aggregate spend at one merchant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MerchantSummary {
    /// Display name (first-seen casing)
    pub merchant: String,
    pub total: f64,
    pub count: usize,
}

/// Headline figures for the dashboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryStats {
    pub total_expenses: f64,
    pub total_income: f64,
    pub net: f64,
    pub top_category: Category,
    /// Min and max transaction dates, None for an empty set
    pub date_range: Option<(NaiveDate, NaiveDate)>,
}

/// Per-category spending totals, Income and Transfer excluded, sorted
/// descending by total
pub fn category_breakdown(transactions: &[CategorizedTransaction]) -> Vec<CategoryBreakdown> {
    let mut totals: BTreeMap<Category, (f64, usize)> = BTreeMap::new();

    for tx in transactions {
        if tx.category.is_cash_flow() {
            continue;
        }
        let entry = totals.entry(tx.category).or_insert((0.0, 0));
        entry.0 += tx.amount.abs();
        entry.1 += 1;
    }

    let grand_total: f64 = totals.values().map(|(total, _)| total).sum();

    let mut breakdown: Vec<CategoryBreakdown> = totals
        .into_iter()
        .map(|(category, (total, count))| CategoryBreakdown {
            category,
            total,
            count,
            percentage: if grand_total > 0.0 {
                total / grand_total * 100.0
            } else {
                0.0
            },
        })
        .collect();

    breakdown.sort_by(|a, b| b.total.partial_cmp(&a.total).unwrap_or(Ordering::Equal));
    breakdown
}

/// Monthly totals with a zero-filled per-category map, sorted ascending by
/// period
pub fn spending_timeline(transactions: &[CategorizedTransaction]) -> Vec<TimelinePeriod> {
    let mut by_period: BTreeMap<String, (f64, BTreeMap<Category, f64>)> = BTreeMap::new();

    for tx in transactions {
        let period = tx.date.format("%Y-%m").to_string();
        let entry = by_period.entry(period).or_insert_with(|| {
            (0.0, Category::ALL.iter().map(|c| (*c, 0.0)).collect())
        });
        entry.0 += tx.amount.abs();
        *entry.1.entry(tx.category).or_insert(0.0) += tx.amount.abs();
    }

    by_period
        .into_iter()
        .map(|(period, (total, by_category))| TimelinePeriod {
            period,
            total,
            by_category,
        })
        .collect()
}

/// Merchants ranked by total absolute spend, Income and Transfer excluded
///
/// Merchants are identified case-insensitively; the display name keeps the
/// first-seen casing.
pub fn top_merchants(
    transactions: &[CategorizedTransaction],
    limit: usize,
) -> Vec<MerchantSummary> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut merchants: Vec<MerchantSummary> = Vec::new();

    for tx in transactions {
        if tx.category.is_cash_flow() {
            continue;
        }
        let key = tx.description.trim().to_lowercase();
        let slot = *index.entry(key).or_insert_with(|| {
            merchants.push(MerchantSummary {
                merchant: tx.description.trim().to_string(),
                total: 0.0,
                count: 0,
            });
            merchants.len() - 1
        });
        merchants[slot].total += tx.amount.abs();
        merchants[slot].count += 1;
    }

    merchants.sort_by(|a, b| b.total.partial_cmp(&a.total).unwrap_or(Ordering::Equal));
    merchants.truncate(limit);
    merchants
}

/// Headline totals, top spending category, and the covered date range
pub fn summary_stats(transactions: &[CategorizedTransaction]) -> SummaryStats {
    let total_expenses: f64 = transactions
        .iter()
        .filter(|tx| tx.amount < 0.0)
        .map(|tx| tx.amount.abs())
        .sum();
    let total_income: f64 = transactions
        .iter()
        .filter(|tx| tx.amount > 0.0)
        .map(|tx| tx.amount)
        .sum();

    let top_category = category_breakdown(transactions)
        .first()
        .map(|entry| entry.category)
        .unwrap_or(Category::Other);

    let date_range = match (
        transactions.iter().map(|tx| tx.date).min(),
        transactions.iter().map(|tx| tx.date).max(),
    ) {
        (Some(start), Some(end)) => Some((start, end)),
        _ => None,
    };

    SummaryStats {
        total_expenses,
        total_income,
        net: total_income - total_expenses,
        top_category,
        date_range,
    }
}

//! Spending anomaly detection
//!
//! Five independent heuristic passes over the categorized set, merged so at
//! most one anomaly survives per transaction (highest severity wins), ranked
//! by severity and size.

use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::models::{Anomaly, AnomalyType, Category, CategorizedTransaction, Severity};

/// Detection thresholds
///
/// Defaults reflect what works for typical personal statements.
#[derive(Debug, Clone)]
pub struct AnomalyConfig {
    /// A transaction above this multiple of its category mean is unusual
    pub large_ratio: f64,
    /// Above this multiple, an unusually large transaction is high severity
    pub large_high_ratio: f64,
    /// Category needs at least this many members for a meaningful mean
    pub large_min_count: usize,
    /// One-off merchants below this absolute amount are ignored
    pub new_merchant_min_amount: f64,
    /// One-off merchants above this are medium rather than low severity
    pub new_merchant_medium_amount: f64,
    /// A month above this multiple of the category's monthly mean is a spike
    pub spike_ratio: f64,
    /// Above this multiple, a spike is high severity
    pub spike_high_ratio: f64,
    /// Same-merchant same-amount charges this many days apart are duplicates
    pub duplicate_window_days: i64,
    /// Minimum weekend transactions for the timing baseline
    pub weekend_min_count: usize,
    /// A weekend charge above this multiple of the weekend mean is unusual
    pub weekend_ratio: f64,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            large_ratio: 2.0,
            large_high_ratio: 5.0,
            large_min_count: 3,
            new_merchant_min_amount: 50.0,
            new_merchant_medium_amount: 200.0,
            spike_ratio: 2.0,
            spike_high_ratio: 3.0,
            duplicate_window_days: 3,
            weekend_min_count: 3,
            weekend_ratio: 3.0,
        }
    }
}

/// Runs all five anomaly passes and merges the results
#[derive(Debug, Default)]
pub struct AnomalyDetector {
    config: AnomalyConfig,
}

/// An anomaly candidate before the merge assigns ids
struct Candidate {
    transaction_id: String,
    anomaly_type: AnomalyType,
    severity: Severity,
    description: String,
    amount: f64,
    merchant: String,
    date: chrono::NaiveDate,
}

impl Candidate {
    fn flag(
        tx: &CategorizedTransaction,
        anomaly_type: AnomalyType,
        severity: Severity,
        description: String,
    ) -> Self {
        Self {
            transaction_id: tx.id.clone(),
            anomaly_type,
            severity,
            description,
            amount: tx.amount,
            merchant: tx.description.clone(),
            date: tx.date,
        }
    }
}

fn merchant_key(description: &str) -> String {
    description.trim().to_lowercase()
}

fn is_weekend(date: chrono::NaiveDate) -> bool {
    use chrono::Datelike;
    matches!(date.weekday(), chrono::Weekday::Sat | chrono::Weekday::Sun)
}

impl AnomalyDetector {
    pub fn new() -> Self {
        Self {
            config: AnomalyConfig::default(),
        }
    }

    pub fn with_config(config: AnomalyConfig) -> Self {
        Self { config }
    }

    /// Run all passes. The result carries at most one anomaly per
    /// transaction, sorted by severity then absolute amount, with sequential
    /// ids assigned after sorting.
    pub fn detect(&self, transactions: &[CategorizedTransaction]) -> Vec<Anomaly> {
        if transactions.is_empty() {
            return Vec::new();
        }

        let mut candidates = Vec::new();
        candidates.extend(self.detect_unusually_large(transactions));
        candidates.extend(self.detect_new_merchants(transactions));
        candidates.extend(self.detect_category_spikes(transactions));
        candidates.extend(self.detect_duplicates(transactions));
        candidates.extend(self.detect_unusual_timing(transactions));

        // Keep the highest-severity candidate per transaction; the first in
        // pass order wins ties
        let mut slots: HashMap<String, usize> = HashMap::new();
        let mut merged: Vec<Candidate> = Vec::new();
        for candidate in candidates {
            match slots.get(&candidate.transaction_id) {
                Some(&slot) => {
                    if candidate.severity.priority() > merged[slot].severity.priority() {
                        merged[slot] = candidate;
                    }
                }
                None => {
                    slots.insert(candidate.transaction_id.clone(), merged.len());
                    merged.push(candidate);
                }
            }
        }

        merged.sort_by(|a, b| {
            b.severity
                .priority()
                .cmp(&a.severity.priority())
                .then_with(|| {
                    b.amount
                        .abs()
                        .partial_cmp(&a.amount.abs())
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
        });

        let anomalies: Vec<Anomaly> = merged
            .into_iter()
            .enumerate()
            .map(|(i, c)| Anomaly {
                id: format!("anomaly-{}", i),
                transaction_id: c.transaction_id,
                anomaly_type: c.anomaly_type,
                severity: c.severity,
                description: c.description,
                amount: c.amount,
                merchant: c.merchant,
                date: c.date,
            })
            .collect();

        debug!(count = anomalies.len(), "anomaly detection complete");
        anomalies
    }

    /// Transactions far above their category's average
    fn detect_unusually_large(&self, transactions: &[CategorizedTransaction]) -> Vec<Candidate> {
        let mut by_category: HashMap<Category, Vec<&CategorizedTransaction>> = HashMap::new();
        for tx in transactions {
            if tx.category.is_cash_flow() {
                continue;
            }
            by_category.entry(tx.category).or_default().push(tx);
        }

        let mut candidates = Vec::new();

        for category in Category::ALL {
            let Some(group) = by_category.get(&category) else {
                continue;
            };
            if group.len() < self.config.large_min_count {
                continue;
            }

            let mean =
                group.iter().map(|tx| tx.amount.abs()).sum::<f64>() / group.len() as f64;
            if mean == 0.0 {
                continue;
            }

            for tx in group {
                let ratio = tx.amount.abs() / mean;
                if ratio > self.config.large_ratio {
                    let severity = if ratio > self.config.large_high_ratio {
                        Severity::High
                    } else {
                        Severity::Medium
                    };
                    candidates.push(Candidate::flag(
                        tx,
                        AnomalyType::UnusuallyLarge,
                        severity,
                        format!(
                            "${:.2} is {:.1}x the average {} spend of ${:.2}",
                            tx.amount.abs(),
                            ratio,
                            category,
                            mean
                        ),
                    ));
                }
            }
        }

        candidates
    }

    /// Sizable one-off charges from merchants with no other history
    fn detect_new_merchants(&self, transactions: &[CategorizedTransaction]) -> Vec<Candidate> {
        let mut order: Vec<&CategorizedTransaction> = Vec::new();
        let mut counts: HashMap<String, usize> = HashMap::new();
        for tx in transactions {
            let key = merchant_key(&tx.description);
            let count = counts.entry(key).or_insert(0);
            *count += 1;
            if *count == 1 {
                order.push(tx);
            }
        }

        order
            .into_iter()
            .filter(|tx| counts[&merchant_key(&tx.description)] == 1)
            .filter(|tx| !tx.category.is_cash_flow())
            .filter(|tx| tx.amount.abs() > self.config.new_merchant_min_amount)
            .map(|tx| {
                let severity = if tx.amount.abs() > self.config.new_merchant_medium_amount {
                    Severity::Medium
                } else {
                    Severity::Low
                };
                Candidate::flag(
                    tx,
                    AnomalyType::NewMerchant,
                    severity,
                    format!(
                        "One-time charge of ${:.2} from a merchant with no other history",
                        tx.amount.abs()
                    ),
                )
            })
            .collect()
    }

    /// Months where a category ran far above its own monthly average
    fn detect_category_spikes(&self, transactions: &[CategorizedTransaction]) -> Vec<Candidate> {
        let mut by_category: HashMap<Category, Vec<&CategorizedTransaction>> = HashMap::new();
        for tx in transactions {
            if tx.category.is_cash_flow() {
                continue;
            }
            by_category.entry(tx.category).or_default().push(tx);
        }

        let mut candidates = Vec::new();

        for category in Category::ALL {
            let Some(group) = by_category.get(&category) else {
                continue;
            };

            let mut by_month: HashMap<String, Vec<&CategorizedTransaction>> = HashMap::new();
            for &tx in group {
                by_month
                    .entry(tx.date.format("%Y-%m").to_string())
                    .or_default()
                    .push(tx);
            }
            if by_month.len() < 2 {
                continue;
            }

            let mut months: Vec<(String, f64, Vec<&CategorizedTransaction>)> = by_month
                .into_iter()
                .map(|(month, txs)| {
                    let total = txs.iter().map(|tx| tx.amount.abs()).sum();
                    (month, total, txs)
                })
                .collect();
            months.sort_by(|a, b| a.0.cmp(&b.0));

            let mean = months.iter().map(|(_, total, _)| total).sum::<f64>()
                / months.len() as f64;
            if mean == 0.0 {
                continue;
            }

            for (month, total, txs) in &months {
                let ratio = total / mean;
                if ratio <= self.config.spike_ratio {
                    continue;
                }

                // Flag the single largest transaction of the spiking month
                let Some(biggest) = txs
                    .iter()
                    .max_by(|a, b| {
                        a.amount
                            .abs()
                            .partial_cmp(&b.amount.abs())
                            .unwrap_or(std::cmp::Ordering::Equal)
                    })
                else {
                    continue;
                };

                let severity = if ratio > self.config.spike_high_ratio {
                    Severity::High
                } else {
                    Severity::Medium
                };
                candidates.push(Candidate::flag(
                    biggest,
                    AnomalyType::CategorySpike,
                    severity,
                    format!(
                        "{} spending in {} was {:.1}x the monthly average (${:.2} vs ${:.2})",
                        category, month, ratio, total, mean
                    ),
                ));
            }
        }

        candidates
    }

    /// Same merchant, same amount, within a few days: a possible double charge
    fn detect_duplicates(&self, transactions: &[CategorizedTransaction]) -> Vec<Candidate> {
        let mut sorted: Vec<&CategorizedTransaction> = transactions.iter().collect();
        sorted.sort_by_key(|tx| tx.date);

        let mut candidates = Vec::new();
        let mut seen_pairs: HashSet<(String, String)> = HashSet::new();

        for i in 0..sorted.len() {
            for j in (i + 1)..sorted.len() {
                let earlier = sorted[i];
                let later = sorted[j];

                let gap = (later.date - earlier.date).num_days();
                // Dates are nondecreasing after the stable sort, so nothing
                // further right can be back inside the window
                if gap > self.config.duplicate_window_days {
                    break;
                }

                if merchant_key(&earlier.description) != merchant_key(&later.description)
                    || earlier.amount != later.amount
                {
                    continue;
                }

                let pair = (earlier.id.clone(), later.id.clone());
                if !seen_pairs.insert(pair) {
                    continue;
                }

                let day_label = if gap == 1 { "day" } else { "days" };
                candidates.push(Candidate::flag(
                    later,
                    AnomalyType::Duplicate,
                    Severity::Medium,
                    format!(
                        "Possible double charge: same merchant and amount (${:.2}) within {} {}",
                        earlier.amount.abs(),
                        gap,
                        day_label
                    ),
                ));
            }
        }

        candidates
    }

    /// Outsized weekend charges relative to the weekend baseline
    fn detect_unusual_timing(&self, transactions: &[CategorizedTransaction]) -> Vec<Candidate> {
        let weekend: Vec<&CategorizedTransaction> = transactions
            .iter()
            .filter(|tx| is_weekend(tx.date) && !tx.category.is_cash_flow())
            .collect();

        if weekend.len() < self.config.weekend_min_count {
            return Vec::new();
        }

        let mean =
            weekend.iter().map(|tx| tx.amount.abs()).sum::<f64>() / weekend.len() as f64;
        if mean == 0.0 {
            return Vec::new();
        }

        weekend
            .into_iter()
            .filter(|tx| tx.amount.abs() > mean * self.config.weekend_ratio)
            .map(|tx| {
                Candidate::flag(
                    tx,
                    AnomalyType::UnusualTiming,
                    Severity::Low,
                    format!(
                        "Large weekend charge of ${:.2}, {:.1}x your average weekend transaction",
                        tx.amount.abs(),
                        tx.amount.abs() / mean
                    ),
                )
            })
            .collect()
    }
}

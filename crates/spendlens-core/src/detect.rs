//! Subscription detection
//!
//! Groups charges by normalized merchant identity and scores recurrence:
//! interval regularity against known cadences plus amount stability. Groups
//! scoring well are surfaced as subscriptions, ranked by monthly cost.

use chrono::Duration;
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::debug;

use crate::models::{CategorizedTransaction, Frequency, Subscription};

/// Candidate cadences, tried in order; the first one the median gap fits wins
const FREQUENCY_TARGETS: &[(Frequency, i64, i64)] = &[
    (Frequency::Weekly, 7, 1),
    (Frequency::Monthly, 30, 3),
    (Frequency::Yearly, 365, 15),
];

/// Minimum share of gaps that must sit within tolerance of the target
const MIN_INTERVAL_SCORE: f64 = 0.5;

/// Groups scoring at or below this overall confidence are discarded
const MIN_CONFIDENCE: f64 = 0.5;

/// Store numbers and order ids tacked onto the end of a description
static TRAILING_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s#\-_]+\d+$").expect("trailing id pattern compiles"));

/// Merchant identity key: lowercased, trailing numeric suffix stripped,
/// whitespace collapsed
fn normalize_merchant(description: &str) -> String {
    let lowered = description.trim().to_lowercase();
    let stripped = TRAILING_ID_RE.replace(&lowered, "");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Frequency matched to a group's charge gaps, with the share of gaps that
/// fit the cadence
fn match_frequency(gaps: &[i64]) -> Option<(Frequency, f64)> {
    if gaps.is_empty() {
        return None;
    }

    let mut sorted = gaps.to_vec();
    sorted.sort_unstable();
    let median = sorted[sorted.len() / 2];

    for &(frequency, target, tolerance) in FREQUENCY_TARGETS {
        if (median - target).abs() <= tolerance {
            let matching = gaps
                .iter()
                .filter(|&&gap| (gap - target).abs() <= tolerance)
                .count();
            let interval_score = matching as f64 / gaps.len() as f64;
            if interval_score >= MIN_INTERVAL_SCORE {
                return Some((frequency, interval_score));
            }
        }
    }

    None
}

/// Amount stability score from the worst relative deviation against the mean
fn amount_consistency(amounts: &[f64]) -> f64 {
    if amounts.len() <= 1 {
        return 1.0;
    }

    let mean = amounts.iter().sum::<f64>() / amounts.len() as f64;
    if mean == 0.0 {
        return 0.0;
    }

    let max_deviation = amounts
        .iter()
        .map(|amount| (amount - mean).abs() / mean.abs())
        .fold(0.0_f64, f64::max);

    if max_deviation <= 0.05 {
        1.0
    } else if max_deviation <= 0.1 {
        0.9
    } else if max_deviation <= 0.2 {
        0.7
    } else if max_deviation <= 0.35 {
        0.5
    } else {
        0.3
    }
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Detects recurring charges in a categorized transaction set
///
/// Stateless: every call recomputes from scratch.
#[derive(Debug, Default)]
pub struct SubscriptionDetector;

impl SubscriptionDetector {
    pub fn new() -> Self {
        Self
    }

    /// Surface likely subscriptions, sorted descending by monthly-equivalent
    /// cost
    pub fn detect(&self, transactions: &[CategorizedTransaction]) -> Vec<Subscription> {
        // Group by merchant identity, preserving first-seen order so ids are
        // deterministic
        let mut order: Vec<String> = Vec::new();
        let mut groups: HashMap<String, (String, Vec<&CategorizedTransaction>)> = HashMap::new();

        for tx in transactions {
            let key = normalize_merchant(&tx.description);
            let entry = groups.entry(key.clone()).or_insert_with(|| {
                order.push(key);
                (tx.description.trim().to_string(), Vec::new())
            });
            entry.1.push(tx);
        }

        let mut subscriptions = Vec::new();
        let mut id_counter = 0usize;

        for key in &order {
            let Some((display, group)) = groups.get(key) else {
                continue;
            };
            if group.len() < 2 {
                continue;
            }

            let mut sorted: Vec<&CategorizedTransaction> = group.clone();
            sorted.sort_by_key(|tx| tx.date);

            let gaps: Vec<i64> = sorted
                .windows(2)
                .map(|pair| (pair[1].date - pair[0].date).num_days())
                .collect();

            let Some((frequency, interval_score)) = match_frequency(&gaps) else {
                continue;
            };

            let amounts: Vec<f64> = sorted.iter().map(|tx| tx.amount.abs()).collect();
            let amount_score = amount_consistency(&amounts);

            // Weighted confidence: interval regularity dominates
            let confidence =
                ((interval_score * 0.6 + amount_score * 0.4) * 100.0).round() / 100.0;
            if confidence <= MIN_CONFIDENCE {
                continue;
            }

            let total: f64 = amounts.iter().sum();
            let mean = total / amounts.len() as f64;
            let last_charge = sorted[sorted.len() - 1].date;

            subscriptions.push(Subscription {
                id: format!("sub-{}", id_counter),
                merchant: display.clone(),
                amount: round_cents(mean),
                frequency,
                confidence,
                last_charge,
                next_expected_charge: last_charge + Duration::days(frequency.interval_days()),
                total_spent: round_cents(total),
                occurrences: sorted.len(),
                transaction_ids: sorted.iter().map(|tx| tx.id.clone()).collect(),
            });
            id_counter += 1;
        }

        subscriptions.sort_by(|a, b| {
            b.frequency
                .monthly_cost(b.amount)
                .partial_cmp(&a.frequency.monthly_cost(a.amount))
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        debug!(count = subscriptions.len(), "subscription detection complete");
        subscriptions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Category;
    use chrono::NaiveDate;

    fn tx(id: usize, date: NaiveDate, description: &str, amount: f64) -> CategorizedTransaction {
        CategorizedTransaction {
            id: format!("tx-{}", id),
            date,
            description: description.to_string(),
            amount,
            raw_category: None,
            category: Category::Subscriptions,
            confidence: 0.9,
            is_overridden: false,
        }
    }

    fn monthly_charges(description: &str, amount: f64, count: usize) -> Vec<CategorizedTransaction> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 3).unwrap();
        (0..count)
            .map(|i| {
                tx(
                    i,
                    start + Duration::days(30 * i as i64),
                    description,
                    amount,
                )
            })
            .collect()
    }

    #[test]
    fn test_normalize_merchant() {
        assert_eq!(normalize_merchant("  NETFLIX.COM  "), "netflix.com");
        assert_eq!(normalize_merchant("GROCERY MART #1234"), "grocery mart");
        assert_eq!(normalize_merchant("PARKING - 88"), "parking");
        assert_eq!(normalize_merchant("Gym   Membership 42"), "gym membership");
    }

    #[test]
    fn test_monthly_subscription_detected_with_high_confidence() {
        let transactions = monthly_charges("STREAMFLIX", -9.99, 6);
        let subscriptions = SubscriptionDetector::new().detect(&transactions);

        assert_eq!(subscriptions.len(), 1);
        let sub = &subscriptions[0];
        assert_eq!(sub.merchant, "STREAMFLIX");
        assert_eq!(sub.frequency, Frequency::Monthly);
        assert!(sub.confidence > 0.9);
        assert_eq!(sub.occurrences, 6);
        assert_eq!(sub.amount, 9.99);
        assert_eq!(sub.total_spent, 59.94);
        assert_eq!(sub.transaction_ids.len(), 6);
        assert_eq!(
            sub.next_expected_charge,
            sub.last_charge + Duration::days(30)
        );
    }

    #[test]
    fn test_weekly_and_yearly_cadences() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let weekly: Vec<CategorizedTransaction> = (0..5)
            .map(|i| tx(i, start + Duration::days(7 * i as i64), "MEAL KIT", -25.00))
            .collect();
        let yearly: Vec<CategorizedTransaction> = (0..3)
            .map(|i| {
                tx(
                    10 + i,
                    start + Duration::days(365 * i as i64),
                    "DOMAIN RENEWAL",
                    -12.00,
                )
            })
            .collect();

        let detector = SubscriptionDetector::new();
        let weekly_subs = detector.detect(&weekly);
        assert_eq!(weekly_subs[0].frequency, Frequency::Weekly);

        let yearly_subs = detector.detect(&yearly);
        assert_eq!(yearly_subs[0].frequency, Frequency::Yearly);
    }

    #[test]
    fn test_single_charge_is_not_a_subscription() {
        let transactions = monthly_charges("ONE OFF", -20.00, 1);
        assert!(SubscriptionDetector::new().detect(&transactions).is_empty());
    }

    #[test]
    fn test_irregular_intervals_rejected() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let offsets = [0, 4, 45, 51, 120];
        let transactions: Vec<CategorizedTransaction> = offsets
            .iter()
            .enumerate()
            .map(|(i, &days)| tx(i, start + Duration::days(days), "RANDOM SHOP", -15.00))
            .collect();

        assert!(SubscriptionDetector::new().detect(&transactions).is_empty());
    }

    #[test]
    fn test_weighted_confidence_combines_interval_and_amount() {
        // Gaps 30, 45, 30: monthly with interval score 2/3. Amounts swing
        // wildly, so the amount score bottoms out at 0.3.
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let offsets = [0, 30, 75, 105];
        let amounts = [10.0, 80.0, 10.0, 95.0];
        let transactions: Vec<CategorizedTransaction> = offsets
            .iter()
            .zip(amounts)
            .enumerate()
            .map(|(i, (&days, amount))| {
                tx(i, start + Duration::days(days), "EVERYTHING STORE", -amount)
            })
            .collect();

        let subs = SubscriptionDetector::new().detect(&transactions);
        // 0.67 * 0.6 + 0.3 * 0.4 = 0.52: retained, barely above the cutoff
        assert_eq!(subs.len(), 1);
        assert!((subs[0].confidence - 0.52).abs() < 1e-9);
    }

    #[test]
    fn test_merchants_with_store_numbers_group_together() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let transactions: Vec<CategorizedTransaction> = (0..4)
            .map(|i| {
                tx(
                    i,
                    start + Duration::days(30 * i as i64),
                    &format!("GYM CLUB #{}", 100 + i),
                    -40.00,
                )
            })
            .collect();

        let subs = SubscriptionDetector::new().detect(&transactions);
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].occurrences, 4);
    }

    #[test]
    fn test_sorted_by_monthly_equivalent_cost() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let mut transactions = Vec::new();
        // Weekly $10 (~$43/mo) should outrank monthly $20
        for i in 0..5 {
            transactions.push(tx(
                i,
                start + Duration::days(7 * i as i64),
                "WEEKLY BOX",
                -10.00,
            ));
        }
        for i in 0..4 {
            transactions.push(tx(
                10 + i,
                start + Duration::days(30 * i as i64),
                "MONTHLY APP",
                -20.00,
            ));
        }

        let subs = SubscriptionDetector::new().detect(&transactions);
        assert_eq!(subs.len(), 2);
        assert_eq!(subs[0].merchant, "WEEKLY BOX");
        assert_eq!(subs[1].merchant, "MONTHLY APP");
    }
}

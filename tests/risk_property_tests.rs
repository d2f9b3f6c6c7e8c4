//! Property-based tests for the risk scorer and the audit detector
//!
//! This module uses the proptest crate to verify invariants that should hold
//! for all inputs, not just hand-picked boundary cases: score totality and
//! clamping, monotonicity under schedule pressure, and the rule that a
//! blocking finding can never coexist with an approve recommendation.

use std::collections::HashMap;

use chrono::{Duration, Utc};
use proptest::prelude::*;

use btp_approval::{
    audit::{AuditContext, Recommendation, run_audit},
    document::{Amount, Currency, Document, DocumentKind, TimeStamp},
    raci::Bureau,
    risk::{self, RiskBand, RiskInput},
};

// PROPERTY TEST STRATEGIES

/// Strategy to generate arbitrary scorer inputs across the interesting range
fn risk_input_strategy() -> impl Strategy<Value = RiskInput> {
    (-500i64..=500, 0u64..=50_000_000, any::<bool>()).prop_map(
        |(days_until_due, amount_units, invoice_matched)| RiskInput {
            days_until_due,
            amount_units,
            invoice_matched,
        },
    )
}

/// Strategy to generate a purchase order with the given amount, due offset
/// and project budget, plus whether the supplier is blacklisted
fn audit_case_strategy() -> impl Strategy<Value = (u64, i64, u64, bool)> {
    (
        1u64..=50_000_000,  // amount
        -60i64..=60,        // days until due
        0u64..=50_000_000,  // remaining project budget
        any::<bool>(),      // supplier blacklisted
    )
}

fn order_for(amount: u64, days_until_due: i64) -> Document {
    let now = Utc::now();
    Document::draft()
        .set_id("bc_prop".into())
        .set_kind(DocumentKind::PurchaseOrder {
            supplier: "Fournisseur Test".into(),
            line_items: vec![],
            matched_invoice: Some("fact_prop".into()),
        })
        .set_amount(Amount::Units(amount))
        .set_currency(Currency::XOF)
        .set_bureau(Bureau::Bmo)
        .set_project_ref("chantier_prop".into())
        .set_created_date(TimeStamp::from(now - Duration::days(365)))
        .set_due_date(TimeStamp::from(now + Duration::days(days_until_due)))
}

// PROPERTY TESTS
proptest! {
    /// Property: the score is always within [0, 100] and its band agrees
    /// with the band lookup. Clamping keeps banding total no matter how
    /// overdue a document gets.
    #[test]
    fn score_is_clamped_and_band_consistent(input in risk_input_strategy()) {
        let score = risk::score(&input);

        prop_assert!(score.value <= 100);
        prop_assert_eq!(score.band, risk::band_for(score.value));
    }

    /// Property: increasing days overdue (holding amount and invoice match
    /// fixed) never decreases the score
    #[test]
    fn score_is_monotone_in_schedule_pressure(
        later in -500i64..=500,
        delta in 0i64..=200,
        amount_units in 0u64..=50_000_000,
        invoice_matched in any::<bool>(),
    ) {
        let earlier = later.saturating_sub(delta); // earlier due date = more overdue

        let relaxed = risk::score(&RiskInput { days_until_due: later, amount_units, invoice_matched });
        let pressed = risk::score(&RiskInput { days_until_due: earlier, amount_units, invoice_matched });

        prop_assert!(pressed.value >= relaxed.value);
    }

    /// Property: a larger amount never lowers the score
    #[test]
    fn score_is_monotone_in_amount(
        days_until_due in -500i64..=500,
        amount in 0u64..=50_000_000,
        extra in 0u64..=50_000_000,
        invoice_matched in any::<bool>(),
    ) {
        let small = risk::score(&RiskInput { days_until_due, amount_units: amount, invoice_matched });
        let large = risk::score(&RiskInput { days_until_due, amount_units: amount + extra, invoice_matched });

        prop_assert!(large.value >= small.value);
    }

    /// Property: a missing invoice match never lowers the score
    #[test]
    fn missing_invoice_never_lowers_score(
        days_until_due in -500i64..=500,
        amount_units in 0u64..=50_000_000,
    ) {
        let matched = risk::score(&RiskInput { days_until_due, amount_units, invoice_matched: true });
        let unmatched = risk::score(&RiskInput { days_until_due, amount_units, invoice_matched: false });

        prop_assert!(unmatched.value >= matched.value);
    }

    /// Property: banding is total over the whole clamped range
    #[test]
    fn every_score_has_a_band(value in 0u8..=100) {
        let band = risk::band_for(value);
        prop_assert!(matches!(
            band,
            RiskBand::Low | RiskBand::Medium | RiskBand::High | RiskBand::Critical
        ));
    }

    /// Property: for every audit report, blocking implies the recommendation
    /// is not approve, and a clean report implies approve
    #[test]
    fn blocking_reports_never_approve((amount, days, budget, blacklisted) in audit_case_strategy()) {
        let document = order_for(amount, days);

        let blacklist = if blacklisted {
            vec!["Fournisseur Test".to_string()]
        } else {
            vec![]
        };
        let ctx = AuditContext {
            supplier_blacklist: Some(blacklist),
            remaining_budget_by_project: Some(HashMap::from([(
                "chantier_prop".to_string(),
                budget,
            )])),
            last_known_prices: Some(HashMap::new()),
            ..AuditContext::new()
        };

        let report = run_audit(&document, &ctx, Utc::now());

        if report.blocking {
            prop_assert_ne!(report.recommendation, Recommendation::Approve);
            prop_assert!(!report.is_valid);
        }
        if report.findings.is_empty() {
            prop_assert_eq!(report.recommendation, Recommendation::Approve);
        }

        // the report risk band is exactly the scorer's band for this document
        prop_assert_eq!(report.risk, report.score.band);
    }

    /// Property: the expected blocking conditions are the only ones.
    /// Blacklisted supplier or insufficient budget block; otherwise the
    /// verified context never blocks.
    #[test]
    fn blocking_matches_rule_inputs((amount, days, budget, blacklisted) in audit_case_strategy()) {
        let document = order_for(amount, days);
        let ctx = AuditContext {
            supplier_blacklist: Some(if blacklisted {
                vec!["Fournisseur Test".to_string()]
            } else {
                vec![]
            }),
            remaining_budget_by_project: Some(HashMap::from([(
                "chantier_prop".to_string(),
                budget,
            )])),
            last_known_prices: Some(HashMap::new()),
            ..AuditContext::new()
        };

        let report = run_audit(&document, &ctx, Utc::now());
        let expected_blocking = blacklisted || budget < amount;

        prop_assert_eq!(report.blocking, expected_blocking);
    }
}

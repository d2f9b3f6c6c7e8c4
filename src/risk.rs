//! Threshold-weighted risk scoring for validatable documents
use chrono::{DateTime, Utc};

use super::document::Document;

/// Amount tier above which BMO-level approval is no longer sufficient.
pub const BMO_AMOUNT_TIER: u64 = 5_000_000;
/// Amount tier above which Direction Générale must decide.
pub const DG_AMOUNT_TIER: u64 = 20_000_000;

/// Inputs the scorer needs, extracted from a document once at the boundary.
/// Negative `days_until_due` means the document is overdue.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct RiskInput {
    pub days_until_due: i64,
    pub amount_units: u64,
    pub invoice_matched: bool,
}

impl RiskInput {
    pub fn for_document(document: &Document, now: DateTime<Utc>) -> Self {
        let days_until_due = document
            .due_date()
            .map(|due| (due.to_datetime_utc() - now).num_days())
            .unwrap_or(i64::MAX);

        Self {
            days_until_due,
            amount_units: document.normalized_amount().units,
            invoice_matched: document.invoice_matched(),
        }
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, Eq, Ord, PartialEq, PartialOrd)]
pub enum RiskBand {
    #[n(0)]
    Low,
    #[n(1)]
    Medium,
    #[n(2)]
    High,
    #[n(3)]
    Critical,
}

impl RiskBand {
    pub fn label(&self) -> &'static str {
        match self {
            RiskBand::Low => "low",
            RiskBand::Medium => "medium",
            RiskBand::High => "high",
            RiskBand::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct RiskScore {
    pub value: u8,
    pub band: RiskBand,
}

/// Band breakpoints: low 0-34, medium 35-64, high 65-84, critical 85-100.
pub fn band_for(value: u8) -> RiskBand {
    match value {
        0..=34 => RiskBand::Low,
        35..=64 => RiskBand::Medium,
        65..=84 => RiskBand::High,
        _ => RiskBand::Critical,
    }
}

/// Additive risk score, clamped to 100 before banding so the band lookup
/// stays total for arbitrarily overdue documents.
pub fn score(input: &RiskInput) -> RiskScore {
    let mut total: u64 = 0;

    if input.days_until_due < 0 {
        let days_overdue = input.days_until_due.unsigned_abs();
        total = total
            .saturating_add(days_overdue.saturating_mul(2))
            .saturating_add(55);
    } else if input.days_until_due <= 3 {
        total += 25;
    }

    if input.amount_units >= BMO_AMOUNT_TIER {
        total = total.saturating_add(18);
    }
    if input.amount_units >= DG_AMOUNT_TIER {
        total = total.saturating_add(8);
    }
    if !input.invoice_matched {
        total = total.saturating_add(12);
    }

    let value = total.min(100) as u8;
    RiskScore {
        value,
        band: band_for(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(days_until_due: i64, amount_units: u64, invoice_matched: bool) -> RiskInput {
        RiskInput {
            days_until_due,
            amount_units,
            invoice_matched,
        }
    }

    #[test]
    fn clean_document_scores_zero() {
        let score = score(&input(10, 1_000_000, true));

        assert_eq!(score.value, 0);
        assert_eq!(score.band, RiskBand::Low);
    }

    #[test]
    fn one_day_overdue_large_amount() {
        // 55 base + 2 per day overdue + 18 for the BMO tier
        let score = score(&input(-1, 6_000_000, true));

        assert_eq!(score.value, 75);
        assert_eq!(score.band, RiskBand::High);
    }

    #[test]
    fn far_overdue_saturates_at_one_hundred() {
        let score = score(&input(-400, 0, true));

        assert_eq!(score.value, 100);
        assert_eq!(score.band, RiskBand::Critical);
    }

    #[test]
    fn extreme_overdue_does_not_overflow() {
        let score = score(&input(i64::MIN, u64::MAX, false));

        assert_eq!(score.value, 100);
        assert_eq!(score.band, RiskBand::Critical);
    }

    #[test]
    fn due_within_three_days_adds_pressure() {
        assert_eq!(score(&input(0, 0, true)).value, 25);
        assert_eq!(score(&input(3, 0, true)).value, 25);
        assert_eq!(score(&input(4, 0, true)).value, 0);
    }

    #[test]
    fn dg_tier_adds_on_top_of_bmo_tier() {
        assert_eq!(score(&input(10, 5_000_000, true)).value, 18);
        assert_eq!(score(&input(10, 20_000_000, true)).value, 26);
    }

    #[test]
    fn missing_invoice_match_contributes() {
        assert_eq!(score(&input(10, 0, false)).value, 12);
    }
}

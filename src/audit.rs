//! Rule-based anomaly detection and audit reporting
//!
//! One authoritative code path: `run_audit` composes the risk scorer with the
//! budget, blacklist and pricing rules and produces a single typed report.
//! Screening data is optional in the context; absent data yields an
//! "unverified" finding rather than silence, so a clean report always means
//! verified clean.
use std::collections::HashMap;

use chrono::{DateTime, Utc};

use super::document::Document;
use super::risk::{self, BMO_AMOUNT_TIER, DG_AMOUNT_TIER, RiskBand, RiskInput, RiskScore};

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, Eq, Ord, PartialEq, PartialOrd)]
pub enum Severity {
    #[n(0)]
    Info,
    #[n(1)]
    Warning,
    #[n(2)]
    Error,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, Eq, PartialEq)]
pub enum FindingCategory {
    /// Amount at or above the DG tier, decision must move up.
    #[n(0)]
    DgThreshold,
    /// Amount in the BMO..DG range, a second-level sign-off is required.
    #[n(1)]
    SecondLevelApproval,
    #[n(2)]
    BlacklistedSupplier,
    #[n(3)]
    InsufficientBudget,
    #[n(4)]
    PriceDeviation,
    #[n(5)]
    UnparsedAmount,
    /// Screening data was not available; "no data" is never "no risk".
    #[n(6)]
    Unverified,
    /// Composed risk score landed in the critical band.
    #[n(7)]
    CriticalRisk,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Eq, PartialEq)]
pub struct AuditFinding {
    #[n(0)]
    pub category: FindingCategory,
    #[n(1)]
    pub severity: Severity,
    #[n(2)]
    pub description: String,
    #[n(3)]
    pub blocking: bool,
    #[n(4)]
    pub resolved: bool,
}

impl AuditFinding {
    pub fn blocking(category: FindingCategory, description: String) -> Self {
        Self {
            category,
            severity: Severity::Error,
            description,
            blocking: true,
            resolved: false,
        }
    }
    pub fn warning(category: FindingCategory, description: String) -> Self {
        Self {
            category,
            severity: Severity::Warning,
            description,
            blocking: false,
            resolved: false,
        }
    }
    pub fn info(category: FindingCategory, description: String) -> Self {
        Self {
            category,
            severity: Severity::Info,
            description,
            blocking: false,
            resolved: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Recommendation {
    Approve,
    Reject,
    Escalate,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct AuditReport {
    pub findings: Vec<AuditFinding>,
    pub is_valid: bool,
    pub blocking: bool,
    pub recommendation: Recommendation,
    pub risk: RiskBand,
    pub score: RiskScore,
}

/// Dependency-injected audit state. The `Option` screening fields
/// distinguish "no data available" from an empty-but-verified data set.
#[derive(Debug, Clone)]
pub struct AuditContext {
    pub bmo_threshold: u64,
    pub dg_threshold: u64,
    pub supplier_blacklist: Option<Vec<String>>,
    pub remaining_budget_by_project: Option<HashMap<String, u64>>,
    /// Last known unit price per (supplier, item).
    pub last_known_prices: Option<HashMap<(String, String), u64>>,
}

impl Default for AuditContext {
    fn default() -> Self {
        Self {
            bmo_threshold: BMO_AMOUNT_TIER,
            dg_threshold: DG_AMOUNT_TIER,
            supplier_blacklist: None,
            remaining_budget_by_project: None,
            last_known_prices: None,
        }
    }
}

impl AuditContext {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Evaluate the full rule set against one document. Pure function of its
/// inputs; the caller owns any state mutation.
pub fn run_audit(document: &Document, ctx: &AuditContext, now: DateTime<Utc>) -> AuditReport {
    let mut findings = Vec::new();

    let amount = document.normalized_amount();
    if !amount.parsed {
        findings.push(AuditFinding::info(
            FindingCategory::UnparsedAmount,
            "amount could not be parsed and was treated as zero".into(),
        ));
    }

    let score = risk::score(&RiskInput::for_document(document, now));

    if amount.units >= ctx.dg_threshold {
        findings.push(AuditFinding::warning(
            FindingCategory::DgThreshold,
            format!(
                "amount {} reaches the DG threshold {}, Direction Générale must decide",
                amount.units,
                ctx.dg_threshold
            ),
        ));
    } else if amount.units >= ctx.bmo_threshold {
        findings.push(AuditFinding::warning(
            FindingCategory::SecondLevelApproval,
            format!(
                "amount {} exceeds the BMO ceiling {}, second-level (DG) sign-off required",
                amount.units,
                ctx.bmo_threshold
            ),
        ));
    }

    if let Some(supplier) = document.supplier() {
        match &ctx.supplier_blacklist {
            Some(blacklist) => {
                if blacklist.iter().any(|s| s.eq_ignore_ascii_case(supplier)) {
                    findings.push(AuditFinding::blocking(
                        FindingCategory::BlacklistedSupplier,
                        format!("supplier {supplier} is blacklisted"),
                    ));
                }
            }
            None => findings.push(AuditFinding::info(
                FindingCategory::Unverified,
                format!("no blacklist available, supplier {supplier} not screened"),
            )),
        }
    }

    if let Some(project) = document.project_ref() {
        match &ctx.remaining_budget_by_project {
            Some(budgets) => match budgets.get(project) {
                Some(remaining) if *remaining < amount.units => {
                    findings.push(AuditFinding::blocking(
                        FindingCategory::InsufficientBudget,
                        format!(
                            "project {project} has {remaining} remaining, cannot cover {}",
                            amount.units
                        ),
                    ));
                }
                Some(_) => {}
                None => findings.push(AuditFinding::info(
                    FindingCategory::Unverified,
                    format!("no budget data for project {project}"),
                )),
            },
            None => findings.push(AuditFinding::info(
                FindingCategory::Unverified,
                format!("budget data unavailable, project {project} not checked"),
            )),
        }
    }

    check_line_item_prices(document, ctx, &mut findings);

    // the scorer feeds back into the rule evaluation: a critical band is
    // itself a finding, so escalation is always finding-backed
    if score.band == RiskBand::Critical {
        findings.push(AuditFinding::warning(
            FindingCategory::CriticalRisk,
            format!("risk score {} is critical, escalation required", score.value),
        ));
    }

    let blocking = findings.iter().any(|f| f.blocking);
    let force_escalate = findings.iter().any(|f| {
        matches!(
            f.category,
            FindingCategory::DgThreshold | FindingCategory::CriticalRisk
        )
    });

    let recommendation = if blocking {
        Recommendation::Reject
    } else if force_escalate {
        Recommendation::Escalate
    } else {
        Recommendation::Approve
    };

    AuditReport {
        is_valid: !blocking,
        blocking,
        recommendation,
        risk: score.band,
        score,
        findings,
    }
}

/// A unit price more than 25% above the last known supplier price is flagged.
fn check_line_item_prices(document: &Document, ctx: &AuditContext, findings: &mut Vec<AuditFinding>) {
    let line_items = document.line_items();
    if line_items.is_empty() {
        return;
    }
    let Some(supplier) = document.supplier() else {
        return;
    };

    match &ctx.last_known_prices {
        Some(prices) => {
            for line in line_items {
                let key = (supplier.to_string(), line.item.clone());
                if let Some(known) = prices.get(&key) {
                    if line.unit_price.saturating_mul(100) > known.saturating_mul(125) {
                        findings.push(AuditFinding::warning(
                            FindingCategory::PriceDeviation,
                            format!(
                                "{} priced at {} against last known {} for supplier {supplier}",
                                line.item, line.unit_price, known
                            ),
                        ));
                    }
                }
            }
        }
        None => findings.push(AuditFinding::info(
            FindingCategory::Unverified,
            format!("no reference prices available for supplier {supplier}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Amount, Currency, Document, DocumentKind, TimeStamp};
    use crate::raci::Bureau;

    fn purchase_order(amount: u64, due_in_days: i64, now: DateTime<Utc>) -> Document {
        Document::draft()
            .set_id("bc_test".into())
            .set_kind(DocumentKind::PurchaseOrder {
                supplier: "Sahel Matériaux".into(),
                line_items: vec![],
                matched_invoice: Some("fact_001".into()),
            })
            .set_amount(Amount::Units(amount))
            .set_currency(Currency::XOF)
            .set_bureau(Bureau::Bmo)
            .set_project_ref("chantier_a".into())
            .set_created_date(TimeStamp::from(now - chrono::Duration::days(30)))
            .set_due_date(TimeStamp::from(now + chrono::Duration::days(due_in_days)))
    }

    fn verified_context() -> AuditContext {
        let mut budgets = HashMap::new();
        budgets.insert("chantier_a".to_string(), 50_000_000u64);

        AuditContext {
            supplier_blacklist: Some(vec![]),
            remaining_budget_by_project: Some(budgets),
            last_known_prices: Some(HashMap::new()),
            ..AuditContext::new()
        }
    }

    #[test]
    fn clean_document_approves_with_no_findings() {
        let now = Utc::now();
        let report = run_audit(&purchase_order(1_000_000, 10, now), &verified_context(), now);

        assert!(report.findings.is_empty());
        assert!(report.is_valid);
        assert!(!report.blocking);
        assert_eq!(report.recommendation, Recommendation::Approve);
        assert_eq!(report.risk, RiskBand::Low);
    }

    #[test]
    fn missing_screening_data_is_not_silence() {
        let now = Utc::now();
        let report = run_audit(&purchase_order(1_000_000, 10, now), &AuditContext::new(), now);

        // blacklist and budget screening each report as unverified
        let unverified = report
            .findings
            .iter()
            .filter(|f| matches!(f.category, FindingCategory::Unverified))
            .count();
        assert_eq!(unverified, 2); // no line items, so no price finding
        assert_eq!(report.recommendation, Recommendation::Approve);
    }

    #[test]
    fn blocking_wins_over_escalation() {
        let now = Utc::now();
        let mut ctx = verified_context();
        ctx.remaining_budget_by_project = Some(HashMap::from([(
            "chantier_a".to_string(),
            1_000_000u64,
        )]));

        let report = run_audit(&purchase_order(25_000_000, 10, now), &ctx, now);

        assert!(report.blocking);
        assert_eq!(report.recommendation, Recommendation::Reject);
    }
}

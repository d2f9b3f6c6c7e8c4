//! Service layer API for document validation workflow operations
//!
//! Every operation is a straight-line sequence: RACI gate, optional
//! risk/audit computation, trail append, one batched write. The trail write
//! carries both the status transition and the log entry, so a failed log
//! append fails the whole action.
use std::sync::Arc;

use chrono::Utc;
use sled::Batch;

use super::audit::{self, AuditContext, AuditFinding, AuditReport, Recommendation, Severity};
use super::document::{Document, TimeStamp};
use super::error::ApprovalError;
use super::raci::{Bureau, RaciTable};
use super::trail::{ActionKind, DecisionLogEntry, DecisionTrail, DocumentStatus};

/// The identity acting on a document.
#[derive(Debug, Clone)]
pub struct Actor {
    pub id: String,
    pub bureau: Bureau,
}

impl Actor {
    pub fn new(id: String, bureau: Bureau) -> Self {
        Self { id, bureau }
    }
}

pub struct ApprovalService {
    instance: Arc<sled::Db>,
    raci: RaciTable,
    audit_ctx: AuditContext,
}

impl ApprovalService {
    pub fn new(instance: Arc<sled::Db>, raci: RaciTable, audit_ctx: AuditContext) -> Self {
        Self {
            instance,
            raci,
            audit_ctx,
        }
    }

    /// Load the decision trail for a document
    pub fn decision_trail(&self, document_id: &str) -> anyhow::Result<DecisionTrail> {
        DecisionTrail::load_from_db(&self.instance, document_id)
    }

    /// Load document contents by their finalisation hash
    pub fn document_by_hash(&self, details_hash: &str) -> anyhow::Result<Document> {
        let bytes = self
            .instance
            .get(details_hash.as_bytes())?
            .ok_or_else(|| ApprovalError::MissingContents(details_hash.to_string()))?;

        Ok(minicbor::decode(&bytes)?)
    }

    fn current_document(&self, trail: &DecisionTrail) -> anyhow::Result<Document> {
        let hash = trail
            .latest_details_hash()
            .ok_or_else(|| ApprovalError::UnknownDocument(trail.document_id.clone()))?;
        self.document_by_hash(hash)
    }

    /// RACI gate: only R and A for the activity may act. Returns the
    /// resolved role letter for the log entry.
    fn gate(&self, activity: &str, actor: &Actor) -> anyhow::Result<String> {
        let decision = self.raci.check(activity, actor.bureau);
        if !decision.allowed {
            return Err(ApprovalError::PermissionDenied {
                activity: activity.to_string(),
                bureau: actor.bureau.code().to_string(),
                role: decision.role,
            }
            .into());
        }
        Ok(decision.role)
    }

    fn ensure_open(trail: &DecisionTrail) -> anyhow::Result<()> {
        let status = trail.current_status();
        if status.is_terminal() {
            return Err(ApprovalError::TerminalStatus(status).into());
        }
        Ok(())
    }

    /// Submit a new document for validation. Submission itself is not gated;
    /// the submitter's RACI posture is still recorded on the entry.
    pub fn submit_document(
        &self,
        document: Document,
        actor: &Actor,
    ) -> anyhow::Result<DecisionTrail> {
        let activity = document.validation_activity()?;
        let (details_hash, details_cbor) = document.validate_and_finalise()?;
        let document_id = document
            .id()
            // unreachable after finalisation, kept for the error message
            .ok_or_else(|| ApprovalError::UnknownDocument(String::new()))?
            .to_string();

        let role = self.raci.check(activity, actor.bureau).role;
        let mut trail = DecisionTrail::new(document_id.clone(), activity.to_string());
        let entry = DecisionLogEntry::new(
            document_id,
            actor.id.clone(),
            role,
            actor.bureau,
            ActionKind::Submit {
                details_hash: details_hash.clone(),
            },
            "submitted for validation".to_string(),
            TimeStamp::new(),
        )?;
        trail.append(entry);

        // document contents and trail land in one batch
        let mut batch = Batch::default();
        batch.insert(details_hash.as_bytes(), details_cbor);
        batch.insert(trail.document_id.as_bytes(), minicbor::to_vec(&trail)?);
        self.instance.apply_batch(batch)?;

        Ok(trail)
    }

    /// Run the audit and apply its recommendation: approve, escalate or
    /// reject. Refused on terminal trails and while findings are unresolved.
    pub fn validate_document(
        &self,
        document_id: &str,
        actor: &Actor,
    ) -> anyhow::Result<(DecisionTrail, AuditReport)> {
        let mut trail = self.decision_trail(document_id)?;
        Self::ensure_open(&trail)?;

        let activity = trail.activity.clone();
        let role = self.gate(&activity, actor)?;

        let unresolved = trail.unresolved_findings();
        if unresolved > 0 {
            return Err(ApprovalError::UnresolvedFindings(unresolved).into());
        }

        let document = self.current_document(&trail)?;
        let report = audit::run_audit(&document, &self.audit_ctx, Utc::now());

        let (action, details) = match report.recommendation {
            Recommendation::Approve => (
                ActionKind::Validate,
                format!(
                    "validated, risk score {} ({})",
                    report.score.value,
                    report.risk.label()
                ),
            ),
            Recommendation::Escalate => (
                ActionKind::Escalate,
                format!(
                    "escalated by audit, risk score {} ({})",
                    report.score.value,
                    report.risk.label()
                ),
            ),
            Recommendation::Reject => {
                let reasons: Vec<&str> = report
                    .findings
                    .iter()
                    .filter(|f| f.blocking)
                    .map(|f| f.description.as_str())
                    .collect();
                (
                    ActionKind::Reject,
                    format!("rejected by audit: {}", reasons.join("; ")),
                )
            }
        };

        // blocking findings stay pinned to the rejected trail as the record
        // of why; escalation and approval leave only the report copy, so an
        // escalated document can still be modified and re-validated
        if report.recommendation == Recommendation::Reject {
            let pinned: Vec<AuditFinding> = report
                .findings
                .iter()
                .filter(|f| f.severity >= Severity::Warning)
                .cloned()
                .collect();
            trail.record_findings(pinned);
        }

        let entry = DecisionLogEntry::new(
            trail.document_id.clone(),
            actor.id.clone(),
            role,
            actor.bureau,
            action,
            details,
            TimeStamp::new(),
        )?;
        trail.append(entry);
        trail.save_to_db(&self.instance)?;

        Ok((trail, report))
    }

    /// Reject a document outright, independent of the audit
    pub fn reject_document(
        &self,
        document_id: &str,
        actor: &Actor,
        reason: &str,
    ) -> anyhow::Result<DecisionTrail> {
        self.append_gated(document_id, actor, ActionKind::Reject, reason)
    }

    /// Escalate a document to the next approval tier
    pub fn escalate_document(
        &self,
        document_id: &str,
        actor: &Actor,
        reason: &str,
    ) -> anyhow::Result<DecisionTrail> {
        self.append_gated(document_id, actor, ActionKind::Escalate, reason)
    }

    /// Send a document back for correction
    pub fn request_correction(
        &self,
        document_id: &str,
        actor: &Actor,
        reason: &str,
    ) -> anyhow::Result<DecisionTrail> {
        self.append_gated(document_id, actor, ActionKind::RequestCorrection, reason)
    }

    /// Pin findings to the document and mark it anomalous
    pub fn flag_anomaly(
        &self,
        document_id: &str,
        actor: &Actor,
        findings: Vec<AuditFinding>,
    ) -> anyhow::Result<DecisionTrail> {
        let mut trail = self.decision_trail(document_id)?;
        Self::ensure_open(&trail)?;
        let activity = trail.activity.clone();
        let role = self.gate(&activity, actor)?;

        let details = format!("{} finding(s) flagged", findings.len());
        trail.record_findings(findings);

        let entry = DecisionLogEntry::new(
            trail.document_id.clone(),
            actor.id.clone(),
            role,
            actor.bureau,
            ActionKind::FlagAnomaly,
            details,
            TimeStamp::new(),
        )?;
        trail.append(entry);
        trail.save_to_db(&self.instance)?;

        Ok(trail)
    }

    /// Place a document under audit
    pub fn require_audit(
        &self,
        document_id: &str,
        actor: &Actor,
        reason: &str,
    ) -> anyhow::Result<DecisionTrail> {
        self.append_gated(document_id, actor, ActionKind::RequireAudit, reason)
    }

    /// Mark all pinned findings resolved and return the document to pending.
    /// Only valid from anomaly or audit status.
    pub fn resolve_findings(
        &self,
        document_id: &str,
        actor: &Actor,
    ) -> anyhow::Result<DecisionTrail> {
        let mut trail = self.decision_trail(document_id)?;
        let status = trail.current_status();
        if !matches!(
            status,
            DocumentStatus::AnomalyDetected | DocumentStatus::AuditRequired
        ) {
            return Err(ApprovalError::NotResolvable(status).into());
        }
        let activity = trail.activity.clone();
        let role = self.gate(&activity, actor)?;

        let details = format!("{} finding(s) resolved", trail.unresolved_findings());
        trail.resolve_findings();

        let entry = DecisionLogEntry::new(
            trail.document_id.clone(),
            actor.id.clone(),
            role,
            actor.bureau,
            ActionKind::ResolveFindings,
            details,
            TimeStamp::new(),
        )?;
        trail.append(entry);
        trail.save_to_db(&self.instance)?;

        Ok(trail)
    }

    /// Replace the document contents (requires re-validation)
    pub fn modify_document(
        &self,
        document_id: &str,
        document: Document,
        actor: &Actor,
    ) -> anyhow::Result<DecisionTrail> {
        let mut trail = self.decision_trail(document_id)?;
        Self::ensure_open(&trail)?;
        let activity = trail.activity.clone();
        let role = self.gate(&activity, actor)?;

        let (details_hash, details_cbor) = document.validate_and_finalise()?;

        let entry = DecisionLogEntry::new(
            trail.document_id.clone(),
            actor.id.clone(),
            role,
            actor.bureau,
            ActionKind::Modify {
                details_hash: details_hash.clone(),
            },
            "contents modified, validation reset".to_string(),
            TimeStamp::new(),
        )?;
        trail.append(entry);

        let mut batch = Batch::default();
        batch.insert(details_hash.as_bytes(), details_cbor);
        batch.insert(trail.document_id.as_bytes(), minicbor::to_vec(&trail)?);
        self.instance.apply_batch(batch)?;

        Ok(trail)
    }

    fn append_gated(
        &self,
        document_id: &str,
        actor: &Actor,
        action: ActionKind,
        details: &str,
    ) -> anyhow::Result<DecisionTrail> {
        let mut trail = self.decision_trail(document_id)?;
        Self::ensure_open(&trail)?;
        let activity = trail.activity.clone();
        let role = self.gate(&activity, actor)?;

        let entry = DecisionLogEntry::new(
            trail.document_id.clone(),
            actor.id.clone(),
            role,
            actor.bureau,
            action,
            details.to_string(),
            TimeStamp::new(),
        )?;
        trail.append(entry);
        trail.save_to_db(&self.instance)?;

        Ok(trail)
    }
}

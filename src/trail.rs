//! Append-only decision log and status derivation
//!
//! The trail is the single source of truth for document status: status is
//! derived by folding the entries, never stored or mutated directly, so
//! read-only views cannot corrupt it.
use chrono::Utc;
use sled::Db;

use super::audit::AuditFinding;
use super::document::TimeStamp;
use super::error::ApprovalError;
use super::raci::Bureau;
use super::utils;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Eq, PartialEq)]
pub enum ActionKind {
    #[n(0)]
    Submit {
        #[n(0)]
        details_hash: String, // hash of the finalised document contents
    },
    #[n(1)]
    Validate,
    #[n(2)]
    Reject,
    #[n(3)]
    Escalate,
    #[n(4)]
    RequestCorrection,
    #[n(5)]
    FlagAnomaly,
    #[n(6)]
    RequireAudit,
    #[n(7)]
    ResolveFindings,
    #[n(8)]
    Modify {
        #[n(0)]
        details_hash: String,
    },
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, Eq, PartialEq)]
pub enum DocumentStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    Validated,
    #[n(2)]
    Rejected,
    #[n(3)]
    CorrectionRequested,
    #[n(4)]
    AnomalyDetected,
    #[n(5)]
    AuditRequired,
    #[n(6)]
    Escalated,
}

impl DocumentStatus {
    /// Validated and Rejected end the workflow instance.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DocumentStatus::Validated | DocumentStatus::Rejected)
    }
}

/// One immutable record of a validation action. The fingerprint is the
/// sha256 digest of the CBOR encoding of every other field; `entry_id` is a
/// fresh uuid7 so two entries never share a preimage even at equal
/// timestamps.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Eq, PartialEq)]
pub struct DecisionLogEntry {
    #[n(0)]
    pub entry_id: String,
    #[n(1)]
    pub document_id: String,
    #[n(2)]
    pub actor_id: String,
    #[n(3)]
    pub actor_role: String, // RACI letter resolved at action time, or "N/A"
    #[n(4)]
    pub bureau: Bureau,
    #[n(5)]
    pub action: ActionKind,
    #[n(6)]
    pub details: String,
    #[n(7)]
    pub timestamp: TimeStamp<Utc>,
    #[n(8)]
    pub fingerprint: String,
}

impl DecisionLogEntry {
    pub fn new(
        document_id: String,
        actor_id: String,
        actor_role: String,
        bureau: Bureau,
        action: ActionKind,
        details: String,
        timestamp: TimeStamp<Utc>,
    ) -> anyhow::Result<Self> {
        let mut entry = Self {
            entry_id: utils::new_uuid_to_bech32("entry_")?,
            document_id,
            actor_id,
            actor_role,
            bureau,
            action,
            details,
            timestamp,
            fingerprint: String::new(),
        };

        let preimage = minicbor::to_vec(&entry)?;
        entry.fingerprint = sha256::digest(&preimage);

        Ok(entry)
    }

    /// Recompute the fingerprint and compare, detecting in-session tampering.
    pub fn verify_fingerprint(&self) -> anyhow::Result<bool> {
        let mut unstamped = self.clone();
        unstamped.fingerprint = String::new();

        let preimage = minicbor::to_vec(&unstamped)?;
        Ok(sha256::digest(&preimage) == self.fingerprint)
    }
}

/// The decision trail for one document: its append-only entry log plus any
/// findings currently pinned to it. Entries are only ever appended.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Eq, PartialEq)]
pub struct DecisionTrail {
    #[n(0)]
    pub document_id: String,
    /// RACI activity governing actions on this document.
    #[n(1)]
    pub activity: String,
    #[n(2)]
    entries: Vec<DecisionLogEntry>,
    #[n(3)]
    findings: Vec<AuditFinding>,
}

impl DecisionTrail {
    pub fn new(document_id: String, activity: String) -> Self {
        Self {
            document_id,
            activity,
            entries: vec![],
            findings: vec![],
        }
    }

    pub fn append(&mut self, entry: DecisionLogEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[DecisionLogEntry] {
        &self.entries
    }

    /// Derive the current lifecycle status by folding the entry log. Entries
    /// recorded after a terminal status never change the derivation.
    pub fn current_status(&self) -> DocumentStatus {
        let mut status = DocumentStatus::Pending;

        for entry in &self.entries {
            if status.is_terminal() {
                break;
            }
            status = match &entry.action {
                ActionKind::Submit { .. }
                | ActionKind::Modify { .. }
                | ActionKind::ResolveFindings => DocumentStatus::Pending,
                ActionKind::Validate => DocumentStatus::Validated,
                ActionKind::Reject => DocumentStatus::Rejected,
                ActionKind::Escalate => DocumentStatus::Escalated,
                ActionKind::RequestCorrection => DocumentStatus::CorrectionRequested,
                ActionKind::FlagAnomaly => DocumentStatus::AnomalyDetected,
                ActionKind::RequireAudit => DocumentStatus::AuditRequired,
            };
        }

        status
    }

    pub fn is_terminal(&self) -> bool {
        self.current_status().is_terminal()
    }

    /// Hash of the most recently submitted or modified document contents.
    pub fn latest_details_hash(&self) -> Option<&str> {
        self.entries.iter().rev().find_map(|entry| match &entry.action {
            ActionKind::Submit { details_hash } | ActionKind::Modify { details_hash } => {
                Some(details_hash.as_str())
            }
            _ => None,
        })
    }

    pub fn record_findings(&mut self, findings: Vec<AuditFinding>) {
        self.findings.extend(findings);
    }

    pub fn findings(&self) -> &[AuditFinding] {
        &self.findings
    }

    pub fn unresolved_findings(&self) -> usize {
        self.findings.iter().filter(|f| !f.resolved).count()
    }

    pub fn resolve_findings(&mut self) {
        for finding in &mut self.findings {
            finding.resolved = true;
        }
    }

    /// Load a trail from the database by document id
    pub fn load_from_db(db: &Db, document_id: &str) -> anyhow::Result<Self> {
        let bytes = db
            .get(document_id.as_bytes())?
            .ok_or_else(|| ApprovalError::UnknownDocument(document_id.to_string()))?;

        Ok(minicbor::decode(&bytes)?)
    }

    /// Persist the trail keyed by document id
    pub fn save_to_db(&self, db: &Db) -> anyhow::Result<()> {
        db.insert(self.document_id.as_bytes(), minicbor::to_vec(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(action: ActionKind) -> DecisionLogEntry {
        DecisionLogEntry::new(
            "doc_1".into(),
            "user_1".into(),
            "R".into(),
            Bureau::Bmo,
            action,
            "test".into(),
            TimeStamp::new(),
        )
        .unwrap()
    }

    #[test]
    fn fingerprint_round_trips() {
        let entry = entry(ActionKind::Validate);

        assert!(!entry.fingerprint.is_empty());
        assert!(entry.verify_fingerprint().unwrap());
    }

    #[test]
    fn tampered_entry_fails_verification() {
        let mut entry = entry(ActionKind::Validate);
        entry.details = "rewritten".into();

        assert!(!entry.verify_fingerprint().unwrap());
    }

    #[test]
    fn trail_cbor_roundtrip() {
        let mut trail = DecisionTrail::new("doc_1".into(), "validation_bc".into());
        trail.append(entry(ActionKind::Submit {
            details_hash: "abc".into(),
        }));
        trail.append(entry(ActionKind::Escalate));

        let encoded = minicbor::to_vec(&trail).unwrap();
        let decoded: DecisionTrail = minicbor::decode(&encoded).unwrap();

        assert_eq!(trail, decoded);
    }

    #[test]
    fn resolve_findings_returns_to_pending() {
        let mut trail = DecisionTrail::new("doc_1".into(), "validation_bc".into());
        trail.append(entry(ActionKind::Submit {
            details_hash: "abc".into(),
        }));
        trail.append(entry(ActionKind::FlagAnomaly));
        assert_eq!(trail.current_status(), DocumentStatus::AnomalyDetected);

        trail.append(entry(ActionKind::ResolveFindings));
        assert_eq!(trail.current_status(), DocumentStatus::Pending);
    }
}

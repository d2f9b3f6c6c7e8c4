use super::trail::DocumentStatus;

#[derive(thiserror::Error, Debug)]
pub enum DocumentError {
    #[error("document id is not set")]
    MissingId,
    #[error("document kind is not set")]
    MissingKind,
    #[error("amount is not set")]
    MissingAmount,
    #[error("amount is set to zero")]
    ZeroAmount,
    #[error("currency is not set")]
    MissingCurrency,
    #[error("issuing bureau is not set")]
    MissingBureau,
    #[error("project reference is not set")]
    MissingProjectRef,
    #[error("{0} is not set")]
    MissingDate(String),
    #[error("Created Date <= Due Date failed")]
    InvalidDates,
}

#[derive(thiserror::Error, Debug)]
pub enum ApprovalError {
    #[error("bureau {bureau} holds RACI role {role} for {activity}, action denied")]
    PermissionDenied {
        activity: String,
        bureau: String,
        role: String,
    },
    #[error("document is in terminal status {0:?}")]
    TerminalStatus(DocumentStatus),
    #[error("document carries {0} unresolved finding(s)")]
    UnresolvedFindings(usize),
    #[error("findings can only be resolved from anomaly or audit status, current: {0:?}")]
    NotResolvable(DocumentStatus),
    #[error("unknown document: {0}")]
    UnknownDocument(String),
    #[error("document contents missing for hash {0}")]
    MissingContents(String),
}

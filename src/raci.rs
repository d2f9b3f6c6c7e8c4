//! RACI permission gate over (activity, bureau) pairs
use std::collections::HashMap;
use std::fmt;

/// Organizational units of the back office.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Bureau {
    /// Bureau des Marchés et Opérations
    #[n(0)]
    Bmo,
    /// Bureau Financier
    #[n(1)]
    Bf,
    /// Bureau Technique
    #[n(2)]
    Bt,
    /// Bureau des Affaires Juridiques
    #[n(3)]
    Baj,
    /// Direction Générale
    #[n(4)]
    Dg,
}

impl Bureau {
    pub fn code(&self) -> &'static str {
        match self {
            Bureau::Bmo => "BMO",
            Bureau::Bf => "BF",
            Bureau::Bt => "BT",
            Bureau::Baj => "BAJ",
            Bureau::Dg => "DG",
        }
    }
}

impl fmt::Display for Bureau {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RaciRole {
    Responsible,
    Accountable,
    Consulted,
    Informed,
}

impl RaciRole {
    pub fn letter(&self) -> &'static str {
        match self {
            RaciRole::Responsible => "R",
            RaciRole::Accountable => "A",
            RaciRole::Consulted => "C",
            RaciRole::Informed => "I",
        }
    }
    /// Only R and A confer validation rights.
    pub fn grants_validation(&self) -> bool {
        matches!(self, RaciRole::Responsible | RaciRole::Accountable)
    }
}

/// Outcome of a permission lookup. `role` is the resolved letter, or "N/A"
/// when the pair has no entry.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PermissionDecision {
    pub allowed: bool,
    pub role: String,
}

/// The RACI matrix: at most one role per (activity, bureau) pair, enforced
/// by the map keying. Lookups are pure and fail closed.
#[derive(Debug, Clone, Default)]
pub struct RaciTable {
    entries: HashMap<(String, Bureau), RaciRole>,
}

impl RaciTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a role for the pair, replacing any prior assignment.
    pub fn assign(&mut self, activity: &str, bureau: Bureau, role: RaciRole) {
        self.entries.insert((activity.to_string(), bureau), role);
    }

    pub fn role_of(&self, activity: &str, bureau: Bureau) -> Option<RaciRole> {
        self.entries.get(&(activity.to_string(), bureau)).copied()
    }

    /// Look up whether `bureau` may validate under `activity`. An unknown
    /// activity, or an empty activity string, is a normal negative result.
    pub fn check(&self, activity: &str, bureau: Bureau) -> PermissionDecision {
        if activity.trim().is_empty() {
            return PermissionDecision {
                allowed: false,
                role: "N/A".into(),
            };
        }

        match self.role_of(activity, bureau) {
            Some(role) => PermissionDecision {
                allowed: role.grants_validation(),
                role: role.letter().into(),
            },
            None => PermissionDecision {
                allowed: false,
                role: "N/A".into(),
            },
        }
    }

    /// The standard back-office matrix for the five validation workflows.
    pub fn default_btp() -> Self {
        use Bureau::*;
        use RaciRole::*;

        let mut table = Self::new();

        table.assign("validation_bc", Bmo, Responsible);
        table.assign("validation_bc", Dg, Accountable);
        table.assign("validation_bc", Bf, Consulted);
        table.assign("validation_bc", Bt, Informed);

        table.assign("validation_facture", Bf, Responsible);
        table.assign("validation_facture", Dg, Accountable);
        table.assign("validation_facture", Bmo, Consulted);

        table.assign("validation_avenant", Baj, Responsible);
        table.assign("validation_avenant", Dg, Accountable);
        table.assign("validation_avenant", Bmo, Consulted);

        table.assign("validation_contrat", Baj, Responsible);
        table.assign("validation_contrat", Dg, Accountable);
        table.assign("validation_contrat", Bf, Consulted);

        table.assign("validation_paiement", Bf, Responsible);
        table.assign("validation_paiement", Dg, Accountable);
        table.assign("validation_paiement", Bmo, Informed);

        table
    }
}

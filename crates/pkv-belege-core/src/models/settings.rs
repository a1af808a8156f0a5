use serde::{Deserialize, Serialize};

/// User settings ("Einstellungen").
///
/// Fields are optional so that a backup carrying only one threshold can be
/// merged over the live settings without clobbering the other.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Annual deductible ("Selbstbeteiligung") in EUR.
    #[serde(
        rename = "selbstbeteiligung",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub deductible_threshold: Option<f64>,
    /// Premium refund forfeited by submitting ("Beitragsrückerstattung") in EUR.
    #[serde(
        rename = "beitragsrueckerstattung",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub reimbursement_threshold: Option<f64>,
}

impl Settings {
    pub fn new(deductible: f64, reimbursement: f64) -> Self {
        Self {
            deductible_threshold: Some(deductible),
            reimbursement_threshold: Some(reimbursement),
        }
    }

    pub fn deductible(&self) -> f64 {
        self.deductible_threshold.unwrap_or(0.0)
    }

    pub fn reimbursement(&self) -> f64 {
        self.reimbursement_threshold.unwrap_or(0.0)
    }

    /// Shallow merge: fields present in `incoming` win, the rest are kept.
    pub fn merged_with(&self, incoming: &Settings) -> Settings {
        Settings {
            deductible_threshold: incoming.deductible_threshold.or(self.deductible_threshold),
            reimbursement_threshold: incoming
                .reimbursement_threshold
                .or(self.reimbursement_threshold),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in [
            ("selbstbeteiligung", self.deductible_threshold),
            ("beitragsrueckerstattung", self.reimbursement_threshold),
        ] {
            if let Some(v) = value {
                if !v.is_finite() || v < 0.0 {
                    return Err(format!("{} must be a non-negative amount", name));
                }
            }
        }
        Ok(())
    }
}

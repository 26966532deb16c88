use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// Conversation stage of a prospect. Drives which filters may activate and
/// how the final reply is phrased.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    NewProspect,
    Conversation,
    Qualified,
    NotQualified,
    Scheduled,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::NewProspect,
        Stage::Conversation,
        Stage::Qualified,
        Stage::NotQualified,
        Stage::Scheduled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::NewProspect => "new-prospect",
            Stage::Conversation => "conversation",
            Stage::Qualified => "qualified",
            Stage::NotQualified => "not-qualified",
            Stage::Scheduled => "scheduled",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "new-prospect" => Ok(Stage::NewProspect),
            "conversation" => Ok(Stage::Conversation),
            "qualified" => Ok(Stage::Qualified),
            "not-qualified" => Ok(Stage::NotQualified),
            "scheduled" => Ok(Stage::Scheduled),
            other => Err(DomainError::UnknownStageLabel(other.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::Stage;
    use crate::errors::DomainError;

    #[test]
    fn labels_round_trip() {
        for stage in Stage::ALL {
            assert_eq!(Stage::from_str(stage.as_str()).expect("known label"), stage);
        }
    }

    #[test]
    fn unknown_label_is_an_error() {
        let error = Stage::from_str("warm-lead").expect_err("must reject");
        assert_eq!(error, DomainError::UnknownStageLabel("warm-lead".to_owned()));
    }

    #[test]
    fn serde_uses_kebab_labels() {
        let json = serde_json::to_string(&Stage::NotQualified).expect("serialize");
        assert_eq!(json, "\"not-qualified\"");
    }
}

use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("unknown stage label `{0}`")]
    UnknownStageLabel(String),
    #[error("unknown intent label `{0}`")]
    UnknownIntentLabel(String),
    #[error("unknown file type `{0}`")]
    UnknownFileType(String),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[cfg(test)]
mod tests {
    use crate::errors::{ApplicationError, DomainError};

    #[test]
    fn domain_errors_convert_into_application_errors() {
        let error: ApplicationError =
            DomainError::UnknownStageLabel("frozen".to_owned()).into();
        assert!(matches!(error, ApplicationError::Domain(_)));
        assert_eq!(error.to_string(), "unknown stage label `frozen`");
    }

    #[test]
    fn persistence_error_reports_cause() {
        let error = ApplicationError::Persistence("database lock timeout".to_owned());
        assert_eq!(error.to_string(), "persistence failure: database lock timeout");
    }
}

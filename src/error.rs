use thiserror::Error;

/// Failures raised by the draft and marks-entry reconcilers.
#[derive(Debug, Error, PartialEq)]
pub enum ObeError {
    #[error("{0}")]
    BadParams(String),
    #[error("{what} not found: {id}")]
    NotFound { what: &'static str, id: String },
    #[error("unknown course outcome: {0}")]
    UnknownCo(String),
    #[error("course outcome id already in use: {0}")]
    DuplicateCo(String),
    #[error("{0} does not use a CO mark distribution")]
    MappingNotApplicable(String),
    #[error("{0} is not a valid improvement target")]
    BadTarget(String),
    #[error("student {0} is not mapped to this improvement test")]
    NotMapped(String),
    #[error("row for student {0} is locked; unlock it before editing")]
    RowLocked(String),
    #[error("compare marks for student {0} before overriding")]
    CompareFirst(String),
    #[error("no improvement marks for student {0}")]
    NoImprovement(String),
    #[error("No students found in the list. Please add students first.")]
    NoStudents,
    #[error("configuration has {} error(s)", .0.len())]
    Validation(Vec<String>),
}

impl ObeError {
    pub fn code(&self) -> &'static str {
        match self {
            ObeError::BadParams(_) | ObeError::DuplicateCo(_) => "bad_params",
            ObeError::NotFound { .. } => "not_found",
            ObeError::UnknownCo(_) => "unknown_co",
            ObeError::MappingNotApplicable(_) => "mapping_not_applicable",
            ObeError::BadTarget(_) => "bad_target",
            ObeError::NotMapped(_) => "not_mapped",
            ObeError::RowLocked(_) => "row_locked",
            ObeError::CompareFirst(_) => "compare_first",
            ObeError::NoImprovement(_) => "no_improvement",
            ObeError::NoStudents => "no_students",
            ObeError::Validation(_) => "validation_failed",
        }
    }

    pub fn not_found(what: &'static str, id: impl Into<String>) -> Self {
        ObeError::NotFound {
            what,
            id: id.into(),
        }
    }
}

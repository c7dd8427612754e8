use serde::Serialize;
use std::fmt;

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticCategory {
    /// The applicant was left out of the report.
    Error,
    /// A document was discarded; its applicant may still be reported.
    Duplicate,
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// An applicant does not have the number of documents the policy asks for.
    CardinalityMismatch {
        document_id: String,
        observed: usize,
        expected: usize,
        interviewers: Vec<String>,
    },
    /// A score could not be read as an integer.
    InvalidScore {
        document_id: String,
        source_id: String,
        value: String,
    },
    /// The two scores add up past the integer range.
    TotalOverflow { document_id: String },
    Duplicate {
        source_id: String,
        document_id: String,
        interviewer: String,
        first_source_id: String,
    },
}

impl Diagnostic {
    pub fn category(&self) -> DiagnosticCategory {
        match self {
            Diagnostic::CardinalityMismatch { .. }
            | Diagnostic::InvalidScore { .. }
            | Diagnostic::TotalOverflow { .. } => DiagnosticCategory::Error,
            Diagnostic::Duplicate { .. } => DiagnosticCategory::Duplicate,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::CardinalityMismatch { document_id, observed, expected, interviewers } => {
                write!(f, "ID {} has {} file(s) instead of {}", document_id, observed, expected)?;
                if observed == expected {
                    write!(f, " from different interviewers")?;
                }
                if !interviewers.is_empty() {
                    write!(f, " (interviewers: {})", interviewers.join(", "))?;
                }
                Ok(())
            }
            Diagnostic::InvalidScore { document_id, source_id, value } => write!(
                f,
                "ID {}: score '{}' in {} is not a whole number",
                document_id, value, source_id
            ),
            Diagnostic::TotalOverflow { document_id } => {
                write!(f, "ID {}: the scores are too large to add up", document_id)
            }
            Diagnostic::Duplicate { source_id, document_id, interviewer, first_source_id } => write!(
                f,
                "{} skipped: ID {} by {} was already read from {}",
                source_id, document_id, interviewer, first_source_id
            ),
        }
    }
}

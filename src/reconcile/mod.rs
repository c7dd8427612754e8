pub mod diagnostics;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::extraction::SourcedRecord;
pub use diagnostics::{Diagnostic, DiagnosticCategory};

/// How many documents make up one applicant's complete record.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExpectedCount {
    One,
    Two,
}

impl ExpectedCount {
    pub fn get(self) -> usize {
        match self {
            ExpectedCount::One => 1,
            ExpectedCount::Two => 2,
        }
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum PolicyError {
    #[error("expected count must be 1 or 2, got {0}")]
    ExpectedCount(u8),
}

impl TryFrom<u8> for ExpectedCount {
    type Error = PolicyError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(ExpectedCount::One),
            2 => Ok(ExpectedCount::Two),
            other => Err(PolicyError::ExpectedCount(other)),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Policy {
    pub expected_count: ExpectedCount,
    /// Require the documents of one applicant to come from different interviewers.
    pub distinguish_by_interviewer: bool,
}

/// Keys under which an accepted record is remembered. A later record sharing
/// any of them is a duplicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DedupKey<'a> {
    Source(&'a str),
    Interviewer { applicant: &'a str, interviewer: &'a str },
}

impl<'a> DedupKey<'a> {
    pub fn for_record(entry: &'a SourcedRecord, policy: &Policy) -> Vec<DedupKey<'a>> {
        let mut keys = vec![DedupKey::Source(&entry.source_id)];
        if policy.distinguish_by_interviewer {
            keys.push(DedupKey::Interviewer {
                applicant: &entry.record.document_id,
                interviewer: &entry.record.interviewer,
            });
        }
        keys
    }
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct InterviewerSlot {
    pub score: i64,
    pub interviewer: String,
}

/// One merged line of the report.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct ReportRow {
    pub code: String,
    pub modality: String,
    pub program: String,
    pub document_id: String,
    pub slots: Vec<InterviewerSlot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<i64>,
}

impl ReportRow {
    pub fn headers(policy: &Policy) -> Vec<String> {
        let mut headers: Vec<String> = ["codigo", "modalidad", "programa", "documento"]
            .iter()
            .map(|h| h.to_string())
            .collect();

        let slots = policy.expected_count.get();
        for n in 1..=slots {
            headers.push(format!("Nota Entrevistador {}", n));
            headers.push(format!("Nombre Entrevistador {}", n));
        }
        if slots == 2 {
            headers.push("Total".to_string());
        }
        headers
    }

    pub fn cells(&self) -> Vec<String> {
        let mut cells = vec![
            self.code.clone(),
            self.modality.clone(),
            self.program.clone(),
            self.document_id.clone(),
        ];
        for slot in &self.slots {
            cells.push(slot.score.to_string());
            cells.push(slot.interviewer.clone());
        }
        if let Some(total) = self.total {
            cells.push(total.to_string());
        }
        cells
    }
}

#[derive(Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Reconciliation {
    pub rows: Vec<ReportRow>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Reconciliation {
    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.category() == DiagnosticCategory::Error)
    }

    pub fn duplicates(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.category() == DiagnosticCategory::Duplicate)
    }
}

/// Groups a batch by applicant, drops duplicates, checks each group against
/// the policy and merges the valid ones into report rows.
///
/// Rows follow the order in which each applicant ID was first seen.
/// Diagnostics list duplicates in input order, then group problems in the same
/// first-seen order.
pub fn reconcile(records: &[SourcedRecord], policy: &Policy) -> Reconciliation {
    let mut groups: Vec<(&str, Vec<&SourcedRecord>)> = Vec::new();
    let mut group_index: HashMap<&str, usize> = HashMap::new();
    let mut accepted: HashMap<DedupKey<'_>, &str> = HashMap::new();
    let mut diagnostics = Vec::new();

    for entry in records {
        let keys = DedupKey::for_record(entry, policy);

        if let Some(first) = keys.iter().find_map(|key| accepted.get(key).copied()) {
            tracing::warn!("Duplicate document {} (already read from {})", entry.source_id, first);
            diagnostics.push(Diagnostic::Duplicate {
                source_id: entry.source_id.clone(),
                document_id: entry.record.document_id.clone(),
                interviewer: entry.record.interviewer.clone(),
                first_source_id: first.to_string(),
            });
            continue;
        }

        for key in keys {
            accepted.insert(key, entry.source_id.as_str());
        }

        let identity = entry.record.document_id.as_str();
        let idx = *group_index.entry(identity).or_insert_with(|| {
            groups.push((identity, Vec::new()));
            groups.len() - 1
        });
        groups[idx].1.push(entry);
    }

    let mut rows = Vec::new();
    for (identity, mut members) in groups {
        if let Err(diagnostic) = validate(identity, &members, policy) {
            tracing::warn!("{}", diagnostic);
            diagnostics.push(diagnostic);
            continue;
        }

        if policy.distinguish_by_interviewer {
            members.sort_by(|a, b| a.record.interviewer.cmp(&b.record.interviewer));
        }

        match merge(identity, &members) {
            Ok(row) => rows.push(row),
            Err(diagnostic) => {
                tracing::warn!("{}", diagnostic);
                diagnostics.push(diagnostic);
            }
        }
    }

    tracing::debug!("Reconciled {} records into {} rows ({} diagnostics)", records.len(), rows.len(), diagnostics.len());
    Reconciliation { rows, diagnostics }
}

fn validate(identity: &str, members: &[&SourcedRecord], policy: &Policy) -> Result<(), Diagnostic> {
    let expected = policy.expected_count.get();
    let distinct = match members {
        [a, b] => a.record.interviewer != b.record.interviewer,
        _ => true,
    };

    if members.len() == expected && (distinct || !policy.distinguish_by_interviewer) {
        return Ok(());
    }

    Err(Diagnostic::CardinalityMismatch {
        document_id: identity.to_string(),
        observed: members.len(),
        expected,
        interviewers: members.iter().map(|m| m.record.interviewer.clone()).collect(),
    })
}

fn merge(identity: &str, members: &[&SourcedRecord]) -> Result<ReportRow, Diagnostic> {
    let slots = members
        .iter()
        .map(|m| {
            let score = m.record.total_score.trim().parse::<i64>().map_err(|_| Diagnostic::InvalidScore {
                document_id: identity.to_string(),
                source_id: m.source_id.clone(),
                value: m.record.total_score.clone(),
            })?;
            Ok(InterviewerSlot {
                score,
                interviewer: m.record.interviewer.clone(),
            })
        })
        .collect::<Result<Vec<_>, Diagnostic>>()?;

    let total = match slots.as_slice() {
        [a, b] => Some(a.score.checked_add(b.score).ok_or_else(|| Diagnostic::TotalOverflow {
            document_id: identity.to_string(),
        })?),
        _ => None,
    };

    // validate() guarantees at least one member
    let first = &members[0].record;
    Ok(ReportRow {
        code: first.code.clone(),
        modality: first.modality.clone(),
        program: first.program.clone(),
        document_id: identity.to_string(),
        slots,
        total,
    })
}

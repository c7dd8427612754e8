pub mod source;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use self::source::{SourceError, TextSource};

/// Value stored for a field whose anchor line was never found.
pub const NOT_FOUND: &str = "No encontrado";
/// Interviewer name used when the document carries no interviewer label.
pub const UNKNOWN_INTERVIEWER: &str = "Desconocido";

/// The fixed set of labels read from an interview sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldLabel {
    Code,
    Modality,
    Program,
    DocumentId,
    TotalScore,
    Interviewer,
}

/// Literal text of each label as printed on the sheet, plus the marker that
/// precedes the national ID.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct FieldLabels {
    pub code: String,
    pub modality: String,
    pub program: String,
    pub document_id: String,
    pub total_score: String,
    pub interviewer: String,
    pub id_prefix: String,
}

impl Default for FieldLabels {
    fn default() -> Self {
        Self {
            code: "CODIGO".to_string(),
            modality: "MODALIDAD".to_string(),
            program: "PROGRAMA".to_string(),
            document_id: "DOCUMENTO".to_string(),
            total_score: "TOTAL".to_string(),
            interviewer: "ENTREVISTADOR".to_string(),
            id_prefix: "DNI N°".to_string(),
        }
    }
}

impl FieldLabels {
    pub fn literal(&self, label: FieldLabel) -> &str {
        match label {
            FieldLabel::Code => &self.code,
            FieldLabel::Modality => &self.modality,
            FieldLabel::Program => &self.program,
            FieldLabel::DocumentId => &self.document_id,
            FieldLabel::TotalScore => &self.total_score,
            FieldLabel::Interviewer => &self.interviewer,
        }
    }
}

/// Fields read from a single interview document.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ExtractedRecord {
    pub code: String,
    pub modality: String,
    pub program: String,
    pub document_id: String,
    pub total_score: String,
    pub interviewer: String,
}

/// Non-fatal findings raised while extracting a record.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractionWarning {
    /// The document field did not contain the expected ID marker; the raw value was kept.
    IdentityPrefixMissing { value: String },
}

impl std::fmt::Display for ExtractionWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractionWarning::IdentityPrefixMissing { value } => {
                write!(f, "no valid ID marker found in document field '{}'", value)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub record: ExtractedRecord,
    pub warnings: Vec<ExtractionWarning>,
}

/// A record tagged with the document it came from.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct SourcedRecord {
    pub source_id: String,
    pub record: ExtractedRecord,
}

/// A document that could not be read. The batch continues without it.
#[derive(thiserror::Error, Debug)]
#[error("failed to read {source_id}: {cause}")]
pub struct ExtractionFailure {
    pub source_id: String,
    #[source]
    pub cause: SourceError,
}

/// One document waiting to be read, as produced by staging.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StagedDocument {
    pub source_id: String,
    pub path: PathBuf,
}

/// Returns the trimmed line following the first line that contains `needle`.
fn value_after(lines: &[String], needle: &str) -> Option<String> {
    let anchor = lines.iter().position(|line| line.contains(needle))?;
    lines.get(anchor + 1).map(|value| value.trim().to_string())
}

fn field(lines: &[String], labels: &FieldLabels, label: FieldLabel) -> String {
    value_after(lines, labels.literal(label)).unwrap_or_else(|| NOT_FOUND.to_string())
}

/// Reads the labeled fields out of a document's text lines.
///
/// Every label resolves to the line right after its first anchor. Missing
/// anchors become [`NOT_FOUND`]; nothing here fails.
pub fn extract(lines: &[String], labels: &FieldLabels) -> Extraction {
    let mut warnings = Vec::new();

    let raw_id = field(lines, labels, FieldLabel::DocumentId);
    let prefix = labels.id_prefix.as_str();
    let document_id = if !prefix.is_empty() && raw_id.contains(prefix) {
        raw_id.replace(prefix, "").trim().to_string()
    } else {
        warnings.push(ExtractionWarning::IdentityPrefixMissing { value: raw_id.clone() });
        raw_id
    };

    let interviewer = value_after(lines, labels.literal(FieldLabel::Interviewer))
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| UNKNOWN_INTERVIEWER.to_string());

    let record = ExtractedRecord {
        code: field(lines, labels, FieldLabel::Code),
        modality: field(lines, labels, FieldLabel::Modality),
        program: field(lines, labels, FieldLabel::Program),
        document_id,
        total_score: field(lines, labels, FieldLabel::TotalScore),
        interviewer,
    };

    Extraction { record, warnings }
}

/// Reads one staged document and extracts its record.
pub fn extract_document(
    reader: &dyn TextSource,
    labels: &FieldLabels,
    document: &StagedDocument,
) -> Result<(SourcedRecord, Vec<ExtractionWarning>), ExtractionFailure> {
    let lines = reader.read_lines(&document.path).map_err(|cause| ExtractionFailure {
        source_id: document.source_id.clone(),
        cause,
    })?;

    let Extraction { record, warnings } = extract(&lines, labels);
    Ok((
        SourcedRecord {
            source_id: document.source_id.clone(),
            record,
        },
        warnings,
    ))
}

use futures::stream::{self, StreamExt};
use serde::{Serialize, Serializer};
use std::sync::Arc;

use crate::extraction::source::{SourceError, TextSource};
use crate::extraction::{self, ExtractionFailure, ExtractionWarning, FieldLabels, SourcedRecord, StagedDocument};
use crate::reconcile::{self, Policy, Reconciliation};
use crate::staging::StagedBatch;

/// Documents read concurrently on the blocking pool.
const MAX_IN_FLIGHT: usize = 4;

type Extracted = Result<(SourcedRecord, Vec<ExtractionWarning>), ExtractionFailure>;

#[derive(Serialize, Debug)]
pub struct BatchOutcome {
    pub policy: Policy,
    /// Documents that produced a record.
    pub records: usize,
    pub reconciliation: Reconciliation,
    #[serde(serialize_with = "failure_messages")]
    pub failures: Vec<ExtractionFailure>,
    pub warnings: Vec<(String, ExtractionWarning)>,
}

fn failure_messages<S: Serializer>(failures: &[ExtractionFailure], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(failures.iter().map(|f| f.to_string()))
}

/// Read every document. Results come back in input order; a failed or
/// panicked read only affects its own document.
pub async fn extract_all(
    documents: Vec<StagedDocument>,
    reader: Arc<dyn TextSource>,
    labels: Arc<FieldLabels>,
) -> Vec<Extracted> {
    stream::iter(documents)
        .map(|document| {
            let reader = reader.clone();
            let labels = labels.clone();
            async move {
                let source_id = document.source_id.clone();
                tracing::info!("Processing document: {}", source_id);
                tokio::task::spawn_blocking(move || extraction::extract_document(reader.as_ref(), &labels, &document))
                    .await
                    .unwrap_or_else(|e| {
                        tracing::error!("Extraction task for {} failed: {}", source_id, e);
                        Err(ExtractionFailure {
                            source_id,
                            cause: SourceError::Panicked,
                        })
                    })
            }
        })
        .buffered(MAX_IN_FLIGHT)
        .collect()
        .await
}

/// Extract and reconcile one staged batch. Staged files are removed once
/// the batch has been read.
pub async fn run_batch(
    batch: StagedBatch,
    reader: Arc<dyn TextSource>,
    labels: Arc<FieldLabels>,
    policy: Policy,
) -> BatchOutcome {
    tracing::info!("Starting batch of {} documents...", batch.documents.len());

    // The staging workspace stays alive until `batch` goes out of scope
    let mut failures = batch.rejected;
    let mut records = Vec::new();
    let mut warnings = Vec::new();

    for result in extract_all(batch.documents, reader, labels).await {
        match result {
            Ok((record, record_warnings)) => {
                for warning in record_warnings {
                    tracing::warn!("{}: {}", record.source_id, warning);
                    warnings.push((record.source_id.clone(), warning));
                }
                records.push(record);
            }
            Err(failure) => {
                tracing::error!("Error processing document: {}", failure);
                failures.push(failure);
            }
        }
    }

    let reconciliation = reconcile::reconcile(&records, &policy);
    tracing::info!(
        "Batch complete: {} rows, {} diagnostics, {} unreadable",
        reconciliation.rows.len(),
        reconciliation.diagnostics.len(),
        failures.len()
    );

    BatchOutcome {
        policy,
        records: records.len(),
        reconciliation,
        failures,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::source::DocumentReader;
    use crate::reconcile::{ExpectedCount, InterviewerSlot};
    use crate::staging;
    use std::path::{Path, PathBuf};

    const POLICY: Policy = Policy {
        expected_count: ExpectedCount::Two,
        distinguish_by_interviewer: true,
    };

    fn sheet(dir: &Path, name: &str, id: &str, total: &str, interviewer: &str) -> PathBuf {
        let path = dir.join(name);
        let text = format!(
            "FICHA DE ENTREVISTA\nCODIGO\n00175262\nMODALIDAD\nREGULAR\nPROGRAMA\nMEDICINA\nDOCUMENTO\nDNI N°{}\nENTREVISTADOR\n{}\nTOTAL\n{}\n",
            id, interviewer, total
        );
        std::fs::write(&path, text).unwrap();
        path
    }

    fn reader() -> Arc<dyn TextSource> {
        Arc::new(DocumentReader::new(false))
    }

    #[tokio::test]
    async fn test_end_to_end_batch() {
        let dir = tempfile::tempdir().unwrap();
        let inputs = vec![
            sheet(dir.path(), "doc1.txt", "60482615", "66", "A"),
            sheet(dir.path(), "doc2.txt", "60482615", "70", "B"),
        ];

        let batch = staging::stage(&inputs).unwrap();
        let outcome = run_batch(batch, reader(), Arc::new(FieldLabels::default()), POLICY).await;

        assert!(outcome.reconciliation.diagnostics.is_empty());
        assert!(outcome.failures.is_empty());
        assert!(outcome.warnings.is_empty());
        let rows = &outcome.reconciliation.rows;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].document_id, "60482615");
        assert_eq!(rows[0].slots[0], InterviewerSlot { score: 66, interviewer: "A".to_string() });
        assert_eq!(rows[0].slots[1], InterviewerSlot { score: 70, interviewer: "B".to_string() });
        assert_eq!(rows[0].total, Some(136));
    }

    #[tokio::test]
    async fn test_unreadable_document_does_not_stop_batch() {
        let dir = tempfile::tempdir().unwrap();
        let broken = dir.path().join("broken.pdf");
        std::fs::write(&broken, b"garbage").unwrap();
        let inputs = vec![
            sheet(dir.path(), "a.txt", "1", "10", "A"),
            broken,
            sheet(dir.path(), "b.txt", "1", "20", "B"),
        ];

        let batch = staging::stage(&inputs).unwrap();
        let outcome = run_batch(batch, reader(), Arc::new(FieldLabels::default()), POLICY).await;

        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].source_id, "broken.pdf");
        assert_eq!(outcome.records, 2);
        assert_eq!(outcome.reconciliation.rows.len(), 1);
        assert_eq!(outcome.reconciliation.rows[0].total, Some(30));
    }

    #[tokio::test]
    async fn test_results_keep_input_order() {
        let dir = tempfile::tempdir().unwrap();
        let documents: Vec<StagedDocument> = (0..10)
            .map(|i| {
                let name = format!("{:02}.txt", i);
                StagedDocument {
                    path: sheet(dir.path(), &name, &i.to_string(), "1", "A"),
                    source_id: name,
                }
            })
            .collect();

        let results = extract_all(documents, reader(), Arc::new(FieldLabels::default())).await;
        let ids: Vec<_> = results.into_iter().map(|r| r.unwrap().0.record.document_id).collect();

        assert_eq!(ids, (0..10).map(|i| i.to_string()).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_missing_prefix_is_reported_as_warning() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.txt");
        std::fs::write(&path, "DOCUMENTO\n60482615\nTOTAL\n12\n").unwrap();

        let batch = staging::stage(&[path]).unwrap();
        let policy = Policy {
            expected_count: ExpectedCount::One,
            distinguish_by_interviewer: false,
        };
        let outcome = run_batch(batch, reader(), Arc::new(FieldLabels::default()), policy).await;

        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(outcome.warnings[0].0, "plain.txt");
        assert_eq!(outcome.reconciliation.rows[0].document_id, "60482615");
    }

    #[tokio::test]
    async fn test_outcome_serializes_failures_as_messages() {
        let dir = tempfile::tempdir().unwrap();
        let batch = staging::stage(&[dir.path().join("missing.pdf")]).unwrap();
        let outcome = run_batch(batch, reader(), Arc::new(FieldLabels::default()), POLICY).await;

        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["failures"][0], "failed to read missing.pdf: I/O error: no such file");
        assert_eq!(json["records"], 0);
    }

    #[tokio::test]
    async fn test_same_file_name_from_two_folders_forms_a_pair() {
        let dir = tempfile::tempdir().unwrap();
        let (dr_a, dr_b) = (dir.path().join("dr_a"), dir.path().join("dr_b"));
        std::fs::create_dir_all(&dr_a).unwrap();
        std::fs::create_dir_all(&dr_b).unwrap();
        let inputs = vec![
            sheet(&dr_a, "entrevista-60482615.txt", "60482615", "66", "A"),
            sheet(&dr_b, "entrevista-60482615.txt", "60482615", "70", "B"),
        ];

        let batch = staging::stage(&inputs).unwrap();
        let outcome = run_batch(batch, reader(), Arc::new(FieldLabels::default()), POLICY).await;

        assert!(outcome.reconciliation.diagnostics.is_empty());
        assert_eq!(outcome.reconciliation.rows.len(), 1);
        assert_eq!(outcome.reconciliation.rows[0].total, Some(136));
    }

    #[tokio::test]
    async fn test_file_reached_through_two_inputs_is_a_duplicate() {
        let dir = tempfile::tempdir().unwrap();
        let uploads = dir.path().join("uploads");
        std::fs::create_dir_all(&uploads).unwrap();
        let loose = sheet(&uploads, "a.txt", "60482615", "66", "A");
        let policy = Policy {
            expected_count: ExpectedCount::One,
            distinguish_by_interviewer: false,
        };

        let batch = staging::stage(&[uploads, loose]).unwrap();
        let outcome = run_batch(batch, reader(), Arc::new(FieldLabels::default()), policy).await;

        assert_eq!(outcome.records, 2);
        assert_eq!(outcome.reconciliation.rows.len(), 1);
        assert_eq!(outcome.reconciliation.duplicates().count(), 1);
        assert_eq!(outcome.reconciliation.errors().count(), 0);
    }
}

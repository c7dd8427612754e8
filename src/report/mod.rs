pub mod display;
pub mod xlsx;

use anyhow::{Context, Result};
use csv::Writer;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::reconcile::{Policy, ReportRow};

/// Excel caps worksheet names at 31 characters.
pub const MAX_SHEET_NAME: usize = 31;
const MAX_FILE_STEM: usize = 200;

#[derive(Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq, Debug, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ReportFormat {
    /// One workbook, one worksheet per table
    #[default]
    Xlsx,
    /// One CSV file per table
    Csv,
}

/// Rows sharing the same (modality, program), in order of first appearance.
pub fn group_by_program(rows: &[ReportRow]) -> Vec<((String, String), Vec<&ReportRow>)> {
    let mut groups: Vec<((String, String), Vec<&ReportRow>)> = Vec::new();
    for row in rows {
        let key = (row.modality.clone(), row.program.clone());
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, members)) => members.push(row),
            None => groups.push((key, vec![row])),
        }
    }
    groups
}

/// File-system and worksheet safe name for a (modality, program) table.
/// Different keys may clean up to the same name; see [`unique_names`].
pub fn sheet_name(modality: &str, program: &str) -> String {
    let raw = format!("{} - {}", modality, program);
    let cleaned: String = raw
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    cleaned
        .split('_')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

/// Cut every name to `max_chars` and suffix repeats (`_2`, `_3`, ...) so no two
/// names are equal ignoring case. Order is kept.
pub fn unique_names(names: impl IntoIterator<Item = String>, max_chars: usize) -> Vec<String> {
    let mut taken = HashSet::new();
    let mut unique = Vec::new();

    for name in names {
        let base: String = name.chars().take(max_chars).collect();
        let mut candidate = base.clone();
        let mut n = 2;
        while taken.contains(&candidate.to_lowercase()) {
            let suffix = format!("_{}", n);
            let keep = max_chars.saturating_sub(suffix.chars().count());
            candidate = format!("{}{}", base.chars().take(keep).collect::<String>(), suffix);
            n += 1;
        }
        if candidate != name {
            tracing::warn!("Table '{}' renamed to '{}'", name, candidate);
        }
        taken.insert(candidate.to_lowercase());
        unique.push(candidate);
    }
    unique
}

/// Named tables of the report: one per (modality, program) with `split`,
/// otherwise a single table called `single_name`.
fn tables<'a>(rows: &'a [ReportRow], split: bool, single_name: &str, max_chars: usize) -> Vec<(String, Vec<&'a ReportRow>)> {
    if !split {
        return vec![(single_name.to_string(), rows.iter().collect())];
    }
    let groups = group_by_program(rows);
    let names = unique_names(groups.iter().map(|((m, p), _)| sheet_name(m, p)), max_chars);
    names.into_iter().zip(groups.into_iter().map(|(_, members)| members)).collect()
}

fn write_table(path: &Path, headers: &[String], rows: &[&ReportRow]) -> Result<()> {
    let mut writer = Writer::from_path(path).with_context(|| format!("Failed to create {:?}", path))?;
    writer.write_record(headers)?;
    for row in rows {
        writer.write_record(row.cells())?;
    }
    writer.flush()?;
    Ok(())
}

/// Write the report into `output_dir` and return the written paths.
///
/// `Xlsx` writes `<name>.xlsx` with one worksheet per table. `Csv` writes
/// `<name>.csv`, or `<name>_<table>.csv` per table with `split`.
pub fn write_report(
    rows: &[ReportRow],
    policy: &Policy,
    output_dir: &Path,
    name: &str,
    split: bool,
    format: ReportFormat,
) -> Result<Vec<PathBuf>> {
    if !output_dir.exists() {
        tracing::info!("Creating output directory: {:?}", output_dir);
        std::fs::create_dir_all(output_dir)?;
    }

    let headers = ReportRow::headers(policy);
    let mut written = Vec::new();

    match format {
        ReportFormat::Xlsx => {
            let path = output_dir.join(format!("{}.xlsx", name));
            let sheets = tables(rows, split, xlsx::SINGLE_SHEET, MAX_SHEET_NAME);
            xlsx::write_workbook(&path, &headers, &sheets)?;
            tracing::info!("Wrote {} rows in {} worksheets to {:?}", rows.len(), sheets.len(), path);
            written.push(path);
        }
        ReportFormat::Csv if split => {
            for (table, members) in tables(rows, true, name, MAX_FILE_STEM) {
                let path = output_dir.join(format!("{}_{}.csv", name, table));
                write_table(&path, &headers, &members)?;
                tracing::info!("Wrote {} rows to {:?}", members.len(), path);
                written.push(path);
            }
        }
        ReportFormat::Csv => {
            let path = output_dir.join(format!("{}.csv", name));
            let all: Vec<&ReportRow> = rows.iter().collect();
            write_table(&path, &headers, &all)?;
            tracing::info!("Wrote {} rows to {:?}", all.len(), path);
            written.push(path);
        }
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::{ExpectedCount, InterviewerSlot};

    const POLICY: Policy = Policy {
        expected_count: ExpectedCount::Two,
        distinguish_by_interviewer: true,
    };

    fn row(id: &str, modality: &str, program: &str) -> ReportRow {
        ReportRow {
            code: "00175262".to_string(),
            modality: modality.to_string(),
            program: program.to_string(),
            document_id: id.to_string(),
            slots: vec![
                InterviewerSlot { score: 23, interviewer: "Dr. Pérez".to_string() },
                InterviewerSlot { score: 43, interviewer: "Dra. López".to_string() },
            ],
            total: Some(66),
        }
    }

    #[test]
    fn test_single_table() {
        let dir = tempfile::tempdir().unwrap();
        let rows = vec![row("60482615", "FACTOR EXCELENCIA", "MEDICINA")];

        let written = write_report(&rows, &POLICY, dir.path(), "Reporte_Entrevistas", false, ReportFormat::Csv).unwrap();
        assert_eq!(written, vec![dir.path().join("Reporte_Entrevistas.csv")]);

        let content = std::fs::read_to_string(&written[0]).unwrap();
        let mut lines = content.lines();
        assert_eq!(
            lines.next(),
            Some("codigo,modalidad,programa,documento,Nota Entrevistador 1,Nombre Entrevistador 1,Nota Entrevistador 2,Nombre Entrevistador 2,Total")
        );
        assert_eq!(lines.next(), Some("00175262,FACTOR EXCELENCIA,MEDICINA,60482615,23,Dr. Pérez,43,Dra. López,66"));
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn test_split_by_program() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested/out");
        let rows = vec![
            row("1", "REGULAR", "MEDICINA"),
            row("2", "REGULAR", "INGENIERÍA BIOMÉDICA"),
            row("3", "REGULAR", "MEDICINA"),
        ];

        let written = write_report(&rows, &POLICY, &out, "Reporte", true, ReportFormat::Csv).unwrap();
        assert_eq!(
            written,
            vec![
                out.join("Reporte_REGULAR_-_MEDICINA.csv"),
                out.join("Reporte_REGULAR_-_INGENIERÍA_BIOMÉDICA.csv"),
            ]
        );

        let medicine = std::fs::read_to_string(&written[0]).unwrap();
        assert_eq!(medicine.lines().count(), 3);
    }

    #[test]
    fn test_group_by_program_keeps_first_seen_order() {
        let rows = vec![row("1", "B", "X"), row("2", "A", "Y"), row("3", "B", "X")];
        let groups = group_by_program(&rows);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, ("B".to_string(), "X".to_string()));
        assert_eq!(groups[0].1.len(), 2);
    }

    #[test]
    fn test_sheet_name() {
        assert_eq!(sheet_name("ADMISIÓN REGULAR", "MEDICINA"), "ADMISIÓN_REGULAR_-_MEDICINA");
        assert_eq!(sheet_name("A/B", "C"), "A_B_-_C");
    }

    #[test]
    fn test_colliding_table_names_get_suffixes() {
        let dir = tempfile::tempdir().unwrap();
        let rows = vec![row("1", "A/B", "C"), row("2", "A B", "C"), row("3", "A/B", "C")];

        let written = write_report(&rows, &POLICY, dir.path(), "Reporte", true, ReportFormat::Csv).unwrap();
        assert_eq!(
            written,
            vec![dir.path().join("Reporte_A_B_-_C.csv"), dir.path().join("Reporte_A_B_-_C_2.csv")]
        );

        let first = std::fs::read_to_string(&written[0]).unwrap();
        let second = std::fs::read_to_string(&written[1]).unwrap();
        assert_eq!(first.lines().count(), 3);
        assert_eq!(second.lines().count(), 2);
        assert!(second.contains(",A B,C,2,"));
    }

    #[test]
    fn test_unique_names_truncates_and_ignores_case() {
        let long = "X".repeat(40);
        let names = unique_names(vec![long.clone(), long, "Medicina".to_string(), "MEDICINA".to_string()], 31);

        assert_eq!(names[0], "X".repeat(31));
        assert_eq!(names[1], format!("{}_2", "X".repeat(29)));
        assert_eq!(names[2], "Medicina");
        assert_eq!(names[3], "MEDICINA_2");
    }
}

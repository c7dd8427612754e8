use anyhow::{Context, Result};
use rust_xlsxwriter::{Format, Workbook, Worksheet};
use std::path::Path;

use crate::reconcile::ReportRow;

/// Worksheet name when the report is not split by program.
pub const SINGLE_SHEET: &str = "Reporte";

fn write_row(sheet: &mut Worksheet, line: u32, row: &ReportRow) -> Result<()> {
    // Codes and IDs stay text to keep leading zeros
    for (col, text) in [&row.code, &row.modality, &row.program, &row.document_id].into_iter().enumerate() {
        sheet.write_string(line, col as u16, text.as_str())?;
    }

    let mut col: u16 = 4;
    for slot in &row.slots {
        sheet.write_number(line, col, slot.score as f64)?;
        sheet.write_string(line, col + 1, slot.interviewer.as_str())?;
        col += 2;
    }
    if let Some(total) = row.total {
        sheet.write_number(line, col, total as f64)?;
    }
    Ok(())
}

/// Write one workbook with a worksheet per named table. Names must already be
/// valid and unique worksheet names.
pub fn write_workbook(path: &Path, headers: &[String], sheets: &[(String, Vec<&ReportRow>)]) -> Result<()> {
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();

    for (name, rows) in sheets {
        let sheet = workbook.add_worksheet();
        sheet
            .set_name(name.as_str())
            .with_context(|| format!("Invalid worksheet name '{}'", name))?;

        for (col, header) in headers.iter().enumerate() {
            sheet.write_string_with_format(0, col as u16, header.as_str(), &bold)?;
        }
        for (i, row) in rows.iter().enumerate() {
            write_row(sheet, i as u32 + 1, row)?;
        }
        sheet.autofit();
    }

    workbook
        .save(path)
        .with_context(|| format!("Failed to write workbook {:?}", path))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::reconcile::{ExpectedCount, InterviewerSlot, Policy, ReportRow};
    use crate::report::{write_report, ReportFormat};
    use std::io::Read;
    use std::path::Path;

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
                InterviewerSlot { score: 66, interviewer: "A".to_string() },
                InterviewerSlot { score: 70, interviewer: "B".to_string() },
            ],
            total: Some(136),
        }
    }

    /// Read one part of the workbook package.
    fn part(path: &Path, name: &str) -> String {
        let file = std::fs::File::open(path).unwrap();
        let mut archive = zip::ZipArchive::new(file).unwrap();
        let mut content = String::new();
        archive.by_name(name).unwrap().read_to_string(&mut content).unwrap();
        content
    }

    #[test]
    fn test_single_worksheet_workbook() {
        let dir = tempfile::tempdir().unwrap();
        let rows = vec![row("60482615", "REGULAR", "MEDICINA")];

        let written = write_report(&rows, &POLICY, dir.path(), "Reporte_Entrevistas", false, ReportFormat::Xlsx).unwrap();
        assert_eq!(written, vec![dir.path().join("Reporte_Entrevistas.xlsx")]);

        let workbook = part(&written[0], "xl/workbook.xml");
        assert!(workbook.contains(r#"name="Reporte""#));
        let strings = part(&written[0], "xl/sharedStrings.xml");
        assert!(strings.contains("Nombre Entrevistador 2"));
        assert!(strings.contains("00175262"));
        let sheet = part(&written[0], "xl/worksheets/sheet1.xml");
        assert!(sheet.contains("<v>136</v>"));
    }

    #[test]
    fn test_split_writes_one_worksheet_per_program() {
        let dir = tempfile::tempdir().unwrap();
        let rows = vec![
            row("1", "A/B", "C"),
            row("2", "A B", "C"),
            row("3", "REGULAR", "MEDICINA"),
        ];

        let written = write_report(&rows, &POLICY, dir.path(), "Reporte", true, ReportFormat::Xlsx).unwrap();
        assert_eq!(written.len(), 1);

        let workbook = part(&written[0], "xl/workbook.xml");
        assert!(workbook.contains(r#"name="A_B_-_C""#));
        assert!(workbook.contains(r#"name="A_B_-_C_2""#));
        assert!(workbook.contains(r#"name="REGULAR_-_MEDICINA""#));
        for n in 1..=3 {
            let sheet = part(&written[0], &format!("xl/worksheets/sheet{}.xml", n));
            assert_eq!(sheet.matches("<v>136</v>").count(), 1);
        }
    }
}

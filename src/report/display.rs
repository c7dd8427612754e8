use console::style;
use termimad::MadSkin;

use crate::ops::BatchOutcome;
use crate::reconcile::{Policy, ReportRow};

fn escape_cell(cell: &str) -> String {
    cell.replace('|', "\\|")
}

/// Markdown table of the report rows.
pub fn rows_markdown(rows: &[ReportRow], policy: &Policy) -> String {
    let headers = ReportRow::headers(policy);
    let mut md = String::new();

    md.push('|');
    for h in &headers {
        md.push_str(&escape_cell(h));
        md.push('|');
    }
    md.push('\n');
    md.push('|');
    for _ in &headers {
        md.push_str(":-|");
    }
    md.push('\n');

    for row in rows {
        md.push('|');
        for cell in row.cells() {
            md.push_str(&escape_cell(&cell));
            md.push('|');
        }
        md.push('\n');
    }
    md
}

/// Print the batch outcome for a human reader.
pub fn print_outcome(outcome: &BatchOutcome) {
    let reconciliation = &outcome.reconciliation;

    println!(
        "\n{} {} documents read, {} applicants reported",
        style("📊").bold(),
        outcome.records,
        reconciliation.rows.len()
    );

    if reconciliation.rows.is_empty() {
        println!("{}", style("No complete applicants in this batch.").yellow());
    } else {
        let skin = MadSkin::default();
        skin.print_text(&rows_markdown(&reconciliation.rows, &outcome.policy));
    }

    let errors: Vec<_> = reconciliation.errors().collect();
    if !errors.is_empty() {
        println!("\n{}", style("⚠️  Validation errors").red().bold());
        for error in errors {
            println!("  - {}", error);
        }
    }

    let duplicates: Vec<_> = reconciliation.duplicates().collect();
    if !duplicates.is_empty() {
        println!("\n{}", style("Duplicate files").yellow().bold());
        for duplicate in duplicates {
            println!("  - {}", duplicate);
        }
    }

    if !outcome.failures.is_empty() {
        println!("\n{}", style("Unreadable files").red().bold());
        for failure in &outcome.failures {
            println!("  - {}", failure);
        }
    }

    if !outcome.warnings.is_empty() {
        println!("\n{}", style("Warnings").dim());
        for (source_id, warning) in &outcome.warnings {
            println!("  - {}: {}", source_id, warning);
        }
    }
}

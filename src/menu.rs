use console::style;
use dialoguer::{theme::ColorfulTheme, Confirm, Input, Select};
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{Config, Section};
use crate::extraction::source::{DocumentReader, TextSource};
use crate::{ops, report, staging};

/// Split the path prompt on ';'. Quotes added by terminal drag-and-drop are removed.
pub fn parse_inputs(raw: &str) -> Vec<PathBuf> {
    raw.split(';')
        .map(|part| part.trim().trim_matches(|c| c == '"' || c == '\''))
        .filter(|part| !part.is_empty())
        .map(PathBuf::from)
        .collect()
}

pub async fn run_menu(config: Config) -> anyhow::Result<()> {
    let theme = ColorfulTheme::default();
    println!("{}", style("Procesador de Entrevistas").cyan().bold());

    let titles: Vec<&str> = Section::ALL.iter().map(|s| s.title()).collect();
    let default_idx = Section::ALL
        .iter()
        .position(|s| Some(*s) == config.last_section)
        .unwrap_or(0);
    let choice = Select::with_theme(&theme)
        .with_prompt("Select the section")
        .items(&titles)
        .default(default_idx)
        .interact()?;
    let section = Section::ALL[choice];
    if let Err(e) = Config::save_section(section) {
        tracing::warn!("Failed to save section: {}", e);
    }

    let policy = section.policy();
    let reader: Arc<dyn TextSource> = Arc::new(DocumentReader::new(config.isolate_pdf));
    let labels = Arc::new(config.labels.clone());
    let expected = policy.expected_count.get();

    loop {
        let raw = Input::<String>::with_theme(&theme)
            .with_prompt(format!("PDF files, zip bundles or folders ({} per applicant, separate with ';')", expected))
            .interact_text()?;

        let inputs = parse_inputs(&raw);
        if inputs.is_empty() {
            println!("{}", style("No paths given.").yellow());
            continue;
        }

        let batch = staging::stage(&inputs)?;
        let outcome = ops::run_batch(batch, reader.clone(), labels.clone(), policy).await;
        report::display::print_outcome(&outcome);

        let rows = &outcome.reconciliation.rows;
        if !rows.is_empty()
            && Confirm::with_theme(&theme)
                .with_prompt("Generate the report?")
                .default(true)
                .interact()?
        {
            let written = report::write_report(
                rows,
                &policy,
                &config.output_dir(),
                &config.report_name,
                config.split_by_program,
                config.format,
            )?;
            for path in written {
                println!("{} {}", style("📥 Report written:").green(), path.display());
            }
        }

        if !Confirm::with_theme(&theme)
            .with_prompt("Process another batch?")
            .default(false)
            .interact()?
        {
            break;
        }
    }

    Ok(())
}

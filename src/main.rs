use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

mod config;
mod extraction;
mod menu;
mod ops;
mod reconcile;
mod report;
mod staging;

use config::{Config, Section};
use extraction::source::{DocumentReader, TextSource};
use reconcile::{ExpectedCount, Policy};
use report::ReportFormat;

#[derive(Parser)]
#[command(name = "interview-report")]
#[command(version = "1.0")]
#[command(about = "Interview score sheet processor", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Clone)]
enum Commands {
    /// Process a batch of interview sheets and write the report
    Process(ProcessArgs),
    /// Open the Interactive Menu (Default)
    Menu,
    /// Internal: Extract PDF text (hidden)
    #[command(hide = true)]
    ExtractPdf {
        path: PathBuf,
    },
}

#[derive(Args, Clone)]
struct ProcessArgs {
    /// PDF or text files, zip bundles, or directories
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
    /// Admission section (defaults to the last one used)
    #[arg(long, value_enum)]
    section: Option<Section>,
    /// Documents per applicant, overrides the section
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=2))]
    expected_count: Option<u8>,
    /// Require different interviewers per applicant, overrides the section
    #[arg(long)]
    distinguish_interviewers: Option<bool>,
    /// Output directory for the report
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Report file name, without extension
    #[arg(long)]
    name: Option<String>,
    /// One table per modality and program
    #[arg(long)]
    split: bool,
    /// Report file format (defaults to the configured one)
    #[arg(long, value_enum)]
    format: Option<ReportFormat>,
    /// Read PDFs in a child process
    #[arg(long)]
    isolate: bool,
    /// Print the batch outcome as JSON
    #[arg(long)]
    json: bool,
    /// Do not write the report
    #[arg(long)]
    dry_run: bool,
}

impl ProcessArgs {
    fn policy(&self, config: &Config) -> anyhow::Result<Policy> {
        let section = self.section.or(config.last_section).unwrap_or_default();
        let mut policy = section.policy();
        if let Some(count) = self.expected_count {
            policy.expected_count = ExpectedCount::try_from(count)?;
        }
        if let Some(distinguish) = self.distinguish_interviewers {
            policy.distinguish_by_interviewer = distinguish;
        }
        Ok(policy)
    }

    fn isolate_pdf(&self, config: &Config) -> bool {
        self.isolate || config.isolate_pdf
    }
}

async fn run_process(args: ProcessArgs, config: Config) -> anyhow::Result<()> {
    let policy = args.policy(&config)?;
    tracing::info!("Processing {} inputs with {:?}", args.inputs.len(), policy);

    let batch = staging::stage(&args.inputs)?;
    let reader: Arc<dyn TextSource> = Arc::new(DocumentReader::new(args.isolate_pdf(&config)));
    let outcome = ops::run_batch(batch, reader, Arc::new(config.labels.clone()), policy).await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        report::display::print_outcome(&outcome);
    }

    let rows = &outcome.reconciliation.rows;
    if args.dry_run || rows.is_empty() {
        return Ok(());
    }

    let output_dir = args.output.clone().unwrap_or_else(|| config.output_dir());
    let name = args.name.clone().unwrap_or_else(|| config.report_name.clone());
    let split = args.split || config.split_by_program;
    let format = args.format.unwrap_or(config.format);

    let written = report::write_report(rows, &policy, &output_dir, &name, split, format)?;
    if !args.json {
        for path in written {
            println!("📥 Report written: {}", path.display());
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    // Child process for isolated PDF reading: no logging, no config
    if let Some(Commands::ExtractPdf { path }) = &cli.command {
        std::process::exit(extraction::source::print_pdf_text(path));
    }

    let app_dir = Config::get_app_data_dir();
    let file_appender = tracing_appender::rolling::never(app_dir, "interview-report.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let filter = std::env::var("INTERVIEW_REPORT_LOG").unwrap_or_else(|_| "info".to_string());

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(tracing_subscriber::EnvFilter::new(filter)),
        )
        // Only log errors to stderr, the terminal shows the report itself
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::EnvFilter::new("error")),
        )
        .init();

    let config = Config::load();
    let command = cli.command.unwrap_or(Commands::Menu);

    match command {
        Commands::Process(args) => run_process(args, config).await?,
        Commands::Menu => menu::run_menu(config).await?,
        Commands::ExtractPdf { .. } => unreachable!(), // Handled above
    }

    Ok(())
}

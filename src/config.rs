use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::extraction::FieldLabels;
use crate::reconcile::{ExpectedCount, Policy};
use crate::report::ReportFormat;

const CONFIG_FILE: &str = "interview-report.json";
const DEFAULT_REPORT_NAME: &str = "Reporte_Entrevistas";

/// Admission flows the office processes. Each one fixes a reconciliation policy.
#[derive(Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq, Debug, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    /// Medicina / Ingeniería Biomédica: two interviews per applicant
    #[default]
    Medicine,
    /// Todas las carreras: one interview per applicant
    General,
}

impl Section {
    pub const ALL: [Section; 2] = [Section::Medicine, Section::General];

    pub fn title(&self) -> &'static str {
        match self {
            Section::Medicine => "Medicina / Ingeniería Biomédica",
            Section::General => "Todas las carreras",
        }
    }

    pub fn policy(&self) -> Policy {
        match self {
            Section::Medicine => Policy {
                expected_count: ExpectedCount::Two,
                distinguish_by_interviewer: true,
            },
            Section::General => Policy {
                expected_count: ExpectedCount::One,
                distinguish_by_interviewer: false,
            },
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub last_section: Option<Section>,
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    #[serde(default = "default_report_name")]
    pub report_name: String,
    /// Write one table per (modality, program) instead of a single one.
    #[serde(default)]
    pub split_by_program: bool,
    #[serde(default)]
    pub format: ReportFormat,
    /// Read PDFs in a child process, so a crashing document cannot take the app down.
    #[serde(default)]
    pub isolate_pdf: bool,
    #[serde(default)]
    pub labels: FieldLabels,
}

fn default_report_name() -> String {
    DEFAULT_REPORT_NAME.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            last_section: None,
            output_dir: None,
            report_name: default_report_name(),
            split_by_program: false,
            format: ReportFormat::default(),
            isolate_pdf: false,
            labels: FieldLabels::default(),
        }
    }
}

impl Config {
    /// Get the application data directory
    pub fn get_app_data_dir() -> PathBuf {
        let mut path = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push("interview-report");

        if !path.exists() {
            if let Err(e) = std::fs::create_dir_all(&path) {
                tracing::warn!("Failed to create app data dir {:?}: {}", path, e);
            }
        }
        path
    }

    fn config_path() -> PathBuf {
        Self::get_app_data_dir().join("config.json")
    }

    /// Where reports go when neither the CLI nor the config names a directory.
    pub fn default_output_dir() -> PathBuf {
        PathBuf::from("output")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.output_dir.clone().unwrap_or_else(Self::default_output_dir)
    }

    pub fn from_json(contents: &str) -> Option<Config> {
        match serde_json::from_str(contents) {
            Ok(config) => Some(config),
            Err(e) => {
                tracing::warn!("Ignoring invalid config: {}", e);
                None
            }
        }
    }

    pub fn load() -> Config {
        // A config next to the working directory wins over the per-user one
        let local = PathBuf::from(CONFIG_FILE);
        for path in [local, Self::config_path()] {
            if path.exists() {
                if let Ok(contents) = std::fs::read_to_string(&path) {
                    if let Some(config) = Self::from_json(&contents) {
                        tracing::debug!("Loaded config from {:?}", path);
                        return config;
                    }
                }
            }
        }
        Config::default()
    }

    pub fn save(&self) -> Result<()> {
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(Self::config_path(), contents)?;
        Ok(())
    }

    pub fn save_section(section: Section) -> Result<()> {
        let mut config = Config::load();
        config.last_section = Some(section);
        config.save()
    }
}

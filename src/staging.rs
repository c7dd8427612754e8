use anyhow::{Context, Result};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::extraction::source::SourceError;
use crate::extraction::{ExtractionFailure, StagedDocument};

const DOCUMENT_EXTENSIONS: [&str; 2] = ["pdf", "txt"];

/// Documents of one batch. Archive contents live in a temporary directory
/// that is removed when the batch is dropped.
pub struct StagedBatch {
    _workspace: TempDir,
    pub documents: Vec<StagedDocument>,
    /// Inputs that could not be opened at all (missing paths, broken archives).
    pub rejected: Vec<ExtractionFailure>,
}

fn extension(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

fn is_document(path: &Path) -> bool {
    DOCUMENT_EXTENSIONS.contains(&extension(path).as_str())
}

fn is_archive(path: &Path) -> bool {
    extension(path) == "zip"
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}

/// Expand a zip archive into `target_dir`, skipping entries that would escape it.
pub fn unzip(archive_path: &Path, target_dir: &Path) -> Result<()> {
    let file = fs::File::open(archive_path)
        .with_context(|| format!("Failed to open archive {:?}", archive_path))?;
    let mut archive = zip::ZipArchive::new(file)?;

    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        // Sanitize path (avoid ../)
        let outpath = match file.enclosed_name() {
            Some(path) => target_dir.join(path),
            None => {
                tracing::warn!("Skipping unsafe archive entry: {}", file.name());
                continue;
            }
        };

        if file.name().ends_with('/') {
            fs::create_dir_all(&outpath)?;
        } else {
            if let Some(p) = outpath.parent() {
                fs::create_dir_all(p)?;
            }
            let mut outfile = fs::File::create(&outpath)?;
            std::io::copy(&mut file, &mut outfile)?;
        }
    }
    Ok(())
}

/// Path as the user gave it, with forward slashes.
fn path_label(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/").trim_end_matches('/').to_string()
}

/// Identity of a file on disk. Two spellings of the same path resolve to the same origin.
fn origin_of(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Accumulates the documents of a batch while inputs are walked.
struct Stager {
    workspace: TempDir,
    documents: Vec<StagedDocument>,
    rejected: Vec<ExtractionFailure>,
    archives: usize,
    /// Source id handed out for each origin.
    origins: HashMap<PathBuf, String>,
    taken: HashSet<String>,
}

impl Stager {
    fn reject(&mut self, source_id: String, cause: SourceError) {
        tracing::error!("Skipping {}: {}", source_id, cause);
        self.rejected.push(ExtractionFailure { source_id, cause });
    }

    /// Source ids are unique per origin: the same file listed twice keeps one id,
    /// different files sharing a name get the longer `fallback` id (or a counter).
    fn push(&mut self, preferred: String, fallback: String, origin: PathBuf, path: PathBuf) {
        let source_id = match self.origins.get(&origin) {
            Some(id) => {
                tracing::debug!("{:?} listed more than once as {}", path, id);
                id.clone()
            }
            None => {
                let id = self.unique_id(preferred, fallback);
                self.origins.insert(origin, id.clone());
                id
            }
        };
        self.documents.push(StagedDocument { source_id, path });
    }

    fn unique_id(&mut self, preferred: String, fallback: String) -> String {
        let mut id = if self.taken.contains(&preferred) { fallback } else { preferred };
        let base = id.clone();
        let mut n = 2;
        while self.taken.contains(&id) {
            id = format!("{} ({})", base, n);
            n += 1;
        }
        self.taken.insert(id.clone());
        id
    }

    /// Collect documents under `root`, sorted by path. Ids are the path relative
    /// to `root` prefixed with `label`. Members of an archive take their origin
    /// from the archive itself, since `root` is a fresh temp directory.
    fn add_tree(&mut self, root: &Path, label: &str, fallback_label: &str, archive_origin: Option<&Path>) {
        let files: Vec<PathBuf> = walkdir::WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .collect();

        for path in files {
            if !is_document(&path) {
                tracing::debug!("Ignoring non-document file: {:?}", path);
                continue;
            }
            let rel = path.strip_prefix(root).unwrap_or(&path).to_string_lossy().replace('\\', "/");
            let origin = match archive_origin {
                Some(archive) => archive.join(&rel),
                None => origin_of(&path),
            };
            self.push(format!("{}/{}", label, rel), format!("{}/{}", fallback_label, rel), origin, path);
        }
    }

    fn add_archive(&mut self, archive: &Path, label: &str, fallback_label: &str) {
        tracing::info!("Found zip: {:?}. Extracting...", archive.file_name());
        self.archives += 1;
        let target = self.workspace.path().join(format!("archive-{}", self.archives));

        match unzip(archive, &target) {
            Ok(()) => self.add_tree(&target, label, fallback_label, Some(&origin_of(archive))),
            Err(e) => self.reject(label.to_string(), SourceError::Io(std::io::Error::other(format!("{:#}", e)))),
        }
    }

    fn add_directory(&mut self, dir: &Path, label: &str) {
        tracing::info!("Scanning directory: {:?}", dir);
        let fallback_label = path_label(dir);
        let archives: Vec<PathBuf> = walkdir::WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && is_archive(e.path()))
            .map(|e| e.into_path())
            .collect();

        for archive in archives {
            let rel = archive.strip_prefix(dir).unwrap_or(&archive).to_string_lossy().replace('\\', "/");
            self.add_archive(&archive, &format!("{}/{}", label, rel), &format!("{}/{}", fallback_label, rel));
        }
        self.add_tree(dir, label, &fallback_label, None);
    }

    fn add_input(&mut self, input: &Path) {
        let name = display_name(input);

        if input.is_dir() {
            self.add_directory(input, &name);
        } else if !input.exists() {
            self.reject(name, SourceError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "no such file")));
        } else if is_archive(input) {
            self.add_archive(input, &name, &path_label(input));
        } else if is_document(input) {
            self.push(name, path_label(input), origin_of(input), input.to_path_buf());
        } else {
            tracing::warn!("Unsupported file skipped: {:?}", input);
        }
    }
}

/// Turn user inputs (documents, zip bundles, directories) into a flat,
/// ordered list of documents. One bad input never stops the others.
pub fn stage(inputs: &[PathBuf]) -> Result<StagedBatch> {
    let workspace = tempfile::Builder::new()
        .prefix("interview-report-")
        .tempdir()
        .context("Failed to create temporary staging directory")?;

    let mut stager = Stager {
        workspace,
        documents: Vec::new(),
        rejected: Vec::new(),
        archives: 0,
        origins: HashMap::new(),
        taken: HashSet::new(),
    };
    for input in inputs {
        stager.add_input(input);
    }

    tracing::info!("Staged {} documents ({} inputs rejected)", stager.documents.len(), stager.rejected.len());
    Ok(StagedBatch {
        _workspace: stager.workspace,
        documents: stager.documents,
        rejected: stager.rejected,
    })
}

use std::path::Path;
use std::process::Command;

pub const START_MARKER: &str = "<<<START_CONTENT>>>";
pub const END_MARKER: &str = "<<<END_CONTENT>>>";

#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("PDF error: {0}")]
    Pdf(String),

    #[error("PDF library panicked during extraction")]
    Panicked,

    #[error("extraction subprocess failed: {0}")]
    Subprocess(String),

    #[error("unsupported document type: {0}")]
    Unsupported(String),
}

/// Produces the text layer of a document as an ordered list of lines.
pub trait TextSource: Send + Sync {
    fn read_lines(&self, path: &Path) -> Result<Vec<String>, SourceError>;
}

/// Replace characters that break literal label matching. Unlike page-level
/// normalization, whitespace inside the line is left alone.
pub fn normalize_line(line: &str) -> String {
    line.trim_end_matches('\r')
        .replace('\u{00A0}', " ")    // Non-breaking space
        .replace('\u{2019}', "'")
        .replace('\u{2018}', "'")
        .replace('\u{201C}', "\"")
        .replace('\u{201D}', "\"")
        .replace('\u{2013}', "-")    // en dash
        .replace('\u{2014}', "-")    // em dash
        .replace('\u{FB01}', "fi")
        .replace('\u{FB02}', "fl")
}

pub fn split_lines(text: &str) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    text.split('\n').map(normalize_line).collect()
}

/// Run pdf-extract in this process. Panics inside the library are caught.
pub fn pdf_text(path: &Path) -> Result<String, SourceError> {
    match std::panic::catch_unwind(|| pdf_extract::extract_text(path)) {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => Err(SourceError::Pdf(e.to_string())),
        Err(_) => Err(SourceError::Panicked),
    }
}

/// Entry point of the hidden `extract-pdf` command. Prints the text between
/// markers so library noise on stdout can be told apart.
pub fn print_pdf_text(path: &Path) -> i32 {
    match pdf_text(path) {
        Ok(text) => {
            println!("{}{}{}", START_MARKER, text, END_MARKER);
            0
        }
        Err(SourceError::Panicked) => {
            eprintln!("Panic during extraction");
            2
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn delimited(stdout: &str) -> Option<&str> {
    let start = stdout.find(START_MARKER)? + START_MARKER.len();
    let end = stdout[start..].find(END_MARKER)? + start;
    Some(&stdout[start..end])
}

/// PDF text layer read in-process.
pub struct PdfTextSource;

impl TextSource for PdfTextSource {
    fn read_lines(&self, path: &Path) -> Result<Vec<String>, SourceError> {
        Ok(split_lines(&pdf_text(path)?))
    }
}

/// PDF text layer read by re-invoking this executable with `extract-pdf`.
pub struct SubprocessPdfSource;

impl TextSource for SubprocessPdfSource {
    fn read_lines(&self, path: &Path) -> Result<Vec<String>, SourceError> {
        let exe = std::env::current_exe()?;
        let out = Command::new(exe).arg("extract-pdf").arg(path).output()?;

        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            return Err(SourceError::Subprocess(stderr.trim().to_string()));
        }

        let stdout = String::from_utf8_lossy(&out.stdout);
        match delimited(&stdout) {
            Some(text) => Ok(split_lines(text)),
            None => Err(SourceError::Subprocess("no content markers in output".to_string())),
        }
    }
}

/// Plain-text dumps of a document's text layer.
pub struct PlainTextSource;

impl TextSource for PlainTextSource {
    fn read_lines(&self, path: &Path) -> Result<Vec<String>, SourceError> {
        let text = std::fs::read_to_string(path)?;
        Ok(split_lines(&text))
    }
}

/// Picks a reader by file extension.
pub struct DocumentReader {
    pdf: Box<dyn TextSource>,
    text: PlainTextSource,
}

impl DocumentReader {
    pub fn new(isolate_pdf: bool) -> Self {
        let pdf: Box<dyn TextSource> = if isolate_pdf {
            Box::new(SubprocessPdfSource)
        } else {
            Box::new(PdfTextSource)
        };
        Self { pdf, text: PlainTextSource }
    }
}

impl TextSource for DocumentReader {
    fn read_lines(&self, path: &Path) -> Result<Vec<String>, SourceError> {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "pdf" => self.pdf.read_lines(path),
            "txt" => self.text.read_lines(path),
            other => Err(SourceError::Unsupported(other.to_string())),
        }
    }
}

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Characters the engine may emit: digits and the decimal point.
pub const NUMERIC_ALPHABET: &str = "0123456789.";

/// An OCR engine that turns an image on disk into text.
///
/// Output keeps one line break per visual line of text. Recognition is
/// best-effort; an empty string is a valid result.
pub trait TextRecognizer: Send + Sync {
    fn recognize(&self, image_path: &Path, alphabet: &str) -> Result<String>;

    fn name(&self) -> String;
}

/// Runs the `tesseract` command line tool once per image.
#[derive(Debug, Clone)]
pub struct TesseractCli {
    binary: PathBuf,
    lang: String,
}

impl TesseractCli {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            lang: "eng".to_string(),
        }
    }

    pub fn with_lang(mut self, lang: String) -> Self {
        self.lang = lang;
        self
    }

    /// Ask the engine for its version, to report at startup.
    pub fn probe(&self) -> Result<String> {
        let output = Command::new(&self.binary)
            .arg("--version")
            .output()
            .with_context(|| format!("failed to invoke {}", self.binary.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("tesseract --version failed: {stderr}");
        }

        // Older releases print the banner on stderr.
        let banner = if output.stdout.is_empty() {
            output.stderr
        } else {
            output.stdout
        };
        Ok(String::from_utf8_lossy(&banner)
            .lines()
            .next()
            .unwrap_or_default()
            .trim()
            .to_string())
    }
}

impl TextRecognizer for TesseractCli {
    fn recognize(&self, image_path: &Path, alphabet: &str) -> Result<String> {
        let output = Command::new(&self.binary)
            .arg(image_path)
            .arg("stdout")
            .arg("-l")
            .arg(&self.lang)
            .arg("-c")
            .arg(format!("tessedit_char_whitelist={alphabet}"))
            .output()
            .with_context(|| format!("failed to invoke {}", self.binary.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("tesseract exited with {}: {stderr}", output.status);
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn name(&self) -> String {
        format!("tesseract ({}, lang {})", self.binary.display(), self.lang)
    }
}

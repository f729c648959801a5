use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

/// Runtime settings, read once from `NUMSCAN_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub upload_dir: PathBuf,
    pub target_width: u32,
    pub max_output_pixels: u64,
    pub body_limit: usize,
    pub tesseract_bin: PathBuf,
    pub ocr_lang: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 5000)),
            upload_dir: PathBuf::from("uploads"),
            target_width: 1024,
            max_output_pixels: 40_000_000,
            body_limit: 25 * 1024 * 1024,
            tesseract_bin: PathBuf::from("tesseract"),
            ocr_lang: "eng".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let target_width = parsed(&lookup, "NUMSCAN_TARGET_WIDTH", defaults.target_width)?;
        if target_width == 0 {
            anyhow::bail!("NUMSCAN_TARGET_WIDTH must be greater than zero");
        }

        Ok(Self {
            addr: parsed(&lookup, "NUMSCAN_ADDR", defaults.addr)?,
            upload_dir: lookup("NUMSCAN_UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            target_width,
            max_output_pixels: parsed(
                &lookup,
                "NUMSCAN_MAX_OUTPUT_PIXELS",
                defaults.max_output_pixels,
            )?,
            body_limit: parsed(&lookup, "NUMSCAN_BODY_LIMIT", defaults.body_limit)?,
            tesseract_bin: lookup("NUMSCAN_TESSERACT")
                .map(PathBuf::from)
                .unwrap_or(defaults.tesseract_bin),
            ocr_lang: lookup("NUMSCAN_OCR_LANG").unwrap_or(defaults.ocr_lang),
        })
    }
}

fn parsed<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {key}: {raw:?}")),
        None => Ok(default),
    }
}

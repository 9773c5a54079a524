use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::chunker::{DEFAULT_MAX_BYTES, DEFAULT_SEPARATOR};
use crate::matcher::IdScheme;
use crate::tagger::ProtectedElement;

/// Default location of the optional configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "tei_ner.json";

/// Application configuration, loaded from JSON. Every field has a default,
/// so an absent file or an empty object are both valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    #[serde(default)]
    pub log_level: LogLevel,

    #[serde(default)]
    pub extract: ExtractConfig,

    #[serde(default)]
    pub embed: EmbedConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            Self::Error => log::LevelFilter::Error,
            Self::Warn => log::LevelFilter::Warn,
            Self::Info => log::LevelFilter::Info,
            Self::Debug => log::LevelFilter::Debug,
            Self::Trace => log::LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractConfig {
    /// Largest UTF-8 size of one recognizer input
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    #[serde(default = "default_separator")]
    pub paragraph_separator: String,

    #[serde(default)]
    pub recognizer: RecognizerConfig,

    /// Output file prefix; the input file stem when unset
    #[serde(default)]
    pub prefix: Option<String>,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            max_bytes: default_max_bytes(),
            paragraph_separator: default_separator(),
            recognizer: RecognizerConfig::default(),
            prefix: None,
        }
    }
}

/// Which recognizer backs the extract stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RecognizerConfig {
    /// `surface<TAB>label` dictionary
    Gazetteer { path: PathBuf },
    /// External program speaking JSON on stdout
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
    },
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self::Gazetteer {
            path: PathBuf::from("gazetteer.tsv"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedConfig {
    /// Subtrees the tagger never enters
    #[serde(default = "default_protected")]
    pub protected: Vec<ProtectedElement>,

    #[serde(default)]
    pub id_scheme: IdScheme,

    /// Appended to the input stem to name the tagged output
    #[serde(default = "default_output_suffix")]
    pub output_suffix: String,
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            protected: default_protected(),
            id_scheme: IdScheme::default(),
            output_suffix: default_output_suffix(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            log_level: LogLevel::default(),
            extract: ExtractConfig::default(),
            embed: EmbedConfig::default(),
        }
    }
}

impl Config {
    /// Load from `path`, falling back to defaults when the file is missing.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_json(&json).with_context(|| format!("Invalid config file: {}", path.display()))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.extract.max_bytes < 4 {
            return Err(anyhow!(
                "extract.max_bytes must be at least 4, got {}",
                self.extract.max_bytes
            ));
        }
        if self.extract.paragraph_separator.is_empty() {
            return Err(anyhow!("extract.paragraph_separator must not be empty"));
        }
        if self.embed.output_suffix.is_empty() {
            return Err(anyhow!(
                "embed.output_suffix must not be empty, outputs would overwrite inputs"
            ));
        }
        if let RecognizerConfig::Command { program, .. } = &self.extract.recognizer
            && program.trim().is_empty()
        {
            return Err(anyhow!("extract.recognizer.program must not be empty"));
        }
        Ok(())
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_max_bytes() -> usize {
    DEFAULT_MAX_BYTES
}

fn default_separator() -> String {
    DEFAULT_SEPARATOR.to_string()
}

fn default_output_suffix() -> String {
    "_tagged".to_string()
}

fn default_protected() -> Vec<ProtectedElement> {
    vec![
        ProtectedElement::with_attribute("seg", "type", "ruby"),
        ProtectedElement::named("ruby"),
    ]
}

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::model::{OutputFormat, RecognizerKind};

/// Supplies per-device command-line tokens from persisted preferences.
pub trait DeviceOptionProvider {
    fn device_options(&self, device: &str, type_arg: Option<&str>) -> Vec<String>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProbeConfig {
    #[serde(default = "default_smartctl_binary")]
    pub smartctl_binary: PathBuf,
    /// Prepended to every smartctl invocation.
    #[serde(default)]
    pub default_options: Vec<String>,
    #[serde(default)]
    pub device_options: Vec<DeviceOptionRule>,
    #[serde(default)]
    pub formats: FormatPreferences,
}

fn default_smartctl_binary() -> PathBuf {
    PathBuf::from("smartctl")
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            smartctl_binary: default_smartctl_binary(),
            default_options: Vec::new(),
            device_options: Vec::new(),
            formats: FormatPreferences::default(),
        }
    }
}

/// Extra options for one device. A rule with `type_arg` only applies when
/// the device is probed with that `-d` type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceOptionRule {
    pub device: String,
    #[serde(default)]
    pub type_arg: Option<String>,
    #[serde(default)]
    pub options: Vec<String>,
}

/// Output format requested from smartctl for each recognizer variant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FormatPreferences {
    #[serde(default)]
    pub basic: OutputFormat,
    #[serde(default)]
    pub ata: OutputFormat,
    #[serde(default)]
    pub nvme: OutputFormat,
    #[serde(default)]
    pub scsi: OutputFormat,
}

impl Default for FormatPreferences {
    fn default() -> Self {
        Self {
            basic: OutputFormat::Json,
            ata: OutputFormat::Json,
            nvme: OutputFormat::Json,
            scsi: OutputFormat::Json,
        }
    }
}

impl FormatPreferences {
    pub fn format_for(&self, kind: RecognizerKind) -> OutputFormat {
        match kind {
            RecognizerKind::Basic => self.basic,
            RecognizerKind::Ata => self.ata,
            RecognizerKind::Nvme => self.nvme,
            RecognizerKind::Scsi => self.scsi,
        }
    }

    pub fn text_only() -> Self {
        Self {
            basic: OutputFormat::Text,
            ata: OutputFormat::Text,
            nvme: OutputFormat::Text,
            scsi: OutputFormat::Text,
        }
    }
}

impl DeviceOptionProvider for ProbeConfig {
    fn device_options(&self, device: &str, type_arg: Option<&str>) -> Vec<String> {
        self.device_options
            .iter()
            .filter(|rule| rule.device == device)
            .filter(|rule| match rule.type_arg.as_deref() {
                Some(rule_type) => Some(rule_type) == type_arg,
                None => true,
            })
            .flat_map(|rule| rule.options.iter().cloned())
            .collect()
    }
}

/// Loads a JSON config file. `None` yields the defaults.
pub fn load_config(path: Option<&Path>) -> Result<ProbeConfig> {
    let Some(path) = path else {
        return Ok(ProbeConfig::default());
    };
    let data = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config: ProbeConfig = serde_json::from_str(&data)
        .with_context(|| format!("failed to parse config {}", path.display()))?;
    Ok(config)
}

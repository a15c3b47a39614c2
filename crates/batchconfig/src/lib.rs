use std::fs;
use std::path::{Path, PathBuf};

use pipeline::{GridPolicy, KernelVariant};
use serde::de::{self, Deserializer};
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read batch file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse batch file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid batch file: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchConfig {
    pub version: u32,
    #[serde(default)]
    pub defaults: Defaults,
    #[serde(default)]
    pub runs: Vec<RunSpec>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Defaults {
    #[serde(default, deserialize_with = "deserialize_grid_opt")]
    pub grid: Option<GridPolicy>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunSpec {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(deserialize_with = "deserialize_variant")]
    pub variant: KernelVariant,
    #[serde(default)]
    pub inputs: Vec<PathBuf>,
    pub output: PathBuf,
    #[serde(default, deserialize_with = "deserialize_grid_opt")]
    pub grid: Option<GridPolicy>,
}

/// A run with defaults applied and paths made absolute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRun {
    pub name: String,
    pub variant: KernelVariant,
    pub inputs: Vec<PathBuf>,
    pub output: PathBuf,
    pub grid: Option<GridPolicy>,
}

fn deserialize_variant<'de, D>(deserializer: D) -> Result<KernelVariant, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    raw.parse().map_err(de::Error::custom)
}

fn deserialize_grid_opt<'de, D>(deserializer: D) -> Result<Option<GridPolicy>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    raw.map(|value| value.parse().map_err(de::Error::custom))
        .transpose()
}

impl BatchConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: BatchConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    /// Reads and validates a batch file. Relative paths in it are later
    /// resolved against the file's directory.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != 1 {
            return Err(ConfigError::Invalid(format!(
                "unsupported batch version {}; expected 1",
                self.version
            )));
        }

        if self.runs.is_empty() {
            return Err(ConfigError::Invalid(
                "batch file must define at least one [[runs]] entry".into(),
            ));
        }

        for (index, run) in self.runs.iter().enumerate() {
            let label = run.label(index);
            if run.inputs.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "run '{label}' must list at least one input"
                )));
            }

            if let Some(empty) = run.inputs.iter().position(|p| p.as_os_str().is_empty()) {
                return Err(ConfigError::Invalid(format!(
                    "run '{label}' input #{empty} is an empty path"
                )));
            }

            if run.output.as_os_str().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "run '{label}' output may not be empty"
                )));
            }

            let expected = run.variant.descriptor().input_count();
            if run.inputs.len() != expected {
                return Err(ConfigError::Invalid(format!(
                    "run '{label}' uses variant '{}' which takes {expected} inputs, but {} were listed",
                    run.variant,
                    run.inputs.len()
                )));
            }
        }

        Ok(())
    }

    /// Applies `[defaults]` and joins relative paths onto `base_dir`.
    pub fn resolved_runs(&self, base_dir: &Path) -> Vec<ResolvedRun> {
        self.runs
            .iter()
            .enumerate()
            .map(|(index, run)| ResolvedRun {
                name: run.label(index),
                variant: run.variant,
                inputs: run
                    .inputs
                    .iter()
                    .map(|input| resolve(base_dir, input))
                    .collect(),
                output: resolve(base_dir, &run.output),
                grid: run.grid.or(self.defaults.grid),
            })
            .collect()
    }
}

impl RunSpec {
    fn label(&self, index: usize) -> String {
        match &self.name {
            Some(name) if !name.trim().is_empty() => name.clone(),
            _ => format!("#{index} ({})", self.variant),
        }
    }
}

fn resolve(base_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

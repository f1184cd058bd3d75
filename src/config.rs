use crate::grid::Neighborhood;
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::{fmt::Debug, fs, ops::RangeBounds, path::Path};

/// Simulation configuration parameters.
///
/// Loaded from a TOML file and validated before use.
/// See [`Config::from_file`] for loading.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Config {
    pub grid: GridConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub init: InitConfig,
    pub output: OutputConfig,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    /// Number of grid rows.
    pub n_rows: usize,
    /// Number of grid columns.
    pub n_cols: usize,
}

/// Model parameters. Every field defaults to the classic setup.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Probability that a cell starts vacant.
    pub prob_vacant: f64,
    /// Probability that an occupied cell starts as type A rather than type B.
    pub prob_type_a: f64,
    /// An agent is satisfied if its share of like neighbors is strictly above this.
    pub threshold: f64,
    /// Neighborhood shape used by the satisfaction predicate.
    pub neighborhood: Neighborhood,
    /// How the satisfied percentage is updated after a step.
    pub metric_update: MetricUpdate,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            prob_vacant: 0.1,
            prob_type_a: 0.5,
            threshold: 0.3,
            neighborhood: Neighborhood::Moore,
            metric_update: MetricUpdate::PreStep,
        }
    }
}

/// Source of the unsatisfied count used for the post-step satisfied percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricUpdate {
    /// Use the count found at the start of the step.
    #[default]
    PreStep,
    /// Re-scan the grid once all agents have moved.
    Rescan,
}

#[derive(Debug, PartialEq, Clone, Default, Serialize, Deserialize)]
pub struct InitConfig {
    /// Seed of the random number generator (drawn from the OS if absent).
    pub seed: Option<u64>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Number of steps between simulation saves.
    pub steps_per_save: usize,
    /// Number of saves written per file.
    pub saves_per_file: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            steps_per_save: 1,
            saves_per_file: 100,
        }
    }
}

impl Config {
    /// Default configuration for a grid of the given size.
    pub fn with_dims(n_rows: usize, n_cols: usize) -> Self {
        Self {
            grid: GridConfig { n_rows, n_cols },
            model: ModelConfig::default(),
            init: InitConfig::default(),
            output: OutputConfig::default(),
        }
    }

    /// Load a [`Config`] from a file.
    ///
    /// The file must be TOML-encoded and contain a serialized [`Config`].
    /// Performs validation on all parameters before returning.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, deserialized,
    /// or if the configuration values are invalid.
    pub fn from_file<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let text = fs::read_to_string(file).with_context(|| format!("failed to read {file:?}"))?;
        Self::parse(&text)
    }

    /// Deserialize and validate a [`Config`] from a TOML string.
    pub fn parse(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text).context("failed to deserialize config")?;

        config.validate().context("failed to validate config")?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        check_num(self.grid.n_rows, 1..=10_000).context("invalid number of rows")?;
        check_num(self.grid.n_cols, 1..=10_000).context("invalid number of columns")?;

        check_num(self.model.prob_vacant, 0.0..1.0).context("invalid vacancy probability")?;
        check_num(self.model.prob_type_a, 0.0..=1.0).context("invalid type A probability")?;
        check_num(self.model.threshold, 0.0..=1.0).context("invalid satisfaction threshold")?;

        check_num(self.output.steps_per_save, 1..=100_000)
            .context("invalid number of steps per save")?;
        check_num(self.output.saves_per_file, 1..=100_000)
            .context("invalid number of saves per file")?;

        Ok(())
    }
}

fn check_num<T, R>(num: T, range: R) -> Result<()>
where
    T: PartialOrd + Debug,
    R: RangeBounds<T> + Debug,
{
    if !range.contains(&num) {
        bail!("number must be in the range {range:?}, but is {num:?}");
    }
    Ok(())
}

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::{
    fmt::Debug,
    fs,
    ops::RangeBounds,
    path::{Path, PathBuf},
};

/// Analysis configuration parameters.
///
/// Loaded from a TOML file and validated before use. Every field has a
/// default, so an empty file (or no file at all) is a valid configuration.
#[derive(Debug, PartialEq, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Output parameters.
    #[serde(default)]
    pub output: OutputConfig,
}

/// Output parameters.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    /// Number of decimals printed for every value.
    pub precision: usize,
    /// Directory charts are written to (no charts if unset).
    pub plot_dir: Option<PathBuf>,
    /// Chart width in pixels.
    pub plot_width: u32,
    /// Chart height in pixels.
    pub plot_height: u32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            precision: 3,
            plot_dir: None,
            plot_width: 1024,
            plot_height: 768,
        }
    }
}

impl Config {
    /// Load a [`Config`] from a file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, deserialized,
    /// or if the configuration values are invalid.
    pub fn from_file<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let contents =
            fs::read_to_string(file).with_context(|| format!("failed to read {file:?}"))?;

        let config: Config = toml::from_str(&contents).context("failed to deserialize config")?;

        config.validate().context("failed to validate config")?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let output = &self.output;
        check_num(output.precision, 0..=12).context("invalid precision")?;
        check_num(output.plot_width, 64..=8192).context("invalid plot width")?;
        check_num(output.plot_height, 64..=8192).context("invalid plot height")?;
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

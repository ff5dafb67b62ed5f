use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Subdirectory of a log directory that holds the model files.
pub const MODEL_FILES_DIR: &str = "model_files";
pub const HYPES_FILE: &str = "hypes.json";

fn default_region_size() -> u32 {
    32
}

fn default_rnn_len() -> usize {
    1
}

fn default_num_classes() -> usize {
    2
}

fn default_tau() -> f32 {
    0.25
}

/// Hyperparameters of a trained KittiBox model, as stored in `hypes.json`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Hypes {
    pub image_height: u32,
    pub image_width: u32,
    #[serde(default)]
    pub grid_height: Option<u32>,
    #[serde(default)]
    pub grid_width: Option<u32>,
    #[serde(default = "default_region_size")]
    pub region_size: u32,
    #[serde(default = "default_rnn_len")]
    pub rnn_len: usize,
    #[serde(default = "default_num_classes")]
    pub num_classes: usize,
    #[serde(default = "default_tau")]
    pub tau: f32,
    /// Everything else in the file (solver, architecture, dirs, ...)
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Hypes {
    pub fn grid_height(&self) -> u32 {
        self.grid_height
            .unwrap_or(self.image_height / self.region_size.max(1))
    }

    pub fn grid_width(&self) -> u32 {
        self.grid_width
            .unwrap_or(self.image_width / self.region_size.max(1))
    }

    /// Number of grid cells the network predicts for.
    pub fn cell_count(&self) -> usize {
        self.grid_height() as usize * self.grid_width() as usize
    }

    pub fn validate(&self) -> Result<()> {
        if self.image_height == 0
            || self.image_width == 0
            || i32::try_from(self.image_height).is_err()
            || i32::try_from(self.image_width).is_err()
        {
            bail!(
                "Invalid image size in hypes: {}x{}",
                self.image_width,
                self.image_height
            );
        }
        if self.region_size == 0 {
            bail!("region_size must be positive");
        }
        if self.grid_height() == 0 || self.grid_width() == 0 {
            bail!(
                "Grid is empty: {}x{} (image {}x{}, region_size {})",
                self.grid_width(),
                self.grid_height(),
                self.image_width,
                self.image_height,
                self.region_size
            );
        }
        if self.rnn_len == 0 {
            bail!("rnn_len must be at least 1");
        }
        if self.num_classes < 2 {
            bail!(
                "num_classes must include background and at least one class, got {}",
                self.num_classes
            );
        }
        Ok(())
    }
}

/// Files a log directory must provide to run the model.
#[derive(Debug, Clone)]
pub struct ModelFiles {
    pub hypes: PathBuf,
    pub model: PathBuf,
}

impl ModelFiles {
    /// Resolves the hypes file and the model file. `model` is taken relative
    /// to `logdir` unless it is absolute.
    pub fn locate(logdir: &Path, model: &Path) -> Result<Self> {
        if !logdir.is_dir() {
            bail!("Log directory not found: {}", logdir.display());
        }

        let hypes = logdir.join(MODEL_FILES_DIR).join(HYPES_FILE);
        if !hypes.is_file() {
            bail!("Hypes file not found: {}", hypes.display());
        }

        let model = if model.is_absolute() {
            model.to_path_buf()
        } else {
            logdir.join(model)
        };
        if !model.is_file() {
            bail!("Model file not found: {}", model.display());
        }

        Ok(Self { hypes, model })
    }
}

pub fn load_hypes(path: &Path) -> Result<Hypes> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read hypes from {}", path.display()))?;
    let hypes: Hypes = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse hypes in {}", path.display()))?;
    hypes.validate()?;
    Ok(hypes)
}

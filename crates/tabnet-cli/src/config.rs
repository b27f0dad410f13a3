//! TOML config loading for the TabNet CLI.
//!
//! `configs/train.toml` has optional `[model]` and `[training]` sections whose
//! keys override the built-in defaults of [`TabNetConfig`] and
//! [`TrainingConfig`]. CLI flags override both.

use std::path::Path;

use serde::Deserialize;
use tabnet::{TabNetConfig, TrainingConfig};

/// Config file used when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "configs/train.toml";

/// Top-level structure of the training config file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrainToml {
    #[serde(default)]
    pub model: ModelOverrides,
    #[serde(default)]
    pub training: TrainingOverrides,
}

/// Optional overrides for [`TabNetConfig`]. Data-dependent sizes are never
/// configurable; they come from the training file.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelOverrides {
    pub num_decision_steps: Option<usize>,
    pub feature_dimension: Option<usize>,
    pub categorical_embedding_dimension: Option<usize>,
    pub relaxation_factor: Option<f64>,
    pub batch_momentum: Option<f64>,
    pub virtual_batch_size: Option<usize>,
    pub sparsity_loss_weight: Option<f64>,
    pub reconstruction_loss_weight: Option<f64>,
    pub target_loss_weight: Option<f64>,
}

/// Optional overrides for [`TrainingConfig`].
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrainingOverrides {
    pub num_epochs: Option<usize>,
    pub batch_size: Option<usize>,
    pub learning_rate: Option<f64>,
    pub grad_clip_value: Option<f64>,
    pub report_interval: Option<usize>,
    pub seed: Option<u64>,
    pub shuffle: Option<bool>,
    pub input_dropout: Option<f64>,
}

/// Load and deserialize a `TrainToml` from a TOML file.
pub fn load_train_toml(path: &Path) -> anyhow::Result<TrainToml> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read config {}: {e}", path.display()))?;
    let config: TrainToml = toml::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("Failed to parse config {}: {e}", path.display()))?;
    tracing::info!(path = %path.display(), "Loaded training config");
    Ok(config)
}

/// Load the explicitly requested config file, or the default one if it
/// exists. A missing default file yields empty overrides.
pub fn resolve_train_toml(explicit: Option<&Path>) -> anyhow::Result<TrainToml> {
    match explicit {
        Some(path) => load_train_toml(path),
        None => {
            let default = Path::new(DEFAULT_CONFIG_PATH);
            if default.is_file() {
                load_train_toml(default)
            } else {
                tracing::debug!(path = DEFAULT_CONFIG_PATH, "No config file, using defaults");
                Ok(TrainToml::default())
            }
        }
    }
}

macro_rules! apply {
    ($config:ident, $source:expr, $($field:ident => $setter:ident),+ $(,)?) => {
        $(
            if let Some(value) = $source.$field {
                $config = $config.$setter(value);
            }
        )+
    };
}

/// Build the model and training configs.
///
/// Priority chain: built-in defaults < TOML values < CLI flags.
pub fn build_configs(
    toml: &TrainToml,
    cli_model: &ModelOverrides,
    cli_training: &TrainingOverrides,
) -> (TabNetConfig, TrainingConfig) {
    let mut model = TabNetConfig::new();
    for overrides in [&toml.model, cli_model] {
        apply!(model, overrides,
            num_decision_steps => with_num_decision_steps,
            feature_dimension => with_feature_dimension,
            categorical_embedding_dimension => with_categorical_embedding_dimension,
            relaxation_factor => with_relaxation_factor,
            batch_momentum => with_batch_momentum,
            virtual_batch_size => with_virtual_batch_size,
            sparsity_loss_weight => with_sparsity_loss_weight,
            reconstruction_loss_weight => with_reconstruction_loss_weight,
            target_loss_weight => with_target_loss_weight,
        );
    }

    let mut training = TrainingConfig::new();
    for overrides in [&toml.training, cli_training] {
        apply!(training, overrides,
            num_epochs => with_num_epochs,
            batch_size => with_batch_size,
            learning_rate => with_learning_rate,
            grad_clip_value => with_grad_clip_value,
            report_interval => with_report_interval,
            seed => with_seed,
            shuffle => with_shuffle,
            input_dropout => with_input_dropout,
        );
    }

    (model, training)
}

//! Single-file model persistence.
//!
//! A model file is a bincode envelope holding the format version, the frozen
//! [`Metadata`], the backfilled [`TabNetConfig`] (as JSON) and the network
//! record encoded with burn's named MessagePack recorder. The running
//! normalization statistics are part of the record.

use std::path::Path;

use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkBytesRecorder, Recorder};
use serde::{Deserialize, Serialize};
use tabular::Metadata;

use crate::model::network::TabularNetwork;
use crate::model::tabnet::TabNetConfig;

/// Version written by [`save_model`]. Files with any other version are
/// rejected on load.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct ModelFile {
    format_version: u32,
    metadata: Metadata,
    tabnet_config: String,
    weights: Vec<u8>,
}

/// Everything needed to run a trained network on new data.
#[derive(Debug)]
pub struct SavedModel<B: Backend> {
    pub network: TabularNetwork<B>,
    pub metadata: Metadata,
    pub config: TabNetConfig,
}

/// Write `network` together with the data schema and model config to `path`.
pub fn save_model<B: Backend>(
    path: &Path,
    network: &TabularNetwork<B>,
    metadata: &Metadata,
    config: &TabNetConfig,
) -> anyhow::Result<()> {
    anyhow::ensure!(
        metadata.statistics_finalized(),
        "metadata statistics must be finalized before saving"
    );

    let recorder = NamedMpkBytesRecorder::<FullPrecisionSettings>::new();
    let weights = recorder
        .record(network.clone().into_record(), ())
        .map_err(|e| anyhow::anyhow!("Failed to encode network weights: {e}"))?;
    let tabnet_config = serde_json::to_string(config)
        .map_err(|e| anyhow::anyhow!("Failed to encode TabNet config: {e}"))?;

    let file = ModelFile {
        format_version: FORMAT_VERSION,
        metadata: metadata.clone(),
        tabnet_config,
        weights,
    };
    let bytes = bincode::serialize(&file)
        .map_err(|e| anyhow::anyhow!("Failed to serialize model file: {e}"))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| anyhow::anyhow!("Failed to create {}: {e}", parent.display()))?;
    }
    std::fs::write(path, &bytes)
        .map_err(|e| anyhow::anyhow!("Failed to write {}: {e}", path.display()))?;

    tracing::info!(
        path = %path.display(),
        bytes = bytes.len(),
        "Saved model"
    );
    Ok(())
}

/// Read a model file written by [`save_model`] and rebuild the network on
/// `device`.
pub fn load_model<B: Backend>(path: &Path, device: &B::Device) -> anyhow::Result<SavedModel<B>> {
    let bytes = std::fs::read(path)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {e}", path.display()))?;
    let file: ModelFile = bincode::deserialize(&bytes)
        .map_err(|e| anyhow::anyhow!("Failed to parse model file {}: {e}", path.display()))?;

    if file.format_version != FORMAT_VERSION {
        anyhow::bail!(
            "Unsupported model format version {} in {} (expected {FORMAT_VERSION})",
            file.format_version,
            path.display()
        );
    }

    let config: TabNetConfig = serde_json::from_str(&file.tabnet_config)
        .map_err(|e| anyhow::anyhow!("Failed to parse TabNet config in {}: {e}", path.display()))?;
    config.validate()?;

    let recorder = NamedMpkBytesRecorder::<FullPrecisionSettings>::new();
    let record = recorder
        .load(file.weights, device)
        .map_err(|e| anyhow::anyhow!("Failed to load network weights from {}: {e}", path.display()))?;
    let network = TabularNetwork::init(&config, device).load_record(record);

    tracing::info!(
        path = %path.display(),
        target_column = %file.metadata.target_column().name,
        steps = config.num_decision_steps,
        columns = config.num_columns,
        "Loaded model"
    );

    Ok(SavedModel {
        network,
        metadata: file.metadata,
        config,
    })
}

use anyhow::Result;
use std::path::Path;

use crate::DetectorConfig;

pub fn check_config(cfg: &DetectorConfig) -> Result<()> {
    cfg.validate()?;
    anyhow::ensure!(cfg.input_width % 32 == 0 && cfg.input_height % 32 == 0,
        "input size {}x{} is not a multiple of 32", cfg.input_width, cfg.input_height);
    anyhow::ensure!(cfg.confidence_threshold > 0.0 || cfg.score_threshold > 0.0,
        "both confidence_threshold and score_threshold are 0; every candidate would survive decoding");
    let mut seen = std::collections::HashSet::new();
    for name in &cfg.class_names {
        anyhow::ensure!(!name.trim().is_empty(), "class_names contains an empty entry");
        anyhow::ensure!(seen.insert(name.as_str()), "duplicate class name: {}", name);
    }
    Ok(())
}

pub fn check_model_file(path: &Path) -> Result<()> {
    let meta = std::fs::metadata(path)
        .map_err(|e| anyhow::anyhow!("model file {}: {}", path.display(), e))?;
    anyhow::ensure!(meta.is_file(), "model path {} is not a file", path.display());
    anyhow::ensure!(meta.len() > 0, "model file {} is empty", path.display());
    Ok(())
}

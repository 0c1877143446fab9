use super::types::{RawDurations, RawExtractConfig};
use anyhow::{Context, Result};
use crystal_core::{ExtractConfig, TierDurations};
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load merged configuration: user, project, explicit file, then `cli`.
    pub fn load(explicit: Option<&Path>, cli: RawExtractConfig) -> Result<ExtractConfig> {
        let mut raw = RawExtractConfig::default();

        // Layer 1: User config
        if let Some(user_path) = Self::user_config_path()
            && user_path.exists()
        {
            raw = Self::merge_raw(raw, Self::load_from_path(&user_path)?);
        }

        // Layer 2: Project config
        let project_path = Self::project_config_path();
        if project_path.exists() {
            raw = Self::merge_raw(raw, Self::load_from_path(&project_path)?);
        }

        // Layer 3: --config must exist when given
        if let Some(path) = explicit {
            if !path.exists() {
                anyhow::bail!("config file {} does not exist", path.display());
            }
            raw = Self::merge_raw(raw, Self::load_from_path(path)?);
        }

        // Layer 4: command line
        raw = Self::merge_raw(raw, cli);

        Ok(Self::finalize(raw))
    }

    /// Read one config file; a missing file is an empty layer.
    pub fn load_from_path(path: &Path) -> Result<RawExtractConfig> {
        if !path.exists() {
            return Ok(RawExtractConfig::default());
        }
        debug!("reading config {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents).with_context(|| format!("invalid config {}", path.display()))
    }

    /// Get user config path (platform-specific)
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("crystal").join("config.toml"))
    }

    /// Get project config path
    /// Can be overridden with CRYSTAL_PROJECT_CONFIG_DIR env var
    pub fn project_config_path() -> PathBuf {
        if let Ok(dir) = std::env::var("CRYSTAL_PROJECT_CONFIG_DIR") {
            PathBuf::from(dir).join("config.toml")
        } else {
            PathBuf::from(".crystal/config.toml")
        }
    }

    /// Merge two raw configs (overlay values override base only if explicitly set)
    pub fn merge_raw(base: RawExtractConfig, overlay: RawExtractConfig) -> RawExtractConfig {
        RawExtractConfig {
            limit: overlay.limit.or(base.limit),
            cut1: overlay.cut1.or(base.cut1),
            cut2: overlay.cut2.or(base.cut2),
            seed: overlay.seed.or(base.seed),
            csv: overlay.csv.or(base.csv),
            dump_sql: overlay.dump_sql.or(base.dump_sql),
            recreate_indexes: overlay.recreate_indexes.or(base.recreate_indexes),
            output_dir: overlay.output_dir.or(base.output_dir),
            durations: RawDurations {
                short: overlay.durations.short.or(base.durations.short),
                long: overlay.durations.long.or(base.durations.long),
            },
        }
    }

    /// Convert raw config to final config with defaults applied
    pub fn finalize(raw: RawExtractConfig) -> ExtractConfig {
        let defaults = ExtractConfig::default();
        ExtractConfig {
            limit: raw.limit.unwrap_or(defaults.limit),
            cut1: raw.cut1.unwrap_or(defaults.cut1),
            cut2: raw.cut2.unwrap_or(defaults.cut2),
            seed: raw.seed.unwrap_or(defaults.seed),
            csv: raw.csv.unwrap_or(defaults.csv),
            dump_sql: raw.dump_sql.unwrap_or(defaults.dump_sql),
            recreate_indexes: raw.recreate_indexes.unwrap_or(defaults.recreate_indexes),
            output_dir: raw.output_dir.or(defaults.output_dir),
            durations: TierDurations {
                short: raw.durations.short.unwrap_or(defaults.durations.short),
                long: raw.durations.long.unwrap_or(defaults.durations.long),
            },
        }
    }
}

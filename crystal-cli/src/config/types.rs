use serde::Deserialize;
use std::path::PathBuf;

/// Extraction settings as stored in TOML files (optional fields for merging)
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct RawExtractConfig {
    /// Rows per tier, negative for all
    pub limit: Option<i64>,

    pub cut1: Option<f64>,

    pub cut2: Option<f64>,

    /// Seed of the random row order
    pub seed: Option<u64>,

    /// Write CSV copies of the datasets
    pub csv: Option<bool>,

    /// Log SQL statements
    pub dump_sql: Option<bool>,

    /// Drop and recreate indexes before labelling
    pub recreate_indexes: Option<bool>,

    pub output_dir: Option<PathBuf>,

    #[serde(default)]
    pub durations: RawDurations,
}

/// Tier windows as stored in TOML
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct RawDurations {
    pub short: Option<u64>,
    pub long: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let raw = RawExtractConfig::default();
        assert!(raw.limit.is_none());
        assert!(raw.output_dir.is_none());
        assert!(raw.durations.short.is_none());
    }

    #[test]
    fn test_partial_toml() {
        let raw: RawExtractConfig = toml::from_str(
            r#"
cut1 = 10.0
csv = true

[durations]
long = 80000
"#,
        )
        .unwrap();
        assert_eq!(raw.cut1, Some(10.0));
        assert_eq!(raw.csv, Some(true));
        assert!(raw.cut2.is_none());
        assert_eq!(raw.durations.long, Some(80_000));
        assert!(raw.durations.short.is_none());
    }
}

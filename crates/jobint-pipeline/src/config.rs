use std::path::PathBuf;

use tracing::warn;

use crate::modeling::UnknownMemberPolicy;
use crate::skills::SkillScope;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Scraped snapshot to ingest.
    pub source_path: PathBuf,
    /// Root of the bronze/silver/gold/reports layout.
    pub data_dir: PathBuf,
    /// Directory of rule and catalog YAML files; `None` uses the built-in set.
    pub rules_dir: Option<PathBuf>,
    pub skill_scope: SkillScope,
    pub unknown_members: UnknownMemberPolicy,
    pub write_parquet: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source_path: PathBuf::from("./final_data.csv"),
            data_dir: PathBuf::from("./data"),
            rules_dir: None,
            skill_scope: SkillScope::default(),
            unknown_members: UnknownMemberPolicy::default(),
            write_parquet: true,
        }
    }
}

fn env_flag(value: &str) -> Option<bool> {
    match value.trim() {
        "1" | "true" | "TRUE" | "True" | "yes" => Some(true),
        "0" | "false" | "FALSE" | "False" | "no" => Some(false),
        _ => None,
    }
}

fn parsed_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, "ignoring unparseable setting");
            default
        }),
        Err(_) => default,
    }
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            source_path: std::env::var("JOBINT_SOURCE")
                .map(PathBuf::from)
                .unwrap_or(defaults.source_path),
            data_dir: std::env::var("JOBINT_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            rules_dir: std::env::var("JOBINT_RULES_DIR")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            skill_scope: parsed_env("JOBINT_SKILL_SCOPE", defaults.skill_scope),
            unknown_members: parsed_env("JOBINT_UNKNOWN_MEMBERS", defaults.unknown_members),
            write_parquet: std::env::var("JOBINT_PARQUET")
                .ok()
                .and_then(|v| env_flag(&v))
                .unwrap_or(defaults.write_parquet),
        }
    }
}

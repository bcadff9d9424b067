//! Versioned reference data: ordered categorization rules and the skill catalog.

use std::collections::HashSet;
use std::path::Path;

use anyhow::Context;
use jobint_core::{ContractType, JobCategory, JobintError, SkillCategory, Stage, WorkType};
use regex::{Regex, RegexBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;

const BUILTIN_CATEGORIES: &str = include_str!("../rules/categories.yaml");
const BUILTIN_CONTRACT_TYPES: &str = include_str!("../rules/contract_types.yaml");
const BUILTIN_WORK_TYPES: &str = include_str!("../rules/work_types.yaml");
const BUILTIN_SKILLS: &str = include_str!("../rules/skills.yaml");

#[derive(Debug, Clone, Deserialize)]
struct RuleFile<T> {
    #[allow(dead_code)]
    version: u32,
    #[serde(default = "Vec::new")]
    rules: Vec<RuleEntry<T>>,
}

#[derive(Debug, Clone, Deserialize)]
struct RuleEntry<T> {
    label: T,
    pattern: String,
}

#[derive(Debug, Clone, Deserialize)]
struct SkillFile {
    #[allow(dead_code)]
    version: u32,
    #[serde(default)]
    skills: Vec<SkillFileEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct SkillFileEntry {
    name: String,
    category: SkillCategory,
    pattern: String,
}

fn compile_pattern(pattern: &str) -> Result<Regex, JobintError> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|err| JobintError::ReferenceData(format!("invalid pattern `{pattern}`: {err}")))
}

/// Outcome of running a text through a [`RuleSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification<T> {
    pub label: T,
    /// False when no rule matched and the fallback was used.
    pub matched: bool,
}

/// First-match-wins ordered rules. Order is significant: patterns overlap.
#[derive(Debug, Clone)]
pub struct RuleSet<T> {
    rules: Vec<(Regex, T)>,
    fallback: T,
}

impl<T: Copy> RuleSet<T> {
    pub fn compile<'a>(
        rules: impl IntoIterator<Item = (&'a str, T)>,
        fallback: T,
    ) -> Result<Self, JobintError> {
        let rules = rules
            .into_iter()
            .map(|(pattern, label)| compile_pattern(pattern).map(|regex| (regex, label)))
            .collect::<Result<Vec<_>, JobintError>>()?;
        Ok(Self { rules, fallback })
    }

    fn from_yaml(text: &str, fallback: T) -> Result<Self, JobintError>
    where
        T: DeserializeOwned,
    {
        let file: RuleFile<T> = serde_yaml::from_str(text)
            .map_err(|err| JobintError::ReferenceData(format!("parsing rule file: {err}")))?;
        if file.rules.is_empty() {
            return Err(JobintError::ReferenceData("rule file has no rules".into()));
        }
        Self::compile(
            file.rules.iter().map(|r| (r.pattern.as_str(), r.label)),
            fallback,
        )
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn fallback(&self) -> T {
        self.fallback
    }

    /// Label of the first rule whose pattern matches `text`. Null text only
    /// ever resolves to the fallback.
    pub fn classify(&self, text: Option<&str>) -> Classification<T> {
        let hit = text.and_then(|text| {
            self.rules
                .iter()
                .find(|(pattern, _)| pattern.is_match(text))
                .map(|(_, label)| *label)
        });
        match hit {
            Some(label) => Classification {
                label,
                matched: true,
            },
            None => Classification {
                label: self.fallback,
                matched: false,
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct SkillEntry {
    pub name: String,
    pub category: SkillCategory,
    pattern: Regex,
}

impl SkillEntry {
    pub fn new(
        name: impl Into<String>,
        category: SkillCategory,
        pattern: &str,
    ) -> Result<Self, JobintError> {
        Ok(Self {
            name: name.into(),
            category,
            pattern: compile_pattern(pattern)?,
        })
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }
}

/// Fixed skill catalog; entry order fixes the `dim_skills` keys.
#[derive(Debug, Clone)]
pub struct SkillCatalog {
    entries: Vec<SkillEntry>,
}

impl SkillCatalog {
    pub fn new(entries: Vec<SkillEntry>) -> Result<Self, JobintError> {
        if entries.is_empty() {
            return Err(JobintError::ReferenceData("skill catalog is empty".into()));
        }
        let mut seen = HashSet::new();
        for entry in &entries {
            if !seen.insert(entry.name.to_lowercase()) {
                return Err(JobintError::ReferenceData(format!(
                    "duplicate skill `{}` in catalog",
                    entry.name
                )));
            }
        }
        Ok(Self { entries })
    }

    fn from_yaml(text: &str) -> Result<Self, JobintError> {
        let file: SkillFile = serde_yaml::from_str(text)
            .map_err(|err| JobintError::ReferenceData(format!("parsing skill catalog: {err}")))?;
        let entries = file
            .skills
            .iter()
            .map(|s| SkillEntry::new(s.name.clone(), s.category, &s.pattern))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(entries)
    }

    pub fn entries(&self) -> &[SkillEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Everything a run needs besides the source snapshot.
#[derive(Debug, Clone)]
pub struct ReferenceData {
    pub categories: RuleSet<JobCategory>,
    pub contract_types: RuleSet<ContractType>,
    pub work_types: RuleSet<WorkType>,
    pub skills: SkillCatalog,
}

impl ReferenceData {
    /// Rules and catalog compiled into the binary.
    pub fn builtin() -> Result<Self, JobintError> {
        Self::from_texts(
            BUILTIN_CATEGORIES,
            BUILTIN_CONTRACT_TYPES,
            BUILTIN_WORK_TYPES,
            BUILTIN_SKILLS,
        )
    }

    /// Load `categories.yaml`, `contract_types.yaml`, `work_types.yaml` and
    /// `skills.yaml` from `dir`. Every file is required.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self, JobintError> {
        let dir = dir.as_ref();
        let read = |name: &str, stage: Stage| -> Result<String, JobintError> {
            let path = dir.join(name);
            std::fs::read_to_string(&path)
                .with_context(|| format!("reading reference data {}", path.display()))
                .map_err(|err| JobintError::stage(stage, err))
        };
        let categories = read("categories.yaml", Stage::Categorization)?;
        let contract_types = read("contract_types.yaml", Stage::Categorization)?;
        let work_types = read("work_types.yaml", Stage::Categorization)?;
        let skills = read("skills.yaml", Stage::SkillExtraction)?;
        Self::from_texts(&categories, &contract_types, &work_types, &skills)
    }

    fn from_texts(
        categories: &str,
        contract_types: &str,
        work_types: &str,
        skills: &str,
    ) -> Result<Self, JobintError> {
        let categorization = |err: JobintError| JobintError::stage(Stage::Categorization, err);
        Ok(Self {
            categories: RuleSet::from_yaml(categories, JobCategory::OtherDataRole)
                .map_err(categorization)?,
            contract_types: RuleSet::from_yaml(contract_types, ContractType::NotSpecified)
                .map_err(categorization)?,
            work_types: RuleSet::from_yaml(work_types, WorkType::NotSpecified)
                .map_err(categorization)?,
            skills: SkillCatalog::from_yaml(skills)
                .map_err(|err| JobintError::stage(Stage::SkillExtraction, err))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_reference_data_compiles() {
        let reference = ReferenceData::builtin().expect("builtin rules");
        assert_eq!(reference.categories.len(), 8);
        assert_eq!(reference.contract_types.len(), 4);
        assert_eq!(reference.work_types.len(), 3);
        assert_eq!(reference.skills.len(), 25);
        assert_eq!(reference.skills.entries()[0].name, "Python");
    }

    #[test]
    fn rule_order_decides_overlaps() {
        let rules = RuleSet::compile(
            [("engineer", JobCategory::DataEngineer), ("data", JobCategory::DataAnalyst)],
            JobCategory::OtherDataRole,
        )
        .unwrap();
        let hit = rules.classify(Some("data engineer"));
        assert_eq!(hit.label, JobCategory::DataEngineer);
        assert!(hit.matched);

        let reversed = RuleSet::compile(
            [("data", JobCategory::DataAnalyst), ("engineer", JobCategory::DataEngineer)],
            JobCategory::OtherDataRole,
        )
        .unwrap();
        assert_eq!(
            reversed.classify(Some("data engineer")).label,
            JobCategory::DataAnalyst
        );
    }

    #[test]
    fn null_text_uses_fallback() {
        let rules = RuleSet::compile([(".*", WorkType::Remote)], WorkType::NotSpecified).unwrap();
        let outcome = rules.classify(None);
        assert_eq!(outcome.label, WorkType::NotSpecified);
        assert!(!outcome.matched);
    }

    #[test]
    fn rule_files_parse_into_label_enums() {
        let rules = RuleSet::from_yaml(
            "version: 1\nrules:\n  - label: Remote\n    pattern: \"remote\"\n",
            WorkType::NotSpecified,
        )
        .expect("rule file parses");
        assert_eq!(rules.classify(Some("full remote")).label, WorkType::Remote);

        let err = RuleSet::from_yaml("version: 1\n", JobCategory::OtherDataRole).unwrap_err();
        assert!(matches!(err, JobintError::ReferenceData(ref msg) if msg.contains("no rules")));
    }

    #[test]
    fn invalid_pattern_is_reference_error() {
        let err = RuleSet::compile([("(unclosed", WorkType::Remote)], WorkType::NotSpecified)
            .unwrap_err();
        assert!(matches!(err, JobintError::ReferenceData(_)));
    }

    #[test]
    fn duplicate_skill_names_are_rejected() {
        let entries = vec![
            SkillEntry::new("Python", SkillCategory::ProgrammingLanguage, "python").unwrap(),
            SkillEntry::new("python", SkillCategory::ProgrammingLanguage, "py").unwrap(),
        ];
        assert!(SkillCatalog::new(entries).is_err());
    }

    #[test]
    fn missing_rules_dir_halts_categorization() {
        let dir = tempfile::tempdir().unwrap();
        let err = ReferenceData::from_dir(dir.path()).unwrap_err();
        assert_eq!(err.halted_stage(), Some(Stage::Categorization));
    }

    #[test]
    fn missing_skill_file_halts_skill_extraction() {
        let dir = tempfile::tempdir().unwrap();
        let files = [
            ("categories.yaml", BUILTIN_CATEGORIES),
            ("contract_types.yaml", BUILTIN_CONTRACT_TYPES),
            ("work_types.yaml", BUILTIN_WORK_TYPES),
        ];
        for (name, text) in files {
            std::fs::write(dir.path().join(name), text).unwrap();
        }
        let err = ReferenceData::from_dir(dir.path()).unwrap_err();
        assert_eq!(err.halted_stage(), Some(Stage::SkillExtraction));

        std::fs::write(dir.path().join("skills.yaml"), BUILTIN_SKILLS).unwrap();
        assert!(ReferenceData::from_dir(dir.path()).is_ok());
    }
}

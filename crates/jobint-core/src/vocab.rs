use std::fmt;

use serde::{Deserialize, Serialize};

/// Normalized job role derived from the cleaned title.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum JobCategory {
    #[serde(rename = "Data Engineer")]
    DataEngineer,
    #[serde(rename = "Data Scientist")]
    DataScientist,
    #[serde(rename = "Data Analyst")]
    DataAnalyst,
    #[serde(rename = "ML Engineer")]
    MlEngineer,
    #[serde(rename = "Analytics Engineer")]
    AnalyticsEngineer,
    #[serde(rename = "BI Developer")]
    BiDeveloper,
    #[serde(rename = "ETL/Pipeline Engineer")]
    EtlPipelineEngineer,
    #[serde(rename = "Data Architect")]
    DataArchitect,
    #[serde(rename = "Other Data Role")]
    OtherDataRole,
}

impl JobCategory {
    pub const ALL: [JobCategory; 9] = [
        JobCategory::DataEngineer,
        JobCategory::DataScientist,
        JobCategory::DataAnalyst,
        JobCategory::MlEngineer,
        JobCategory::AnalyticsEngineer,
        JobCategory::BiDeveloper,
        JobCategory::EtlPipelineEngineer,
        JobCategory::DataArchitect,
        JobCategory::OtherDataRole,
    ];

    pub fn label(self) -> &'static str {
        match self {
            JobCategory::DataEngineer => "Data Engineer",
            JobCategory::DataScientist => "Data Scientist",
            JobCategory::DataAnalyst => "Data Analyst",
            JobCategory::MlEngineer => "ML Engineer",
            JobCategory::AnalyticsEngineer => "Analytics Engineer",
            JobCategory::BiDeveloper => "BI Developer",
            JobCategory::EtlPipelineEngineer => "ETL/Pipeline Engineer",
            JobCategory::DataArchitect => "Data Architect",
            JobCategory::OtherDataRole => "Other Data Role",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ContractType {
    Permanent,
    Contract,
    Internship,
    Freelance,
    #[serde(rename = "Not Specified")]
    NotSpecified,
}

impl ContractType {
    pub const ALL: [ContractType; 5] = [
        ContractType::Permanent,
        ContractType::Contract,
        ContractType::Internship,
        ContractType::Freelance,
        ContractType::NotSpecified,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ContractType::Permanent => "Permanent",
            ContractType::Contract => "Contract",
            ContractType::Internship => "Internship",
            ContractType::Freelance => "Freelance",
            ContractType::NotSpecified => "Not Specified",
        }
    }

    pub fn is_permanent(self) -> bool {
        self == ContractType::Permanent
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum WorkType {
    Remote,
    Hybrid,
    #[serde(rename = "On-site")]
    OnSite,
    #[serde(rename = "Not Specified")]
    NotSpecified,
}

impl WorkType {
    pub const ALL: [WorkType; 4] = [
        WorkType::Remote,
        WorkType::Hybrid,
        WorkType::OnSite,
        WorkType::NotSpecified,
    ];

    pub fn label(self) -> &'static str {
        match self {
            WorkType::Remote => "Remote",
            WorkType::Hybrid => "Hybrid",
            WorkType::OnSite => "On-site",
            WorkType::NotSpecified => "Not Specified",
        }
    }

    pub fn is_remote(self) -> bool {
        self == WorkType::Remote
    }
}

/// Grouping used by `dim_skills.skill_category`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SkillCategory {
    #[serde(rename = "Programming Language")]
    ProgrammingLanguage,
    Database,
    #[serde(rename = "Big Data Framework")]
    BigDataFramework,
    #[serde(rename = "ML/DL Library")]
    MlDlLibrary,
    #[serde(rename = "Cloud Platform")]
    CloudPlatform,
    #[serde(rename = "BI Tool")]
    BiTool,
    #[serde(rename = "DataOps/DevOps")]
    DataOpsDevOps,
    #[serde(rename = "Data Analysis Library")]
    DataAnalysisLibrary,
    #[serde(rename = "Domain Knowledge")]
    DomainKnowledge,
    Other,
}

impl SkillCategory {
    pub fn label(self) -> &'static str {
        match self {
            SkillCategory::ProgrammingLanguage => "Programming Language",
            SkillCategory::Database => "Database",
            SkillCategory::BigDataFramework => "Big Data Framework",
            SkillCategory::MlDlLibrary => "ML/DL Library",
            SkillCategory::CloudPlatform => "Cloud Platform",
            SkillCategory::BiTool => "BI Tool",
            SkillCategory::DataOpsDevOps => "DataOps/DevOps",
            SkillCategory::DataAnalysisLibrary => "Data Analysis Library",
            SkillCategory::DomainKnowledge => "Domain Knowledge",
            SkillCategory::Other => "Other",
        }
    }
}

/// Which field of a posting a skill pattern matched in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchedField {
    Description,
    Title,
}

macro_rules! display_via_label {
    ($($ty:ty),*) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.label())
            }
        })*
    };
}

display_via_label!(JobCategory, ContractType, WorkType, SkillCategory);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_names_match_labels() {
        for category in JobCategory::ALL {
            let json = serde_json::to_string(&category).unwrap();
            assert_eq!(json, format!("\"{}\"", category.label()));
        }
        for contract in ContractType::ALL {
            let json = serde_json::to_string(&contract).unwrap();
            assert_eq!(json, format!("\"{}\"", contract.label()));
        }
        for work in WorkType::ALL {
            let json = serde_json::to_string(&work).unwrap();
            assert_eq!(json, format!("\"{}\"", work.label()));
        }
    }

    #[test]
    fn flags_follow_enums() {
        assert!(WorkType::Remote.is_remote());
        assert!(!WorkType::Hybrid.is_remote());
        assert!(ContractType::Permanent.is_permanent());
        assert!(!ContractType::NotSpecified.is_permanent());
    }

    #[test]
    fn yaml_style_labels_deserialize() {
        let category: JobCategory = serde_json::from_str("\"ETL/Pipeline Engineer\"").unwrap();
        assert_eq!(category, JobCategory::EtlPipelineEngineer);
        let skill: SkillCategory = serde_json::from_str("\"ML/DL Library\"").unwrap();
        assert_eq!(skill, SkillCategory::MlDlLibrary);
    }
}

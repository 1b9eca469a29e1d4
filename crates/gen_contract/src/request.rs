use serde::{Deserialize, Serialize};

/// Logical purpose of a generation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Generate,
    Complete,
    Explain,
    Fix,
    Optimize,
    Test,
    Document,
}

impl Intent {
    pub const ALL: [Intent; 7] = [
        Self::Generate,
        Self::Complete,
        Self::Explain,
        Self::Fix,
        Self::Optimize,
        Self::Test,
        Self::Document,
    ];

    /// Parses an intent name, accepting the aliases hosts commonly send.
    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        Some(match normalized.as_str() {
            "generate" | "gen" | "code" | "generation" => Self::Generate,
            "complete" | "completion" | "autocomplete" => Self::Complete,
            "explain" | "explanation" => Self::Explain,
            "fix" | "fix_bug" | "bugfix" | "debug" => Self::Fix,
            "optimize" | "optimise" | "refactor" => Self::Optimize,
            "test" | "tests" | "unit_test" | "unit_tests" => Self::Test,
            "document" | "docs" | "docstring" | "documentation" => Self::Document,
            _ => return None,
        })
    }

    /// Parses an intent name, falling back to [`Intent::Generate`].
    #[must_use]
    pub fn from_name(value: &str) -> Self {
        Self::parse(value).unwrap_or(Self::Generate)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Generate => "generate",
            Self::Complete => "complete",
            Self::Explain => "explain",
            Self::Fix => "fix",
            Self::Optimize => "optimize",
            Self::Test => "test",
            Self::Document => "document",
        }
    }
}

/// Sampling parameters and content flags attached to one request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingProfile {
    pub temperature: f64,
    pub top_p: f64,
    pub max_tokens: u32,
    pub include_comments: bool,
    pub include_docstring: bool,
    pub include_type_hints: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkillLevel {
    Beginner,
    #[default]
    Intermediate,
    Advanced,
    Expert,
}

impl SkillLevel {
    pub fn parse(value: &str) -> Option<Self> {
        Some(match value.trim().to_ascii_lowercase().as_str() {
            "beginner" | "novice" => Self::Beginner,
            "intermediate" => Self::Intermediate,
            "advanced" => Self::Advanced,
            "expert" => Self::Expert,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Beginner => "beginner",
            Self::Intermediate => "intermediate",
            Self::Advanced => "advanced",
            Self::Expert => "expert",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExplanationDetail {
    Brief,
    #[default]
    Standard,
    Detailed,
    Educational,
}

impl ExplanationDetail {
    pub fn parse(value: &str) -> Option<Self> {
        Some(match value.trim().to_ascii_lowercase().as_str() {
            "brief" | "concise" | "minimal" => Self::Brief,
            "standard" | "normal" => Self::Standard,
            "detailed" | "verbose" => Self::Detailed,
            "educational" | "tutorial" => Self::Educational,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Brief => "brief",
            Self::Standard => "standard",
            Self::Detailed => "detailed",
            Self::Educational => "educational",
        }
    }
}

pub const DEFAULT_PROJECT_CONTEXT: &str = "general purpose";

/// User-specific tuning resolved from remote settings or local configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonalizationProfile {
    pub skill_level: SkillLevel,
    pub explanation_detail: ExplanationDetail,
    pub project_context: String,
}

impl Default for PersonalizationProfile {
    fn default() -> Self {
        Self {
            skill_level: SkillLevel::default(),
            explanation_detail: ExplanationDetail::default(),
            project_context: DEFAULT_PROJECT_CONTEXT.to_string(),
        }
    }
}

/// Fully resolved request handed to a [`crate::GenerationTransport`].
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub context: Option<String>,
    pub intent: Intent,
    pub sampling: SamplingProfile,
    pub personalization: PersonalizationProfile,
}

//! Core domain types for the Draftforge generation pipeline.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for pipeline run identifiers (time-sortable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Stage identity and state
// ---------------------------------------------------------------------------

/// The seven pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    Planner,
    Research,
    Writer,
    Editor,
    Humanizer,
    Seo,
    FactCheck,
}

impl StageName {
    /// All stages in pipeline order.
    pub const ALL: [StageName; 7] = [
        StageName::Planner,
        StageName::Research,
        StageName::Writer,
        StageName::Editor,
        StageName::Humanizer,
        StageName::Seo,
        StageName::FactCheck,
    ];

    /// Stable snake_case name used in errors, logs, and run records.
    pub fn as_str(&self) -> &'static str {
        match self {
            StageName::Planner => "planner",
            StageName::Research => "research",
            StageName::Writer => "writer",
            StageName::Editor => "editor",
            StageName::Humanizer => "humanizer",
            StageName::Seo => "seo",
            StageName::FactCheck => "fact_check",
        }
    }

    /// Human-readable activity label for progress display.
    pub fn activity(&self) -> &'static str {
        match self {
            StageName::Planner => "Planning content",
            StageName::Research => "Researching sources",
            StageName::Writer => "Writing sections",
            StageName::Editor => "Editing draft",
            StageName::Humanizer => "Humanizing text",
            StageName::Seo => "Optimizing for search",
            StageName::FactCheck => "Checking facts",
        }
    }
}

impl std::fmt::Display for StageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a single stage within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

/// Per-stage execution record surfaced in the run outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: StageName,
    pub status: StageStatus,
    /// Wall-clock duration; zero for stages that never ran.
    pub duration_ms: u64,
}

// ---------------------------------------------------------------------------
// GenerationRequest
// ---------------------------------------------------------------------------

/// Writing voice for the generated article.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    Professional,
    Casual,
    Academic,
    Conversational,
}

impl Tone {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tone::Professional => "professional",
            Tone::Casual => "casual",
            Tone::Academic => "academic",
            Tone::Conversational => "conversational",
        }
    }
}

impl Default for Tone {
    fn default() -> Self {
        Tone::Professional
    }
}

impl std::fmt::Display for Tone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Tone {
    type Err = crate::error::DraftforgeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "professional" => Ok(Tone::Professional),
            "casual" => Ok(Tone::Casual),
            "academic" => Ok(Tone::Academic),
            "conversational" => Ok(Tone::Conversational),
            other => Err(crate::error::DraftforgeError::validation(format!(
                "unknown tone {other:?} (expected professional, casual, academic, or conversational)"
            ))),
        }
    }
}

/// Immutable per-run request, built once from the resolved configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// The article topic.
    pub topic: String,
    /// Intended readership, e.g. "engineering leads".
    pub audience: String,
    /// Writing voice.
    pub tone: Tone,
    /// Word count the writer aims for.
    pub target_word_count: usize,
    /// Floor below which sections get expanded.
    pub min_word_count: usize,
    /// Caller-supplied target keywords (may be empty).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
}

// ---------------------------------------------------------------------------
// OutlinePlan (Plan stage output)
// ---------------------------------------------------------------------------

/// One planned article section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlineSection {
    #[serde(alias = "section_title")]
    pub title: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subsections: Vec<String>,
    #[serde(default)]
    pub description: String,
}

/// Goals the planner sets for a single section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SectionGoals {
    #[serde(default, alias = "learning_objectives")]
    pub objectives: Vec<String>,
    #[serde(default)]
    pub key_points: Vec<String>,
    #[serde(default, alias = "desired_outcome")]
    pub outcome: String,
}

/// Category of a fact the planner wants researched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FactKind {
    Statistic,
    Quote,
    Example,
    Definition,
    /// Anything the model invents outside the known categories.
    #[serde(other)]
    General,
}

impl Default for FactKind {
    fn default() -> Self {
        FactKind::General
    }
}

impl FactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FactKind::Statistic => "statistic",
            FactKind::Quote => "quote",
            FactKind::Example => "example",
            FactKind::Definition => "definition",
            FactKind::General => "general",
        }
    }
}

/// A fact the Research stage should try to source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequiredFact {
    pub fact: String,
    #[serde(default, rename = "type")]
    pub kind: FactKind,
}

/// The Plan stage's structured output, parsed from model JSON.
///
/// Every field is defaulted so a partially-formed model response still
/// deserializes; the planner validates section presence separately.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutlinePlan {
    #[serde(default)]
    pub angle: String,
    #[serde(default)]
    pub thesis: String,
    #[serde(default, alias = "outline")]
    pub sections: Vec<OutlineSection>,
    /// Keyed `section_1`, `section_2`, ... matching the prompt contract.
    #[serde(default)]
    pub section_goals: BTreeMap<String, SectionGoals>,
    #[serde(default)]
    pub required_facts: Vec<RequiredFact>,
    #[serde(default)]
    pub search_queries: Vec<String>,
}

impl OutlinePlan {
    /// Goals for the 1-based section index, if the planner provided any.
    pub fn goals_for(&self, index: usize) -> Option<&SectionGoals> {
        self.section_goals.get(&format!("section_{index}"))
    }
}

// ---------------------------------------------------------------------------
// Research output
// ---------------------------------------------------------------------------

/// A single external or local source record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    pub title: String,
    pub url: String,
    /// Source text excerpt used for writing prompts and fact matching.
    pub excerpt: String,
    /// Provider-reported or assigned relevance, 0-10.
    pub relevance_score: f64,
}

/// Compact reference to a source backing a fact or claim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRef {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub excerpt: String,
}

/// Verification record for one required fact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactEntry {
    pub kind: FactKind,
    /// At most three matched sources.
    pub sources: Vec<SourceRef>,
    /// True when at least one source matched.
    pub verified: bool,
}

/// Mapping from required-fact text to its verification record.
pub type FactTable = BTreeMap<String, FactEntry>;

/// Everything the Research stage hands to later stages.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResearchBundle {
    pub citations: Vec<Citation>,
    pub fact_table: FactTable,
    pub summary: String,
    pub sources_count: usize,
}

// ---------------------------------------------------------------------------
// SEO and fact-check output
// ---------------------------------------------------------------------------

/// Suggested internal link extracted from recurring terms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InternalLink {
    /// Text in the article the link would hang off.
    pub anchor: String,
    /// Suggested internal path, e.g. `/blog/container-basics`.
    pub path: String,
}

/// SEO metadata attached to the final document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeoMetadata {
    /// At most 60 characters.
    pub meta_title: String,
    /// At most 160 characters.
    pub meta_description: String,
    pub target_keywords: Vec<String>,
    /// Keyword occurrence as a percentage of total words.
    pub keyword_density: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub internal_links: Vec<InternalLink>,
}

/// A claim-like span found by the fact checker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlaggedClaim {
    pub claim: String,
    /// Surrounding text the claim was found in.
    #[serde(default)]
    pub context: String,
    /// Title of the section the claim appeared in.
    pub section: String,
    pub verified: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<SourceRef>,
}

/// Aggregate fact-check result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactCheckSummary {
    /// verified / total, in [0,1]; 1.0 when no claims were found.
    pub verification_score: f64,
    pub flagged_claims: Vec<FlaggedClaim>,
}

impl Default for FactCheckSummary {
    fn default() -> Self {
        Self {
            verification_score: 1.0,
            flagged_claims: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Images
// ---------------------------------------------------------------------------

/// An image reference embedded in (or extracted from) section markdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ImageRef {
    /// A concrete image with markdown `![alt](url)` rendering.
    Url { url: String, alt: String },
    /// A textual placeholder, rendered as an `Image needed:` HTML comment.
    Needed { description: String },
}

impl ImageRef {
    /// Markdown marker for embedding into section text.
    pub fn to_marker(&self) -> String {
        match self {
            ImageRef::Url { url, alt } => format!("![{alt}]({url})"),
            ImageRef::Needed { description } => {
                format!("<!-- Image needed: {description} -->")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// FinalDocument
// ---------------------------------------------------------------------------

/// One rendered section of the final article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSection {
    pub title: String,
    pub content: String,
}

/// The assembled, immutable output of a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalDocument {
    pub title: String,
    pub meta_description: String,
    /// Ordered sections, supplementary sections (FAQ, References) included.
    pub sections: Vec<DocumentSection>,
    /// At most ten surfaced citations.
    pub citations: Vec<Citation>,
    pub fact_check: FactCheckSummary,
    pub seo: SeoMetadata,
    /// Image references extracted from section bodies.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ImageRef>,
}

//! Fact-check stage: flags claim-like spans and verifies them against
//! research artifacts.
//!
//! Verification runs in three tiers of increasing cost: the fact table,
//! token overlap against citation text, and finally one model call per
//! still-unmatched claim. The model tier is skipped when there are no
//! citations to check against or when the unmatched count is too large.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use async_trait::async_trait;
use draftforge_shared::{
    Citation, FactCheckSummary, FactTable, FlaggedClaim, Result, SectionMap, SourceRef, StageName,
};
use regex::Regex;
use tracing::{debug, warn};

use crate::{Stage, StageContext};

/// Appended to a section that still carries unverified claims.
const CITATION_NOTE: &str =
    "\n\n*Note: Some claims in this section may require additional citations.*";

/// Spans that read like factual assertions.
static CLAIM_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\d+%",
        r"\d+\s+(?:million|billion|thousand)",
        r"studies?\s+(?:show|indicate|suggest|prove)",
        r"according\s+to",
        r"research\s+(?:shows|indicates)",
        r"data\s+(?:shows|indicates)",
    ]
    .iter()
    .map(|pattern| Regex::new(&format!("(?i){pattern}")).expect("valid regex"))
    .collect()
});

static DIGITS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").expect("valid regex"));

/// Tunable thresholds for claim verification.
#[derive(Debug, Clone)]
pub struct FactCheckPolicy {
    /// Fraction of context tokens that must appear in a citation's text for
    /// a phrase claim to count as supported.
    pub token_overlap_threshold: f64,
    /// Model escalation is skipped when more claims than this are unmatched.
    pub max_llm_claims: usize,
    /// Bytes of surrounding text captured on each side of a claim.
    pub context_window: usize,
}

impl Default for FactCheckPolicy {
    fn default() -> Self {
        Self {
            token_overlap_threshold: 0.5,
            max_llm_claims: 5,
            context_window: 50,
        }
    }
}

/// Verifies claim-like statements and annotates sections that need citations.
pub struct FactChecker {
    policy: FactCheckPolicy,
}

impl FactChecker {
    pub fn new() -> Self {
        Self::with_policy(FactCheckPolicy::default())
    }

    pub fn with_policy(policy: FactCheckPolicy) -> Self {
        Self { policy }
    }
}

impl Default for FactChecker {
    fn default() -> Self {
        Self::new()
    }
}

/// What the fact-check stage consumes.
pub struct FactCheckInput {
    pub sections: SectionMap,
    pub fact_table: FactTable,
    pub citations: Vec<Citation>,
}

/// Annotated sections plus the verification summary.
pub struct FactCheckOutcome {
    pub sections: SectionMap,
    pub summary: FactCheckSummary,
}

#[async_trait]
impl Stage for FactChecker {
    type Input = FactCheckInput;
    type Output = FactCheckOutcome;

    const NAME: StageName = StageName::FactCheck;

    async fn process(&self, ctx: &StageContext<'_>, input: Self::Input) -> Result<Self::Output> {
        ctx.progress
            .thought(Self::NAME, "Scanning for claims that need citations...");

        let mut claims = self.spot_claims(&input.sections);
        for claim in &mut claims {
            if let Some(sources) = match_fact_table(claim, &input.fact_table) {
                claim.verified = true;
                claim.sources = sources;
            } else if let Some(sources) = self.match_citations(claim, &input.citations) {
                claim.verified = true;
                claim.sources = sources;
            }
        }

        self.escalate_unmatched(ctx, &mut claims, &input.citations)
            .await;

        let mut sections = input.sections;
        let needy: BTreeSet<String> = claims
            .iter()
            .filter(|claim| !claim.verified)
            .map(|claim| claim.section.clone())
            .collect();
        for title in &needy {
            if let Some(body) = sections.get_mut(title) {
                body.push_str(CITATION_NOTE);
            }
        }

        let verified = claims.iter().filter(|claim| claim.verified).count();
        let verification_score = if claims.is_empty() {
            1.0
        } else {
            verified as f64 / claims.len() as f64
        };
        debug!(
            claims = claims.len(),
            verified,
            annotated_sections = needy.len(),
            "fact check complete"
        );

        Ok(FactCheckOutcome {
            sections,
            summary: FactCheckSummary {
                verification_score,
                flagged_claims: claims,
            },
        })
    }
}

impl FactChecker {
    fn spot_claims(&self, sections: &SectionMap) -> Vec<FlaggedClaim> {
        let mut claims = Vec::new();
        for (title, body) in sections.iter() {
            for re in CLAIM_RES.iter() {
                for m in re.find_iter(body) {
                    claims.push(FlaggedClaim {
                        claim: m.as_str().to_string(),
                        context: window(body, m.start(), m.end(), self.policy.context_window)
                            .to_string(),
                        section: title.to_string(),
                        verified: false,
                        sources: Vec::new(),
                    });
                }
            }
        }
        claims
    }

    /// Tier two: exact substring for percentages, token overlap for phrases.
    fn match_citations(
        &self,
        claim: &FlaggedClaim,
        citations: &[Citation],
    ) -> Option<Vec<SourceRef>> {
        let claim_lower = claim.claim.to_lowercase();
        for citation in citations {
            let citation_text =
                format!("{} {}", citation.title, citation.excerpt).to_lowercase();
            let supported = if claim_lower.contains('%') {
                citation_text.contains(&claim_lower)
            } else {
                token_overlap(&claim.context, &citation_text)
                    >= self.policy.token_overlap_threshold
            };
            if supported {
                return Some(vec![SourceRef {
                    title: citation.title.clone(),
                    url: citation.url.clone(),
                    excerpt: String::new(),
                }]);
            }
        }
        None
    }

    /// Tier three: one model call per unmatched claim. A failed call leaves
    /// the claim unverified rather than failing the stage.
    async fn escalate_unmatched(
        &self,
        ctx: &StageContext<'_>,
        claims: &mut [FlaggedClaim],
        citations: &[Citation],
    ) {
        let unmatched: Vec<usize> = claims
            .iter()
            .enumerate()
            .filter(|(_, claim)| !claim.verified)
            .map(|(index, _)| index)
            .collect();
        if unmatched.is_empty() || citations.is_empty() {
            return;
        }
        if unmatched.len() > self.policy.max_llm_claims {
            debug!(
                claims = unmatched.len(),
                cap = self.policy.max_llm_claims,
                "too many unverified claims, skipping model escalation"
            );
            return;
        }

        ctx.progress.thought(
            Self::NAME,
            &format!("Verifying {} claims against sources...", unmatched.len()),
        );
        for index in unmatched {
            let claim = &mut claims[index];
            match ctx.complete(escalation_prompt(claim, citations)).await {
                Ok(reply) => {
                    if let Some(indices) = parse_escalation_reply(&reply) {
                        claim.verified = true;
                        claim.sources = indices
                            .into_iter()
                            .filter_map(|n| citations.get(n.wrapping_sub(1)))
                            .take(3)
                            .map(|citation| SourceRef {
                                title: citation.title.clone(),
                                url: citation.url.clone(),
                                excerpt: String::new(),
                            })
                            .collect();
                    }
                }
                Err(error) => {
                    warn!(claim = %claim.claim, %error, "claim verification call failed, leaving unverified");
                }
            }
        }
    }
}

/// Tier one: the claim appears in a verified fact, or a verified fact
/// appears in the claim's context.
fn match_fact_table(claim: &FlaggedClaim, fact_table: &FactTable) -> Option<Vec<SourceRef>> {
    let claim_lower = claim.claim.to_lowercase();
    let context_lower = claim.context.to_lowercase();
    for (fact, entry) in fact_table {
        if !entry.verified {
            continue;
        }
        let fact_lower = fact.to_lowercase();
        if fact_lower.contains(&claim_lower) || context_lower.contains(&fact_lower) {
            return Some(entry.sources.clone());
        }
    }
    None
}

/// Byte window around a match, widened to the nearest char boundaries.
fn window(text: &str, start: usize, end: usize, margin: usize) -> &str {
    let mut lo = start.saturating_sub(margin);
    while lo > 0 && !text.is_char_boundary(lo) {
        lo -= 1;
    }
    let mut hi = (end + margin).min(text.len());
    while hi < text.len() && !text.is_char_boundary(hi) {
        hi += 1;
    }
    &text[lo..hi]
}

/// Fraction of the context's meaningful tokens found in the citation text.
fn token_overlap(context: &str, citation_text: &str) -> f64 {
    let lowered = context.to_lowercase();
    let tokens: Vec<&str> = lowered
        .split_whitespace()
        .map(|token| token.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|token| token.chars().count() > 3)
        .collect();
    if tokens.is_empty() {
        return 0.0;
    }
    let hits = tokens
        .iter()
        .filter(|token| citation_text.contains(**token))
        .count();
    hits as f64 / tokens.len() as f64
}

fn escalation_prompt(claim: &FlaggedClaim, citations: &[Citation]) -> String {
    let sources: Vec<String> = citations
        .iter()
        .enumerate()
        .map(|(index, citation)| {
            let excerpt: String = citation.excerpt.chars().take(200).collect();
            format!("{}. {}: {}", index + 1, citation.title, excerpt)
        })
        .collect();
    format!(
        "Determine whether the claim below is supported by any of the numbered sources.\n\n\
         Claim: {claim}\n\
         Context: {context}\n\n\
         Sources:\n{sources}\n\n\
         Answer with YES or NO. If YES, list the numbers of the supporting sources.",
        claim = claim.claim,
        context = claim.context,
        sources = sources.join("\n"),
    )
}

/// `Some(indices)` only for a YES answer; indices are 1-based.
fn parse_escalation_reply(reply: &str) -> Option<Vec<usize>> {
    let trimmed = reply.trim();
    if !trimmed.to_uppercase().starts_with("YES") {
        return None;
    }
    Some(
        DIGITS_RE
            .find_iter(trimmed)
            .filter_map(|m| m.as_str().parse().ok())
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;
    use draftforge_backend::BackendError;
    use draftforge_shared::{FactEntry, FactKind};

    fn sections(bodies: &[(&str, &str)]) -> SectionMap {
        let mut map = SectionMap::new();
        for (title, body) in bodies {
            map.insert(*title, *body);
        }
        map
    }

    fn citation(title: &str, excerpt: &str) -> Citation {
        Citation {
            title: title.to_string(),
            url: format!("https://example.com/{}", title.to_lowercase()),
            excerpt: excerpt.to_string(),
            relevance_score: 8.0,
        }
    }

    fn input(
        bodies: &[(&str, &str)],
        fact_table: FactTable,
        citations: Vec<Citation>,
    ) -> FactCheckInput {
        FactCheckInput {
            sections: sections(bodies),
            fact_table,
            citations,
        }
    }

    #[tokio::test]
    async fn flags_claims_and_annotates_sections_without_support() {
        let backend = ScriptedBackend::new(vec![]);
        let config = test_config();

        let outcome = FactChecker::new()
            .process(
                &ctx(&backend, &config),
                input(
                    &[(
                        "Adoption",
                        "Adoption grew by 45% according to the annual survey.",
                    )],
                    FactTable::new(),
                    vec![],
                ),
            )
            .await
            .unwrap();

        let claims: Vec<&str> = outcome
            .summary
            .flagged_claims
            .iter()
            .map(|c| c.claim.as_str())
            .collect();
        assert_eq!(claims, vec!["45%", "according to"]);
        assert_eq!(outcome.summary.verification_score, 0.0);
        // No citations, so no model escalation either.
        assert_eq!(backend.call_count(), 0);

        let body = outcome.sections.get("Adoption").unwrap();
        assert_eq!(body.matches("may require additional citations").count(), 1);
    }

    #[tokio::test]
    async fn percentages_verify_by_exact_substring_in_citation_text() {
        let backend = ScriptedBackend::new(vec![]);
        let config = test_config();

        let outcome = FactChecker::new()
            .process(
                &ctx(&backend, &config),
                input(
                    &[("Adoption", "Cluster adoption reached 45% last year.")],
                    FactTable::new(),
                    vec![citation(
                        "CNCF Survey",
                        "The survey found cluster adoption reached 45% in 2024.",
                    )],
                ),
            )
            .await
            .unwrap();

        let claim = &outcome.summary.flagged_claims[0];
        assert!(claim.verified);
        assert_eq!(claim.sources[0].title, "CNCF Survey");
        assert_eq!(outcome.summary.verification_score, 1.0);
        assert!(!outcome.sections.get("Adoption").unwrap().contains("*Note:"));
    }

    #[tokio::test]
    async fn verified_facts_supply_their_sources() {
        let backend = ScriptedBackend::new(vec![]);
        let config = test_config();

        let mut fact_table = FactTable::new();
        fact_table.insert(
            "Kubernetes adoption reached 96%".to_string(),
            FactEntry {
                kind: FactKind::Statistic,
                sources: vec![SourceRef {
                    title: "CNCF Survey".into(),
                    url: "https://cncf.io/survey".into(),
                    excerpt: String::new(),
                }],
                verified: true,
            },
        );

        let outcome = FactChecker::new()
            .process(
                &ctx(&backend, &config),
                input(
                    &[("Adoption", "Industry adoption reached 96% overall.")],
                    fact_table,
                    vec![],
                ),
            )
            .await
            .unwrap();

        let claim = &outcome.summary.flagged_claims[0];
        assert!(claim.verified);
        assert_eq!(claim.sources[0].url, "https://cncf.io/survey");
    }

    #[tokio::test]
    async fn phrase_claims_verify_by_token_overlap() {
        let backend = ScriptedBackend::new(vec![]);
        let config = test_config();

        let outcome = FactChecker::new()
            .process(
                &ctx(&backend, &config),
                input(
                    &[(
                        "Trends",
                        "According to recent surveys container adoption keeps growing quickly.",
                    )],
                    FactTable::new(),
                    vec![citation(
                        "Industry Report",
                        "Recent surveys show container adoption growing across enterprises.",
                    )],
                ),
            )
            .await
            .unwrap();

        let claim = &outcome.summary.flagged_claims[0];
        assert!(claim.verified, "overlap below threshold: {}", claim.context);
        assert_eq!(claim.sources[0].title, "Industry Report");
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn context_windows_respect_multibyte_boundaries() {
        let backend = ScriptedBackend::new(vec![]);
        let config = test_config();

        // 30 two-byte chars in front, so a naive byte offset would split one.
        let body = format!("{} studies show better results.", "é".repeat(30));
        let outcome = FactChecker::new()
            .process(
                &ctx(&backend, &config),
                input(&[("Results", &body)], FactTable::new(), vec![]),
            )
            .await
            .unwrap();

        let claim = &outcome.summary.flagged_claims[0];
        assert!(claim.context.contains("studies show"));
        assert!(claim.context.contains('é'));
    }

    #[tokio::test]
    async fn unmatched_claims_escalate_to_the_model() {
        let backend = ScriptedBackend::replying(&["YES, source 1 supports this."]);
        let config = test_config();

        let outcome = FactChecker::new()
            .process(
                &ctx(&backend, &config),
                input(
                    &[("Trends", "Orchestration spend hit 12 billion worldwide.")],
                    FactTable::new(),
                    vec![citation("Market Watch", "Totally unrelated words here.")],
                ),
            )
            .await
            .unwrap();

        assert_eq!(backend.call_count(), 1);
        assert!(backend.prompt(0).contains("Claim: 12 billion"));
        assert!(backend.prompt(0).contains("1. Market Watch"));

        let claim = &outcome.summary.flagged_claims[0];
        assert!(claim.verified);
        assert_eq!(claim.sources[0].title, "Market Watch");
        assert_eq!(outcome.summary.verification_score, 1.0);
    }

    #[tokio::test]
    async fn escalation_is_skipped_when_too_many_claims_are_open() {
        let backend = ScriptedBackend::new(vec![]);
        let config = test_config();
        let checker = FactChecker::with_policy(FactCheckPolicy {
            max_llm_claims: 1,
            ..FactCheckPolicy::default()
        });

        let outcome = checker
            .process(
                &ctx(&backend, &config),
                input(
                    &[(
                        "Trends",
                        "Spend hit 12 billion. Growth was 80% in regulated industries.",
                    )],
                    FactTable::new(),
                    vec![citation("Market Watch", "Totally unrelated words here.")],
                ),
            )
            .await
            .unwrap();

        assert_eq!(backend.call_count(), 0);
        assert_eq!(outcome.summary.verification_score, 0.0);
    }

    #[tokio::test]
    async fn failed_or_negative_escalations_leave_claims_unverified() {
        let backend = ScriptedBackend::new(vec![
            Err(BackendError::Timeout("deadline exceeded".into())),
            Ok("NO, none of the sources support this.".into()),
        ]);
        let config = test_config();

        let outcome = FactChecker::new()
            .process(
                &ctx(&backend, &config),
                input(
                    &[(
                        "Trends",
                        "Spend hit 12 billion. Growth was 80% in regulated industries.",
                    )],
                    FactTable::new(),
                    vec![citation("Market Watch", "Totally unrelated words here.")],
                ),
            )
            .await
            .unwrap();

        assert_eq!(backend.call_count(), 2);
        assert!(outcome.summary.flagged_claims.iter().all(|c| !c.verified));
        assert_eq!(outcome.summary.verification_score, 0.0);
        let body = outcome.sections.get("Trends").unwrap();
        assert_eq!(body.matches("may require additional citations").count(), 1);
    }
}

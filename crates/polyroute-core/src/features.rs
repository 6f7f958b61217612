//! Task feature extraction.
//!
//! Turns raw task text into a fixed-dimension [`TaskFeatures`] record.  Each
//! dimension is driven by a curated keyword list compiled into an
//! [`aho_corasick`] automaton, plus a few structural signals (code fences,
//! numbered steps) matched with [`regex`]:
//!
//! | Dimension             | Signal                                    | Saturates at |
//! |-----------------------|-------------------------------------------|--------------|
//! | `analysis_intensive`  | analyse / compare / evaluate ...          | 2 hits       |
//! | `creativity_required` | write / story / imagine ...               | 2 hits       |
//! | `technical_depth`     | code / algorithm / api ... + code fences  | 2 hits       |
//! | `urgency`             | urgent / asap / deadline ...              | 2 hits       |
//! | `factuality`          | what is / who is / cite ...               | 2 hits       |
//! | `complexity`          | mean of length (50 words) and indicator density (4 hits) |  |
//!
//! Extraction is deterministic and never fails: empty or whitespace-only text
//! yields [`TaskFeatures::floor`].  Caller-supplied [`TaskHints`] take
//! precedence over inferred values.

use aho_corasick::{AhoCorasick, MatchKind};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, RouterError};
use crate::provider::{Domain, clamp01};

// ---------------------------------------------------------------------------
// Keyword lists
// ---------------------------------------------------------------------------

// Entries are stems: a hit must start on a word boundary but may run on
// ("analy" matches "analyse", "analyze" and "analysis").

const ANALYSIS_TERMS: &[&str] = &[
    "analy", "compar", "evaluat", "assess", "examin", "investigat", "contrast",
    "review", "benchmark", "performance", "trade-off", "tradeoff", "pros and cons",
    "measure", "correlat", "statistic",
];

const CREATIVE_TERMS: &[&str] = &[
    "write", "story", "poem", "creative", "imagin", "invent", "brainstorm",
    "fiction", "compose", "lyrics", "slogan", "narrative", "design a", "novel",
];

const TECHNICAL_TERMS: &[&str] = &[
    "code", "coding", "algorithm", "function", "implement", "debug", "refactor",
    "compile", "api", "database", "sql", "class ", "struct", "rust", "python",
    "javascript", "typescript", "regex", "kubernetes", "docker", "stack trace",
    "unit test", "endpoint", "latency", "memory leak",
];

const URGENCY_TERMS: &[&str] = &[
    "urgent", "asap", "as soon as possible", "immediately", "right away",
    "quickly", "deadline", "emergency", "critical", "time-sensitive", "hurry",
];

const REASONING_TERMS: &[&str] = &[
    "why", "explain", "because", "therefore", "reason", "prove", "derive",
    "logic", "step by step", "deduce", "justify", "infer",
];

const FACTUAL_TERMS: &[&str] = &[
    "what is", "who is", "who was", "when did", "where is", "how many", "fact",
    "define", "definition", "cite", "source", "accurate", "verify", "according to",
];

const MULTIMODAL_TERMS: &[&str] = &[
    "image", "picture", "photo", "diagram", "screenshot", "audio", "video",
    "chart", "graph", "drawing", "illustration", "scan",
];

const COMPLEXITY_TERMS: &[&str] = &[
    "complex", "architecture", "optimiz", "optimis", "distributed", "concurren",
    "multi-step", "scalab", "comprehensive", "in-depth", "detailed", "system design",
    "edge case", "integrat",
];

// ---------------------------------------------------------------------------
// Thresholds
// ---------------------------------------------------------------------------

const ANALYSIS_THRESHOLD: f64 = 2.0;
const CREATIVITY_THRESHOLD: f64 = 2.0;
const TECHNICAL_THRESHOLD: f64 = 2.0;
const URGENCY_THRESHOLD: f64 = 2.0;
const FACTUALITY_THRESHOLD: f64 = 2.0;
const COMPLEXITY_INDICATOR_THRESHOLD: f64 = 4.0;
/// Word count at which the length component of complexity saturates.
const COMPLEXITY_LENGTH_WORDS: f64 = 50.0;
/// Complexity above which a task is assumed to need multi-step reasoning.
const REASONING_COMPLEXITY: f64 = 0.7;
/// Deadline assumed when an urgency context does not carry one.
const DEFAULT_DEADLINE_MINUTES: f64 = 60.0;
/// Rough characters-per-token ratio for token estimation.
const CHARS_PER_TOKEN: usize = 4;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Per-request feature vector.  All scalar fields are in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskFeatures {
    pub complexity: f64,
    pub urgency: f64,
    pub analysis_intensive: f64,
    pub creativity_required: f64,
    pub technical_depth: f64,
    pub domain: Domain,
    /// Approximate prompt size in tokens; `0` only for empty input.
    pub token_estimate: u32,
    pub multimodal: bool,
    pub reasoning: bool,
    pub factuality: f64,
}

impl TaskFeatures {
    /// Every dimension at its floor, conversational domain.
    pub fn floor() -> Self {
        Self {
            complexity: 0.0,
            urgency: 0.0,
            analysis_intensive: 0.0,
            creativity_required: 0.0,
            technical_depth: 0.0,
            domain: Domain::Conversational,
            token_estimate: 0,
            multimodal: false,
            reasoning: false,
            factuality: 0.0,
        }
    }
}

impl Default for TaskFeatures {
    fn default() -> Self {
        Self::floor()
    }
}

/// Caller-declared request priority.  Overrides inferred urgency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
    Critical,
}

impl Priority {
    pub fn urgency(self) -> f64 {
        match self {
            Self::Low => 0.1,
            Self::Normal => 0.4,
            Self::High => 0.7,
            Self::Critical => 1.0,
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = RouterError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "normal" => Ok(Self::Normal),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(RouterError::config(
                "priority",
                format!("unknown priority `{other}`"),
            )),
        }
    }
}

/// Situational urgency signals supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UrgencyContext {
    /// A user is actively waiting on the response.
    pub user_waiting: bool,
    /// Minutes until the result is needed; 60 when unknown.
    pub deadline_minutes: Option<f64>,
    /// How many times this task has already been retried.
    pub retry_attempt: u32,
    /// A previous attempt failed.
    pub error_occurred: bool,
}

impl UrgencyContext {
    /// Urgency in `[0, 1]` implied by the context alone.
    pub fn score(&self) -> f64 {
        let mut urgency = 0.0;
        if self.user_waiting {
            urgency += 0.3;
        }
        urgency += (f64::from(self.retry_attempt) * 0.1).min(0.4);
        if self.error_occurred {
            urgency += 0.2;
        }
        let deadline = self
            .deadline_minutes
            .filter(|d| d.is_finite())
            .unwrap_or(DEFAULT_DEADLINE_MINUTES);
        urgency += ((120.0 - deadline) / 120.0).max(0.0) * 0.3;
        clamp01(urgency)
    }
}

/// Optional caller overrides for a single request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskHints {
    pub domain: Option<Domain>,
    pub preferred_provider: Option<String>,
    pub priority: Option<Priority>,
    pub urgency_context: Option<UrgencyContext>,
}

// ---------------------------------------------------------------------------
// Extractor
// ---------------------------------------------------------------------------

/// A compiled keyword list.
struct KeywordSet {
    automaton: AhoCorasick,
    len: usize,
}

impl KeywordSet {
    fn build(name: &str, terms: &[&str]) -> Result<Self> {
        let automaton = AhoCorasick::builder()
            .ascii_case_insensitive(true)
            .match_kind(MatchKind::LeftmostLongest)
            .build(terms)
            .map_err(|e| RouterError::Internal(format!("keyword set `{name}`: {e}")))?;
        Ok(Self {
            automaton,
            len: terms.len(),
        })
    }

    /// Number of distinct terms that occur at a word start in `text`.
    fn distinct_hits(&self, text: &str) -> usize {
        let bytes = text.as_bytes();
        let mut seen = vec![false; self.len];
        for mat in self.automaton.find_iter(text) {
            let at_word_start = mat.start() == 0 || !bytes[mat.start() - 1].is_ascii_alphanumeric();
            if at_word_start {
                seen[mat.pattern().as_usize()] = true;
            }
        }
        seen.into_iter().filter(|s| *s).count()
    }
}

/// Raw per-dimension hit counts, before normalisation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Hits {
    analysis: usize,
    creative: usize,
    technical: usize,
    urgency: usize,
    reasoning: usize,
    factual: usize,
    multimodal: usize,
    complexity: usize,
}

/// Stateless, thread-safe feature extractor.
///
/// Construction compiles every keyword automaton once; [`FeatureExtractor::extract`]
/// is then a pure function of its input.
pub struct FeatureExtractor {
    analysis: KeywordSet,
    creative: KeywordSet,
    technical: KeywordSet,
    urgency: KeywordSet,
    reasoning: KeywordSet,
    factual: KeywordSet,
    multimodal: KeywordSet,
    complexity: KeywordSet,
    code_block: Regex,
    numbered_step: Regex,
}

impl FeatureExtractor {
    /// Compile the keyword automata and structural patterns.
    pub fn new() -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| RouterError::Internal(format!("pattern `{pattern}`: {e}")))
        };

        Ok(Self {
            analysis: KeywordSet::build("analysis", ANALYSIS_TERMS)?,
            creative: KeywordSet::build("creative", CREATIVE_TERMS)?,
            technical: KeywordSet::build("technical", TECHNICAL_TERMS)?,
            urgency: KeywordSet::build("urgency", URGENCY_TERMS)?,
            reasoning: KeywordSet::build("reasoning", REASONING_TERMS)?,
            factual: KeywordSet::build("factual", FACTUAL_TERMS)?,
            multimodal: KeywordSet::build("multimodal", MULTIMODAL_TERMS)?,
            complexity: KeywordSet::build("complexity", COMPLEXITY_TERMS)?,
            code_block: compile(r"```|`[^`\n]+`")?,
            numbered_step: compile(r"(?m)^\s*\d{1,2}[.)]\s+\S")?,
        })
    }

    /// Extract features with no caller hints.
    pub fn extract(&self, text: &str) -> TaskFeatures {
        self.extract_with_hints(text, &TaskHints::default())
    }

    /// Extract features, letting explicit hints override inferred values.
    pub fn extract_with_hints(&self, text: &str, hints: &TaskHints) -> TaskFeatures {
        let mut features = if text.trim().is_empty() {
            TaskFeatures::floor()
        } else {
            self.infer(text)
        };

        if let Some(context) = &hints.urgency_context {
            features.urgency = features.urgency.max(context.score());
        }
        if let Some(priority) = hints.priority {
            features.urgency = priority.urgency();
        }
        if let Some(domain) = hints.domain {
            features.domain = domain;
        }

        tracing::trace!(
            complexity = features.complexity,
            urgency = features.urgency,
            domain = %features.domain,
            tokens = features.token_estimate,
            "task features extracted"
        );
        features
    }

    // -- Private helpers ----------------------------------------------------

    fn infer(&self, text: &str) -> TaskFeatures {
        let mut hits = Hits {
            analysis: self.analysis.distinct_hits(text),
            creative: self.creative.distinct_hits(text),
            technical: self.technical.distinct_hits(text),
            urgency: self.urgency.distinct_hits(text),
            reasoning: self.reasoning.distinct_hits(text),
            factual: self.factual.distinct_hits(text),
            multimodal: self.multimodal.distinct_hits(text),
            complexity: self.complexity.distinct_hits(text),
        };

        let has_code = self.code_block.is_match(text);
        if has_code {
            hits.technical += 1;
        }
        let multi_step = self.numbered_step.find_iter(text).count() >= 2;

        let word_count = text.split_whitespace().count() as f64;
        let length_component = (word_count / COMPLEXITY_LENGTH_WORDS).min(1.0);
        let indicator_hits = hits.complexity
            + hits.analysis
            + hits.technical
            + hits.reasoning
            + usize::from(multi_step);
        let density = ratio(indicator_hits, COMPLEXITY_INDICATOR_THRESHOLD);
        let complexity = clamp01((length_component + density) / 2.0);

        TaskFeatures {
            complexity,
            urgency: ratio(hits.urgency, URGENCY_THRESHOLD),
            analysis_intensive: ratio(hits.analysis, ANALYSIS_THRESHOLD),
            creativity_required: ratio(hits.creative, CREATIVITY_THRESHOLD),
            technical_depth: ratio(hits.technical, TECHNICAL_THRESHOLD),
            domain: classify_domain(&hits),
            token_estimate: estimate_tokens(text),
            multimodal: hits.multimodal > 0,
            reasoning: hits.reasoning > 0 || complexity > REASONING_COMPLEXITY,
            factuality: ratio(hits.factual, FACTUALITY_THRESHOLD),
        }
    }
}

/// First match wins: technical > analytical > creative > factual.
fn classify_domain(hits: &Hits) -> Domain {
    if hits.technical > 0 {
        Domain::Technical
    } else if hits.analysis > 0 {
        Domain::Analytical
    } else if hits.creative > 0 {
        Domain::Creative
    } else if hits.factual > 0 {
        Domain::Factual
    } else {
        Domain::Conversational
    }
}

fn ratio(count: usize, threshold: f64) -> f64 {
    (count as f64 / threshold).min(1.0)
}

fn estimate_tokens(text: &str) -> u32 {
    let chars = text.chars().count();
    let tokens = chars.div_ceil(CHARS_PER_TOKEN).max(1);
    u32::try_from(tokens).unwrap_or(u32::MAX)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> FeatureExtractor {
        FeatureExtractor::new().expect("keyword sets compile")
    }

    #[test]
    fn empty_input_yields_floor() {
        let fx = extractor();
        assert_eq!(fx.extract(""), TaskFeatures::floor());
        assert_eq!(fx.extract("   \n\t "), TaskFeatures::floor());
    }

    #[test]
    fn analysis_task_is_detected() {
        let f = extractor().extract("Analyze and compare these two algorithms for performance");
        assert_eq!(f.analysis_intensive, 1.0);
        assert!(f.technical_depth > 0.0);
        // Technical outranks analytical in domain priority.
        assert_eq!(f.domain, Domain::Technical);
        assert!(f.complexity > 0.0 && f.complexity <= 1.0);
    }

    #[test]
    fn creative_task_is_detected() {
        let f = extractor().extract("Write a short story and a poem about the sea");
        assert_eq!(f.domain, Domain::Creative);
        assert_eq!(f.creativity_required, 1.0);
        assert_eq!(f.technical_depth, 0.0);
    }

    #[test]
    fn factual_and_conversational_domains() {
        let fx = extractor();
        assert_eq!(fx.extract("Who is the president of Finland?").domain, Domain::Factual);
        assert_eq!(fx.extract("hello there, how are you").domain, Domain::Conversational);
    }

    #[test]
    fn stems_require_word_start() {
        let fx = extractor();
        // "recode" contains "code" but not at a word start.
        assert_eq!(fx.extract("please recode nothing").technical_depth, 0.0);
        assert!(fx.extract("coding help").technical_depth > 0.0);
    }

    #[test]
    fn repeated_keyword_counts_once() {
        let f = extractor().extract("urgent urgent urgent urgent");
        assert_eq!(f.urgency, 0.5);
    }

    #[test]
    fn code_fence_raises_technical_depth() {
        let f = extractor().extract("What does this do?\n```\nlet x = 1;\n```");
        assert!(f.technical_depth >= 0.5);
        assert_eq!(f.domain, Domain::Technical);
    }

    #[test]
    fn long_text_raises_complexity() {
        let fx = extractor();
        let short = fx.extract("summarize this");
        let long = fx.extract(&"word ".repeat(60));
        assert!(long.complexity > short.complexity);
        assert_eq!(long.complexity, 0.5);
    }

    #[test]
    fn multimodal_and_reasoning_flags() {
        let f = extractor().extract("Explain why this chart trends upward");
        assert!(f.multimodal);
        assert!(f.reasoning);
    }

    #[test]
    fn hints_override_inference() {
        let fx = extractor();
        let hints = TaskHints {
            domain: Some(Domain::Creative),
            priority: Some(Priority::Critical),
            ..TaskHints::default()
        };
        let f = fx.extract_with_hints("debug this function", &hints);
        assert_eq!(f.domain, Domain::Creative);
        assert_eq!(f.urgency, 1.0);
    }

    #[test]
    fn urgency_context_raises_urgency() {
        let fx = extractor();
        let hints = TaskHints {
            urgency_context: Some(UrgencyContext {
                user_waiting: true,
                deadline_minutes: Some(0.0),
                retry_attempt: 2,
                error_occurred: true,
            }),
            ..TaskHints::default()
        };
        let f = fx.extract_with_hints("hello", &hints);
        // 0.3 + 0.2 + 0.2 + 0.3
        assert!((f.urgency - 1.0).abs() < 1e-9);
    }

    #[test]
    fn missing_deadline_counts_as_an_hour() {
        let context = UrgencyContext::default();
        // (120 - 60) / 120 * 0.3
        assert!((context.score() - 0.15).abs() < 1e-12);

        let relaxed = UrgencyContext {
            deadline_minutes: Some(240.0),
            ..UrgencyContext::default()
        };
        assert_eq!(relaxed.score(), 0.0);
    }

    #[test]
    fn token_estimate_is_positive_for_text() {
        let fx = extractor();
        assert_eq!(fx.extract("hi").token_estimate, 1);
        assert_eq!(fx.extract("abcdefgh").token_estimate, 2);
    }

    #[test]
    fn extraction_is_deterministic() {
        let fx = extractor();
        let text = "Implement a distributed cache and explain the trade-offs quickly";
        assert_eq!(fx.extract(text), fx.extract(text));
    }
}

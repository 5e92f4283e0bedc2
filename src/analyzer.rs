use crate::types::Keyword;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use tracing::debug;

/// Default weights used when no active keywords are configured, matching
/// the seed vocabulary the system ships with.
pub fn default_weights() -> Vec<(String, f64)> {
    [
        ("chinese students", 3.0),
        ("international students", 2.5),
        ("adelaide", 2.0),
        ("china", 1.5),
        ("chinese", 1.5),
        ("safety", 2.0),
        ("accommodation", 1.5),
        ("visa", 2.0),
        ("part-time job", 1.5),
        ("university", 1.0),
        ("education", 1.0),
        ("study", 1.0),
        ("australia", 0.5),
        ("tuition fee", 1.8),
        ("immigration", 1.7),
        ("discrimination", 2.2),
        ("covid", 1.0),
        ("mandarin", 1.2),
        ("cultural", 1.0),
        ("housing", 1.5),
    ]
    .into_iter()
    .map(|(term, weight)| (term.to_string(), weight))
    .collect()
}

/// Output of analyzing one item's text.
#[derive(Debug, Clone)]
pub struct Analysis {
    /// Normalized keyword match strength in [0.0, 1.0].
    pub relevance: f64,
    /// Polarity estimate in [-1.0, 1.0].
    pub sentiment: f64,
    /// Keywords with at least one match, in weight-table order.
    pub matched_keywords: Vec<String>,
}

/// Classification band for a sentiment score. Used for log labels only,
/// never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SentimentLabel {
    Positive,
    Neutral,
    Negative,
}

impl SentimentLabel {
    pub fn from_score(score: f64) -> Self {
        if score > 0.25 {
            SentimentLabel::Positive
        } else if score < -0.25 {
            SentimentLabel::Negative
        } else {
            SentimentLabel::Neutral
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentLabel::Positive => "positive",
            SentimentLabel::Neutral => "neutral",
            SentimentLabel::Negative => "negative",
        }
    }
}

struct CompiledKeyword {
    term: String,
    weight: f64,
    pattern: Regex,
}

/// Relevance and sentiment scorer over an immutable keyword snapshot.
///
/// Construction compiles one word-boundary pattern per keyword; after
/// that the analyzer is read-only and safe to share across workers.
pub struct ContentAnalyzer {
    keywords: Vec<CompiledKeyword>,
    total_weight: f64,
    occurrence_cap: u32,
}

impl ContentAnalyzer {
    /// Snapshot the given keywords into an analyzer, preserving their
    /// order. Inactive keywords are skipped. Falls back to the default
    /// vocabulary when none are active.
    pub fn from_keywords(keywords: &[Keyword], occurrence_cap: u32) -> Self {
        let weights: Vec<(String, f64)> = keywords
            .iter()
            .filter(|k| k.is_active)
            .map(|k| (k.term.clone(), k.weight))
            .collect();

        if weights.is_empty() {
            debug!("no active keywords configured, using default vocabulary");
            Self::from_weights(default_weights(), occurrence_cap)
        } else {
            Self::from_weights(weights, occurrence_cap)
        }
    }

    /// Builds an analyzer from raw (term, weight) pairs, in order.
    pub fn from_weights(weights: Vec<(String, f64)>, occurrence_cap: u32) -> Self {
        let mut compiled = Vec::with_capacity(weights.len());
        let mut total_weight = 0.0;

        for (term, weight) in weights {
            let escaped = regex::escape(&term.to_lowercase());
            // Terms come from a trusted vocabulary; after escaping, the
            // pattern cannot fail to compile.
            let pattern = Regex::new(&format!(r"\b{escaped}\b"))
                .unwrap_or_else(|_| Regex::new(r"\b\B").unwrap());
            total_weight += weight;
            compiled.push(CompiledKeyword { term, weight, pattern });
        }

        Self {
            keywords: compiled,
            total_weight,
            occurrence_cap,
        }
    }

    pub fn keyword_count(&self) -> usize {
        self.keywords.len()
    }

    /// Scores a title+body pair. Pure; no I/O, no shared state.
    pub fn analyze(&self, title: &str, body: &str) -> Analysis {
        let text = format!("{title} {body}").to_lowercase();

        let (relevance, matched_keywords) = self.relevance(&text);
        let sentiment = self.sentiment(&text);

        debug!(
            relevance = format!("{relevance:.2}").as_str(),
            sentiment = format!("{sentiment:.2}").as_str(),
            label = SentimentLabel::from_score(sentiment).as_str(),
            matched = matched_keywords.len(),
            "analyzed item text"
        );

        Analysis {
            relevance,
            sentiment,
            matched_keywords,
        }
    }

    /// Weighted whole-word occurrence score, normalized against the
    /// table's total weight times the assumed occurrence cap.
    fn relevance(&self, text: &str) -> (f64, Vec<String>) {
        let mut matched = Vec::new();
        let mut raw_score = 0.0;

        for keyword in &self.keywords {
            let occurrences = keyword.pattern.find_iter(text).count();
            if occurrences > 0 {
                matched.push(keyword.term.clone());
                raw_score += keyword.weight * occurrences as f64;
            }
        }

        let max_possible = self.total_weight * f64::from(self.occurrence_cap);
        let relevance = if max_possible > 0.0 {
            (raw_score / max_possible).min(1.0)
        } else {
            0.0
        };

        (relevance, matched)
    }

    /// Mean lexicon polarity over sentiment-bearing tokens, with the
    /// sign flipped when a negator appears within the three preceding
    /// tokens. 0.0 when the text carries no polar words.
    fn sentiment(&self, text: &str) -> f64 {
        let tokens: Vec<&str> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .collect();

        let mut total = 0.0;
        let mut hits = 0usize;

        for i in 0..tokens.len() {
            let base = match POLARITY_LEXICON.get(tokens[i]) {
                Some(score) => *score,
                None => continue,
            };
            let negated = (1..=3).any(|k| i >= k && is_negator(tokens[i - k]));
            total += if negated { -base } else { base };
            hits += 1;
        }

        if hits == 0 {
            0.0
        } else {
            (total / hits as f64).clamp(-1.0, 1.0)
        }
    }
}

fn is_negator(token: &str) -> bool {
    matches!(
        token,
        "not" | "no" | "never" | "cannot" | "without" | "hardly" | "barely"
    )
}

/// Signed polarity per word: strongly polar words at ±1.0, milder ones
/// at ±0.5, so the mean rises with the density of strong words.
static POLARITY_LEXICON: Lazy<HashMap<&'static str, f64>> = Lazy::new(|| {
    let mut lexicon = HashMap::new();
    let strong_positive = [
        "excellent", "outstanding", "wonderful", "amazing", "fantastic", "thrilled",
        "delighted", "celebrated", "triumph", "breakthrough", "praised", "love",
    ];
    let mild_positive = [
        "good", "great", "positive", "welcomed", "welcome", "improved", "improving",
        "support", "supported", "safe", "happy", "benefit", "helpful", "success",
        "successful", "opportunity", "win", "gain", "progress", "relief",
    ];
    let strong_negative = [
        "terrible", "horrible", "tragic", "devastating", "disaster", "catastrophe",
        "outrage", "appalling", "crisis", "hate", "violent", "assault",
    ];
    let mild_negative = [
        "bad", "poor", "negative", "concern", "concerned", "worried", "worry",
        "fear", "unsafe", "risk", "problem", "threat", "decline", "loss", "fail",
        "failed", "failure", "scam", "fraud", "discrimination", "attack",
    ];

    for word in strong_positive {
        lexicon.insert(word, 1.0);
    }
    for word in mild_positive {
        lexicon.insert(word, 0.5);
    }
    for word in strong_negative {
        lexicon.insert(word, -1.0);
    }
    for word in mild_negative {
        lexicon.insert(word, -0.5);
    }
    lexicon
});

//! Watermark text classification and OCR-tolerant text similarity.

use std::collections::HashSet;

use regex::{Regex, RegexSet};

use crate::config::TextConfig;
use crate::error::Result;

/// The first rule that flagged a text as watermark-like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatermarkIndicator {
    /// `www.`, a known domain suffix, or any `name.tld` shape.
    Url,
    /// A whole-word promotional or streaming keyword.
    PromoKeyword,
    /// A copyright or trademark mark.
    Glyph,
    /// A short text containing a keyword anywhere.
    ShortPromo,
    /// A fragment of a known watermark phrase.
    VocabularyFragment,
}

/// Decides whether recognized text looks like a watermark.
///
/// Rules are checked in order and the first match wins. The last rule accepts
/// OCR fragments of the configured vocabulary, so short reads of a watermark
/// in motion still count.
#[derive(Debug, Clone)]
pub struct TextClassifier {
    url: Regex,
    promo: Option<Regex>,
    keywords: Vec<String>,
    glyphs: Vec<String>,
    short_text_len: usize,
    phrases: Vec<String>,
    counters: RegexSet,
}

impl TextClassifier {
    /// Compile the classifier from its vocabulary.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidPattern`] if a counter pattern does not
    /// compile.
    pub fn new(config: &TextConfig) -> Result<Self> {
        let suffixes = config
            .url_suffixes
            .iter()
            .map(|s| regex::escape(&s.to_lowercase()))
            .collect::<Vec<_>>();
        let mut url = String::from(r"(?i)www\.|[a-z0-9]+\.[a-z]{2,}");
        if !suffixes.is_empty() {
            url.push_str(&format!(r"|\.(?:{})\b", suffixes.join("|")));
        }

        let keywords: Vec<String> = config
            .promo_keywords
            .iter()
            .map(|k| k.to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        let promo = if keywords.is_empty() {
            None
        } else {
            let alternatives = keywords.iter().map(|k| regex::escape(k)).collect::<Vec<_>>();
            Some(Regex::new(&format!(
                r"(?i)\b(?:{})\b",
                alternatives.join("|")
            ))?)
        };

        Ok(Self {
            url: Regex::new(&url)?,
            promo,
            keywords,
            glyphs: config.glyphs.iter().map(|g| g.to_lowercase()).collect(),
            short_text_len: config.short_text_len,
            phrases: config.vocabulary.iter().map(|p| p.to_lowercase()).collect(),
            counters: RegexSet::new(&config.counter_patterns)?,
        })
    }

    /// Which rule, if any, flags `text` as watermark-like.
    #[must_use]
    pub fn classify(&self, text: &str) -> Option<WatermarkIndicator> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }
        let lower = trimmed.to_lowercase();

        if self.url.is_match(trimmed) {
            return Some(WatermarkIndicator::Url);
        }
        if self.promo.as_ref().is_some_and(|re| re.is_match(trimmed)) {
            return Some(WatermarkIndicator::PromoKeyword);
        }
        if self.glyphs.iter().any(|g| lower.contains(g.as_str())) {
            return Some(WatermarkIndicator::Glyph);
        }
        if trimmed.chars().count() < self.short_text_len
            && self.keywords.iter().any(|k| lower.contains(k.as_str()))
        {
            return Some(WatermarkIndicator::ShortPromo);
        }
        if self.is_vocabulary_fragment(&lower) {
            return Some(WatermarkIndicator::VocabularyFragment);
        }
        None
    }

    /// Whether `text` looks like a watermark.
    #[must_use]
    pub fn is_watermark(&self, text: &str) -> bool {
        self.classify(text).is_some()
    }

    /// Whether `text` looks like an on-screen timestamp or frame counter.
    #[must_use]
    pub fn is_counter_text(&self, text: &str) -> bool {
        self.counters.is_match(text)
    }

    fn is_vocabulary_fragment(&self, lower: &str) -> bool {
        let fragment = normalize(lower);
        if fragment.chars().count() >= 2
            && self
                .phrases
                .iter()
                .any(|phrase| normalize(phrase).contains(&fragment))
        {
            return true;
        }
        self.phrases.iter().any(|phrase| lower.contains(phrase.as_str()))
    }
}

/// Lowercase and drop spaces, dashes and underscores.
pub(crate) fn normalize(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace() && *c != '-' && *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Approximate text matching between OCR reads of the same watermark.
///
/// The timeline builder already links texts that are equal or contain one
/// another after normalization; implementations only decide the fuzzy cases.
pub trait TextSimilarity: Send + Sync {
    /// Whether `a` and `b` plausibly come from the same on-screen text.
    fn is_similar(&self, a: &str, b: &str) -> bool;
}

/// Default similarity policy tuned for OCR noise.
///
/// Two texts match on any of: equality after normalization, containment,
/// both being fragments of one vocabulary phrase, at least 60% shared
/// character pairs, a shared three-character substring, or a small
/// normalized edit distance.
#[derive(Debug, Clone)]
pub struct FragmentSimilarity {
    phrases: Vec<String>,
    min_shared_pairs: f64,
    max_edit_ratio: f64,
}

impl FragmentSimilarity {
    /// Similarity using the configured watermark vocabulary.
    #[must_use]
    pub fn new(config: &TextConfig) -> Self {
        Self {
            phrases: config.vocabulary.iter().map(|p| normalize(p)).collect(),
            min_shared_pairs: 0.6,
            max_edit_ratio: 0.34,
        }
    }

    fn same_phrase(&self, a: &str, b: &str) -> bool {
        self.phrases
            .iter()
            .any(|phrase| phrase.contains(a) && phrase.contains(b))
    }
}

impl Default for FragmentSimilarity {
    fn default() -> Self {
        Self::new(&TextConfig::default())
    }
}

impl TextSimilarity for FragmentSimilarity {
    #[allow(clippy::cast_precision_loss)]
    fn is_similar(&self, a: &str, b: &str) -> bool {
        let a = normalize(a);
        let b = normalize(b);
        if a.is_empty() || b.is_empty() {
            return false;
        }
        if a == b || a.contains(&b) || b.contains(&a) {
            return true;
        }

        let (len_a, len_b) = (a.chars().count(), b.chars().count());
        let shorter = len_a.min(len_b);
        if shorter >= 2 && self.same_phrase(&a, &b) {
            return true;
        }
        if shorter < 3 {
            return false;
        }

        let pairs_a = char_pairs(&a);
        let pairs_b = char_pairs(&b);
        let shared = pairs_a.intersection(&pairs_b).count();
        let smaller = pairs_a.len().min(pairs_b.len());
        if smaller > 0 && shared as f64 >= self.min_shared_pairs * smaller as f64 {
            return true;
        }

        if shorter >= 4 && shares_trigram(&a, &b) {
            return true;
        }

        let distance = levenshtein(&a, &b);
        distance as f64 / len_a.max(len_b) as f64 <= self.max_edit_ratio
    }
}

fn char_pairs(text: &str) -> HashSet<(char, char)> {
    let chars: Vec<char> = text.chars().collect();
    chars.windows(2).map(|w| (w[0], w[1])).collect()
}

fn shares_trigram(a: &str, b: &str) -> bool {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let grams: HashSet<&[char]> = a.windows(3).collect();
    b.windows(3).any(|w| grams.contains(w))
}

fn levenshtein(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut row = vec![0; b.len() + 1];
    for (i, ca) in a.chars().enumerate() {
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != *cb);
            row[j + 1] = substitution.min(prev[j + 1] + 1).min(row[j] + 1);
        }
        std::mem::swap(&mut prev, &mut row);
    }
    prev[b.len()]
}

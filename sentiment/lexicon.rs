//! Word-list polarity scorer for campaign copy and customer feedback.

use super::PolarityScorer;
use ahash::AHashMap;

/// Factor applied to a sentiment word that follows a negator.
const NEGATION_FACTOR: f64 = -0.5;

const POSITIVE_WORDS: &[(&str, f64)] = &[
    ("love", 0.5),
    ("loved", 0.7),
    ("lovely", 0.5),
    ("like", 0.2),
    ("great", 0.8),
    ("good", 0.7),
    ("better", 0.5),
    ("best", 1.0),
    ("excellent", 1.0),
    ("amazing", 0.6),
    ("awesome", 1.0),
    ("wonderful", 1.0),
    ("fantastic", 0.4),
    ("perfect", 1.0),
    ("nice", 0.6),
    ("happy", 0.8),
    ("glad", 0.5),
    ("enjoy", 0.4),
    ("enjoyed", 0.4),
    ("beautiful", 0.85),
    ("exciting", 0.3),
    ("innovative", 0.5),
    ("effective", 0.6),
    ("engaging", 0.5),
    ("impressive", 1.0),
    ("helpful", 0.5),
    ("satisfied", 0.5),
    ("recommend", 0.4),
    ("easy", 0.43),
    ("fast", 0.2),
    ("free", 0.4),
    ("valuable", 0.6),
    ("successful", 0.75),
    ("success", 0.3),
    ("win", 0.8),
    ("fun", 0.3),
    ("fresh", 0.3),
    ("clear", 0.1),
    ("positive", 0.23),
];

const NEGATIVE_WORDS: &[(&str, f64)] = &[
    ("hate", -0.8),
    ("hated", -0.9),
    ("bad", -0.7),
    ("worse", -0.4),
    ("worst", -1.0),
    ("terrible", -1.0),
    ("awful", -1.0),
    ("horrible", -1.0),
    ("poor", -0.4),
    ("disappointing", -0.6),
    ("disappointed", -0.75),
    ("boring", -1.0),
    ("annoying", -0.8),
    ("confusing", -0.3),
    ("sad", -0.5),
    ("angry", -0.5),
    ("useless", -0.5),
    ("slow", -0.3),
    ("expensive", -0.5),
    ("broken", -0.4),
    ("spam", -0.6),
    ("misleading", -0.6),
    ("irrelevant", -0.4),
    ("fail", -0.5),
    ("failed", -0.5),
    ("failure", -0.3),
    ("problem", -0.3),
    ("waste", -0.2),
    ("ugly", -0.7),
    ("negative", -0.3),
];

const NEGATORS: &[&str] = &[
    "not", "no", "never", "neither", "nor", "cannot", "cant", "dont", "doesnt", "didnt", "isnt",
    "wasnt", "wont", "hardly", "barely",
];

const INTENSIFIERS: &[(&str, f64)] = &[
    ("very", 1.3),
    ("really", 1.3),
    ("extremely", 1.5),
    ("incredibly", 1.5),
    ("absolutely", 1.5),
    ("so", 1.3),
    ("super", 1.3),
    ("highly", 1.3),
    ("truly", 1.2),
    ("slightly", 0.5),
    ("somewhat", 0.7),
    ("fairly", 0.8),
];

/// Deterministic lexicon scorer.
///
/// The polarity of a text is the mean polarity of the sentiment words it
/// contains. A negator flips and halves the next sentiment word, an
/// intensifier scales it. Text without sentiment words scores zero.
#[derive(Debug, Clone)]
pub struct LexiconScorer {
    words: AHashMap<String, f64>,
    intensifiers: AHashMap<String, f64>,
}

impl Default for LexiconScorer {
    fn default() -> Self {
        Self::new()
    }
}

impl LexiconScorer {
    pub fn new() -> Self {
        let words = POSITIVE_WORDS
            .iter()
            .chain(NEGATIVE_WORDS)
            .map(|(word, score)| (word.to_string(), *score))
            .collect();
        let intensifiers = INTENSIFIERS
            .iter()
            .map(|(word, factor)| (word.to_string(), *factor))
            .collect();
        Self {
            words,
            intensifiers,
        }
    }

    /// Adds or replaces a word, for domain vocabularies.
    pub fn with_word(mut self, word: &str, polarity: f64) -> Self {
        self.words.insert(word.to_lowercase(), polarity.clamp(-1.0, 1.0));
        self
    }

    pub fn word_polarity(&self, word: &str) -> Option<f64> {
        self.words.get(&word.to_lowercase()).copied()
    }

    fn is_negator(token: &str) -> bool {
        NEGATORS.contains(&token) || token.ends_with("n't")
    }
}

/// Lowercased words, split on anything that is not a letter, digit or apostrophe.
fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\'' || c == '\u{2019}'))
        .filter(|token| !token.is_empty())
        .map(|token| token.replace('\u{2019}', "'").to_lowercase())
}

impl PolarityScorer for LexiconScorer {
    fn polarity(&self, text: &str) -> f64 {
        let mut scores: Vec<f64> = Vec::new();
        let mut negate_next = false;
        let mut intensity = 1.0;

        for token in tokenize(text) {
            if Self::is_negator(&token) {
                negate_next = true;
                continue;
            }
            if let Some(factor) = self.intensifiers.get(&token) {
                intensity *= factor;
                continue;
            }
            if let Some(&polarity) = self.words.get(&token) {
                let mut score = (polarity * intensity).clamp(-1.0, 1.0);
                if negate_next {
                    score *= NEGATION_FACTOR;
                }
                scores.push(score);
            }
            negate_next = false;
            intensity = 1.0;
        }

        if scores.is_empty() {
            return 0.0;
        }
        (scores.iter().sum::<f64>() / scores.len() as f64).clamp(-1.0, 1.0)
    }
}

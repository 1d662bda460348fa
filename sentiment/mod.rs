//! # Sentiment Scoring
//!
//! Free-text polarity scoring for campaign messages and customer feedback.
//! The scorer itself is pluggable through [`PolarityScorer`]; the built-in
//! [`LexiconScorer`] is a deterministic word-list model.

pub mod lexicon;

pub use lexicon::LexiconScorer;

use std::fmt;
use thiserror::Error;

/// Anything that maps text to a polarity in `[-1.0, 1.0]`.
pub trait PolarityScorer {
    fn polarity(&self, text: &str) -> f64;
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum InputValidationError {
    #[error("Please enter text for analysis.")]
    EmptyText,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SentimentLabel {
    Positive,
    Negative,
    Neutral,
}

impl SentimentLabel {
    /// Positive above zero, negative below, neutral at exactly zero.
    pub fn from_polarity(polarity: f64) -> Self {
        if polarity > 0.0 {
            SentimentLabel::Positive
        } else if polarity < 0.0 {
            SentimentLabel::Negative
        } else {
            SentimentLabel::Neutral
        }
    }
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SentimentLabel::Positive => "Positive Sentiment",
            SentimentLabel::Negative => "Negative Sentiment",
            SentimentLabel::Neutral => "Neutral Sentiment",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SentimentReport {
    pub polarity: f64,
    pub label: SentimentLabel,
}

/// Validates input text and classifies the scorer's polarity.
#[derive(Debug, Clone, Default)]
pub struct SentimentAnalyzer<S = LexiconScorer> {
    scorer: S,
}

impl<S: PolarityScorer> SentimentAnalyzer<S> {
    pub fn new(scorer: S) -> Self {
        Self { scorer }
    }

    pub fn analyze(&self, text: &str) -> Result<SentimentReport, InputValidationError> {
        if text.trim().is_empty() {
            return Err(InputValidationError::EmptyText);
        }
        let polarity = self.scorer.polarity(text).clamp(-1.0, 1.0);
        log::debug!("Scored {} characters at polarity {polarity}", text.len());
        Ok(SentimentReport {
            polarity,
            label: SentimentLabel::from_polarity(polarity),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct FixedScorer {
        value: f64,
        calls: Cell<usize>,
    }

    impl FixedScorer {
        fn new(value: f64) -> Self {
            Self {
                value,
                calls: Cell::new(0),
            }
        }
    }

    impl PolarityScorer for &FixedScorer {
        fn polarity(&self, _: &str) -> f64 {
            self.calls.set(self.calls.get() + 1);
            self.value
        }
    }

    #[test]
    fn test_classification_boundaries() {
        for (value, expected) in [
            (1e-9, SentimentLabel::Positive),
            (0.0, SentimentLabel::Neutral),
            (-1e-9, SentimentLabel::Negative),
        ] {
            let scorer = FixedScorer::new(value);
            let report = SentimentAnalyzer::new(&scorer).analyze("anything").unwrap();
            assert_eq!(report.label, expected, "polarity {value}");
        }
    }

    #[test]
    fn test_empty_text_never_reaches_scorer() {
        let scorer = FixedScorer::new(0.5);
        let analyzer = SentimentAnalyzer::new(&scorer);
        assert_eq!(analyzer.analyze(""), Err(InputValidationError::EmptyText));
        assert_eq!(analyzer.analyze("  \n\t"), Err(InputValidationError::EmptyText));
        assert_eq!(scorer.calls.get(), 0);
    }

    #[test]
    fn test_out_of_range_scores_are_clamped() {
        let scorer = FixedScorer::new(3.0);
        let report = SentimentAnalyzer::new(&scorer).analyze("wow").unwrap();
        assert_eq!(report.polarity, 1.0);
    }

    #[test]
    fn test_label_display() {
        assert_eq!(SentimentLabel::Positive.to_string(), "Positive Sentiment");
        assert_eq!(SentimentLabel::Neutral.to_string(), "Neutral Sentiment");
        assert_eq!(SentimentLabel::Negative.to_string(), "Negative Sentiment");
    }
}

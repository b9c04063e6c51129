//! Binary toxicity classifiers.
//!
//! The moderation core only sees the [`Classifier`] trait. [`LinearClassifier`]
//! evaluates an exported TF-IDF + linear model artifact; [`LexiconClassifier`]
//! flags any text containing a lexicon term and serves as the fallback when no
//! artifact is configured.

use crate::error::{Error, Result};
use crate::lexicon::Lexicon;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

static TOKEN_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\w\w+\b").expect("valid token pattern"));

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Safe,
    Toxic,
}

impl Label {
    pub fn is_toxic(self) -> bool {
        matches!(self, Label::Toxic)
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Safe => write!(f, "safe"),
            Label::Toxic => write!(f, "toxic"),
        }
    }
}

/// A black-box binary text classifier.
///
/// Implementations receive the raw user input and either return a label or
/// fail with [`Error::ClassifierUnavailable`].
pub trait Classifier: Send + Sync {
    fn classify(&self, text: &str) -> Result<Label>;
}

impl<T: Classifier + ?Sized> Classifier for Arc<T> {
    fn classify(&self, text: &str) -> Result<Label> {
        (**self).classify(text)
    }
}

impl<T: Classifier + ?Sized> Classifier for Box<T> {
    fn classify(&self, text: &str) -> Result<Label> {
        (**self).classify(text)
    }
}

/// On-disk layout of an exported linear model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearModelArtifact {
    pub vocabulary: HashMap<String, usize>,
    pub idf: Vec<f64>,
    pub coef: Vec<f64>,
    #[serde(default)]
    pub intercept: f64,
    #[serde(default = "default_true")]
    pub lowercase: bool,
    #[serde(default)]
    pub sublinear_tf: bool,
    #[serde(default = "default_ngram_range")]
    pub ngram_range: (usize, usize),
}

fn default_true() -> bool {
    true
}

fn default_ngram_range() -> (usize, usize) {
    (1, 1)
}

/// TF-IDF features scored by a linear decision function.
#[derive(Debug, Clone)]
pub struct LinearClassifier {
    artifact: LinearModelArtifact,
}

impl LinearClassifier {
    pub fn from_artifact(artifact: LinearModelArtifact) -> Result<Self> {
        let features = artifact.idf.len();
        if artifact.coef.len() != features {
            return Err(Error::classifier(format!(
                "model has {} coefficients for {} features",
                artifact.coef.len(),
                features
            )));
        }
        if let Some((term, idx)) = artifact
            .vocabulary
            .iter()
            .find(|(_, idx)| **idx >= features)
        {
            return Err(Error::classifier(format!(
                "vocabulary term {term:?} points at feature {idx} of {features}"
            )));
        }
        let (min_n, max_n) = artifact.ngram_range;
        if min_n == 0 || min_n > max_n {
            return Err(Error::classifier(format!(
                "invalid ngram range ({min_n}, {max_n})"
            )));
        }
        Ok(Self { artifact })
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let artifact: LinearModelArtifact = serde_json::from_str(text)
            .map_err(|err| Error::classifier(format!("malformed model artifact: {err}")))?;
        Self::from_artifact(artifact)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|err| {
            Error::classifier(format!("cannot read model {}: {err}", path.display()))
        })?;
        let model = Self::from_json_str(&text)?;
        info!(
            path = %path.display(),
            features = model.features(),
            "Loaded linear toxicity model"
        );
        Ok(model)
    }

    pub fn features(&self) -> usize {
        self.artifact.idf.len()
    }

    /// Signed distance from the decision boundary; positive means toxic.
    pub fn decision(&self, text: &str) -> f64 {
        let mut counts: HashMap<usize, f64> = HashMap::new();
        for term in self.terms(text) {
            if let Some(&idx) = self.artifact.vocabulary.get(&term) {
                *counts.entry(idx).or_insert(0.0) += 1.0;
            }
        }

        let weighted: Vec<(usize, f64)> = counts
            .into_iter()
            .map(|(idx, tf)| {
                let tf = if self.artifact.sublinear_tf {
                    1.0 + tf.ln()
                } else {
                    tf
                };
                (idx, tf * self.artifact.idf[idx])
            })
            .collect();
        let norm = weighted.iter().map(|(_, v)| v * v).sum::<f64>().sqrt();
        let dot = if norm > 0.0 {
            weighted
                .iter()
                .map(|(idx, v)| self.artifact.coef[*idx] * v / norm)
                .sum::<f64>()
        } else {
            0.0
        };
        dot + self.artifact.intercept
    }

    fn terms(&self, text: &str) -> Vec<String> {
        let text = if self.artifact.lowercase {
            text.to_lowercase()
        } else {
            text.to_string()
        };
        let tokens: Vec<&str> = TOKEN_PATTERN.find_iter(&text).map(|m| m.as_str()).collect();
        let (min_n, max_n) = self.artifact.ngram_range;
        let mut terms = Vec::new();
        for n in min_n..=max_n {
            if n > tokens.len() {
                break;
            }
            terms.extend(tokens.windows(n).map(|window| window.join(" ")));
        }
        terms
    }
}

impl Classifier for LinearClassifier {
    fn classify(&self, text: &str) -> Result<Label> {
        let score = self.decision(text);
        let label = if score > 0.0 { Label::Toxic } else { Label::Safe };
        debug!(score, %label, "linear model decision");
        Ok(label)
    }
}

/// Flags text containing any whole-token lexicon term.
#[derive(Clone)]
pub struct LexiconClassifier {
    lexicon: Arc<Lexicon>,
}

impl LexiconClassifier {
    pub fn new(lexicon: Arc<Lexicon>) -> Self {
        Self { lexicon }
    }
}

impl Classifier for LexiconClassifier {
    fn classify(&self, text: &str) -> Result<Label> {
        let hit = text
            .split_whitespace()
            .any(|token| self.lexicon.contains(token));
        Ok(if hit { Label::Toxic } else { Label::Safe })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const DEMO_MODEL: &str = include_str!("../data/demo_model.json");

    fn artifact(vocab: &[(&str, usize)], idf: Vec<f64>, coef: Vec<f64>) -> LinearModelArtifact {
        LinearModelArtifact {
            vocabulary: vocab.iter().map(|(t, i)| (t.to_string(), *i)).collect(),
            idf,
            coef,
            intercept: -0.1,
            lowercase: true,
            sublinear_tf: false,
            ngram_range: (1, 1),
        }
    }

    #[test]
    fn demo_model_separates_obvious_cases() {
        let model = LinearClassifier::from_json_str(DEMO_MODEL).unwrap();
        assert_eq!(model.classify("you are a stupid idiot").unwrap(), Label::Toxic);
        assert_eq!(model.classify("thanks for the help").unwrap(), Label::Safe);
        assert_eq!(model.classify("I HATE you").unwrap(), Label::Toxic);
    }

    #[test]
    fn unknown_vocabulary_falls_back_to_intercept() {
        let model =
            LinearClassifier::from_artifact(artifact(&[("bad", 0)], vec![1.0], vec![2.0])).unwrap();
        assert!((model.decision("nothing matches here") + 0.1).abs() < 1e-9);
        assert_eq!(model.classify("nothing matches").unwrap(), Label::Safe);
        assert_eq!(model.classify("bad bad").unwrap(), Label::Toxic);
    }

    #[test]
    fn single_character_tokens_are_ignored() {
        let model =
            LinearClassifier::from_artifact(artifact(&[("x", 0)], vec![1.0], vec![5.0])).unwrap();
        assert_eq!(model.classify("x x x").unwrap(), Label::Safe);
    }

    #[test]
    fn bigrams_are_scored_when_enabled() {
        let mut raw = artifact(&[("shut up", 0), ("up", 1)], vec![1.0, 1.0], vec![3.0, -1.0]);
        raw.ngram_range = (1, 2);
        let model = LinearClassifier::from_artifact(raw).unwrap();
        assert_eq!(model.classify("shut up").unwrap(), Label::Toxic);
        assert_eq!(model.classify("cheer up").unwrap(), Label::Safe);
    }

    #[test]
    fn mismatched_coefficients_are_rejected() {
        let err = LinearClassifier::from_artifact(artifact(&[("bad", 0)], vec![1.0], vec![]))
            .unwrap_err();
        assert!(err.is_classifier_unavailable());
    }

    #[test]
    fn out_of_range_vocabulary_is_rejected() {
        let err = LinearClassifier::from_artifact(artifact(&[("bad", 3)], vec![1.0], vec![1.0]))
            .unwrap_err();
        assert!(err.is_classifier_unavailable());
    }

    #[test]
    fn malformed_or_missing_artifacts_are_unavailable() {
        let err = LinearClassifier::from_json_str("{not json").unwrap_err();
        assert!(err.is_classifier_unavailable());
        let err = LinearClassifier::from_path("/missing/model.json").unwrap_err();
        assert!(err.is_classifier_unavailable());
    }

    #[test]
    fn artifact_loads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(DEMO_MODEL.as_bytes()).unwrap();
        let model = LinearClassifier::from_path(file.path()).unwrap();
        assert!(model.features() > 0);
    }

    #[test]
    fn lexicon_classifier_flags_whole_terms_only() {
        let classifier = LexiconClassifier::new(Arc::new(
            Lexicon::from_pairs([("jerk", "unkind person")]).unwrap(),
        ));
        assert_eq!(classifier.classify("what a JERK").unwrap(), Label::Toxic);
        assert_eq!(classifier.classify("jerky treats").unwrap(), Label::Safe);
    }
}

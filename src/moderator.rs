//! The three moderation entry points shared by every front end.
//!
//! Each entry point ignores blank input entirely: no classifier call, no
//! session mutation, `Ok(None)`. Otherwise the classifier sees the raw text
//! and any failure is returned unchanged.

use crate::classifier::{Classifier, Label, LexiconClassifier};
use crate::error::Result;
use crate::lexicon::Lexicon;
use crate::session::{SessionAccountant, TicketReady};
use crate::transform::{polite_rewrite, strip_toxic};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Result of the rewrite and clean tools. `output` is only present for toxic
/// input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub label: Label,
    pub output: Option<String>,
}

/// Result of the analyzer.
#[derive(Debug, Clone)]
pub struct TrackOutcome {
    pub label: Label,
    /// Toxic count after this message (0 right after a ticket).
    pub toxic_count: usize,
    pub ticket: Option<TicketReady>,
}

#[derive(Clone)]
pub struct Moderator {
    classifier: Arc<dyn Classifier>,
    lexicon: Arc<Lexicon>,
}

impl Moderator {
    pub fn new(classifier: Arc<dyn Classifier>, lexicon: Arc<Lexicon>) -> Self {
        Self {
            classifier,
            lexicon,
        }
    }

    /// Keyword-only moderation over `lexicon`, for running without a model.
    pub fn keyword_only(lexicon: Arc<Lexicon>) -> Self {
        let classifier = Arc::new(LexiconClassifier::new(Arc::clone(&lexicon)));
        Self::new(classifier, lexicon)
    }

    pub fn lexicon(&self) -> &Lexicon {
        &self.lexicon
    }

    /// Classifies non-blank text.
    pub fn classify(&self, text: &str) -> Result<Option<Label>> {
        if is_blank(text) {
            return Ok(None);
        }
        let label = self.classifier.classify(text)?;
        debug!(%label, chars = text.chars().count(), "classified message");
        Ok(Some(label))
    }

    pub fn classify_and_rewrite(&self, text: &str) -> Result<Option<Verdict>> {
        self.verdict(text, polite_rewrite)
    }

    pub fn classify_and_clean(&self, text: &str) -> Result<Option<Verdict>> {
        self.verdict(text, strip_toxic)
    }

    /// Classifies `text` and feeds the analyzer session.
    pub fn classify_and_track(
        &self,
        session: &mut SessionAccountant,
        text: &str,
    ) -> Result<Option<TrackOutcome>> {
        let Some(label) = self.classify(text)? else {
            return Ok(None);
        };
        let ticket = match label {
            Label::Toxic => session.record_toxic(text),
            Label::Safe => {
                session.record_safe();
                None
            }
        };
        Ok(Some(TrackOutcome {
            label,
            toxic_count: session.toxic_count(),
            ticket,
        }))
    }

    fn verdict(
        &self,
        text: &str,
        transform: fn(&Lexicon, &str) -> String,
    ) -> Result<Option<Verdict>> {
        let Some(label) = self.classify(text)? else {
            return Ok(None);
        };
        let output = label.is_toxic().then(|| transform(&self.lexicon, text));
        Ok(Some(Verdict { label, output }))
    }
}

fn is_blank(text: &str) -> bool {
    text.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::session::TOXIC_THRESHOLD;
    use parking_lot::Mutex;

    /// Records every input and answers with a fixed label.
    struct Scripted {
        label: Label,
        seen: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(label: Label) -> Arc<Self> {
            Arc::new(Self {
                label,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    impl Classifier for Scripted {
        fn classify(&self, text: &str) -> Result<Label> {
            self.seen.lock().push(text.to_string());
            Ok(self.label)
        }
    }

    struct Broken;

    impl Classifier for Broken {
        fn classify(&self, _text: &str) -> Result<Label> {
            Err(Error::classifier("model artifact unreadable"))
        }
    }

    fn moderator(classifier: Arc<dyn Classifier>) -> Moderator {
        Moderator::new(classifier, Arc::new(Lexicon::default()))
    }

    #[test]
    fn rewrite_applies_only_to_toxic_text() {
        let toxic = moderator(Scripted::new(Label::Toxic));
        let verdict = toxic.classify_and_rewrite("I fucking hate this").unwrap().unwrap();
        assert_eq!(verdict.label, Label::Toxic);
        assert_eq!(verdict.output.as_deref(), Some("I very dislike this"));

        let safe = moderator(Scripted::new(Label::Safe));
        let verdict = safe.classify_and_rewrite("I fucking hate this").unwrap().unwrap();
        assert_eq!(verdict, Verdict { label: Label::Safe, output: None });
    }

    #[test]
    fn clean_strips_toxic_words() {
        let toxic = moderator(Scripted::new(Label::Toxic));
        let verdict = toxic.classify_and_clean("I fucking hate this").unwrap().unwrap();
        assert_eq!(verdict.output.as_deref(), Some("I this"));
    }

    #[test]
    fn classifier_sees_raw_input() {
        let scripted = Scripted::new(Label::Toxic);
        let m = moderator(scripted.clone());
        m.classify_and_clean("  You STUPID idiot!  ").unwrap();
        m.classify_and_rewrite("hate\tyou").unwrap();
        assert_eq!(
            *scripted.seen.lock(),
            vec!["  You STUPID idiot!  ".to_string(), "hate\tyou".to_string()]
        );
    }

    #[test]
    fn blank_input_is_a_no_op_everywhere() {
        let scripted = Scripted::new(Label::Toxic);
        let m = moderator(scripted.clone());
        let mut session = SessionAccountant::new();
        for blank in ["", "   ", "\n\t "] {
            assert!(m.classify_and_rewrite(blank).unwrap().is_none());
            assert!(m.classify_and_clean(blank).unwrap().is_none());
            assert!(m.classify_and_track(&mut session, blank).unwrap().is_none());
        }
        assert!(scripted.seen.lock().is_empty());
        assert_eq!(session.toxic_count(), 0);
    }

    #[test]
    fn tracking_issues_ticket_on_threshold() {
        let m = moderator(Scripted::new(Label::Toxic));
        let mut session = SessionAccountant::new();
        let mut tickets = Vec::new();
        for idx in 0..TOXIC_THRESHOLD {
            let outcome = m
                .classify_and_track(&mut session, &format!("bad {idx}"))
                .unwrap()
                .unwrap();
            assert_eq!(outcome.label, Label::Toxic);
            tickets.extend(outcome.ticket);
        }
        assert_eq!(tickets.len(), 1);
        assert_eq!(tickets[0].ticket.messages(), ["bad 0", "bad 1", "bad 2"]);
        assert_eq!(session.toxic_count(), 0);
    }

    #[test]
    fn safe_messages_do_not_count() {
        let m = moderator(Scripted::new(Label::Safe));
        let mut session = SessionAccountant::new();
        for _ in 0..5 {
            let outcome = m.classify_and_track(&mut session, "hello there").unwrap().unwrap();
            assert_eq!(outcome.toxic_count, 0);
            assert!(outcome.ticket.is_none());
        }
    }

    #[test]
    fn classifier_failure_propagates_without_mutation() {
        let m = moderator(Arc::new(Broken));
        let mut session = SessionAccountant::new();
        let err = m.classify_and_track(&mut session, "anything").unwrap_err();
        assert!(err.is_classifier_unavailable());
        assert_eq!(session.toxic_count(), 0);
        assert!(m.classify_and_rewrite("anything").unwrap_err().is_classifier_unavailable());
        assert!(m.classify_and_clean("anything").unwrap_err().is_classifier_unavailable());
    }

    #[test]
    fn keyword_only_moderation_uses_the_lexicon() {
        let m = Moderator::keyword_only(Arc::new(Lexicon::default()));
        let verdict = m.classify_and_rewrite("you idiot").unwrap().unwrap();
        assert_eq!(verdict.output.as_deref(), Some("you uninformed person"));
        let verdict = m.classify_and_rewrite("have a nice day").unwrap().unwrap();
        assert_eq!(verdict.label, Label::Safe);
    }
}

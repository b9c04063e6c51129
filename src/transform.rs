//! Word-level rewrites driven by a [`Lexicon`].
//!
//! Both functions split on Unicode whitespace and rejoin with single spaces.
//! Only whole tokens match, so punctuation glued to a word prevents a hit.

use crate::lexicon::Lexicon;

/// Replaces every lexicon term with its polite phrase.
pub fn polite_rewrite(lexicon: &Lexicon, text: &str) -> String {
    text.split_whitespace()
        .map(|token| lexicon.lookup(token).unwrap_or(token))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Drops every lexicon term.
pub fn strip_toxic(lexicon: &Lexicon, text: &str) -> String {
    text.split_whitespace()
        .filter(|token| !lexicon.contains(token))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Lexicon terms present in `text`, in order of appearance.
pub fn flagged_terms<'a>(lexicon: &Lexicon, text: &'a str) -> Vec<&'a str> {
    text.split_whitespace()
        .filter(|token| lexicon.contains(token))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn lexicon() -> &'static Lexicon {
        Lexicon::builtin()
    }

    #[test]
    fn rewrite_substitutes_whole_tokens() {
        assert_eq!(
            polite_rewrite(lexicon(), "I fucking hate this"),
            "I very dislike this"
        );
    }

    #[test]
    fn strip_drops_whole_tokens() {
        assert_eq!(strip_toxic(lexicon(), "I fucking hate this"), "I this");
    }

    #[test]
    fn matching_ignores_case() {
        assert_eq!(polite_rewrite(lexicon(), "FUCKING"), "very");
        assert_eq!(strip_toxic(lexicon(), "You IDIOT"), "You");
    }

    #[test]
    fn compound_tokens_do_not_match() {
        assert_eq!(strip_toxic(lexicon(), "fuckingly"), "fuckingly");
        assert_eq!(polite_rewrite(lexicon(), "fuckingly"), "fuckingly");
    }

    #[test]
    fn attached_punctuation_prevents_a_match() {
        assert_eq!(polite_rewrite(lexicon(), "stupid, idiot!"), "stupid, idiot!");
        assert_eq!(strip_toxic(lexicon(), "hate."), "hate.");
    }

    #[test]
    fn unmatched_tokens_keep_casing_and_punctuation() {
        assert_eq!(
            polite_rewrite(lexicon(), "Wow, you STUPID Person!"),
            "Wow, you not thoughtful Person!"
        );
    }

    #[test]
    fn consecutive_drops_collapse_spacing() {
        assert_eq!(
            strip_toxic(lexicon(), "  stupid   idiot  asshole go   away "),
            "go away"
        );
        assert_eq!(strip_toxic(lexicon(), "hate hate hate"), "");
    }

    #[test]
    fn empty_and_blank_input_yield_empty_output() {
        assert_eq!(polite_rewrite(lexicon(), ""), "");
        assert_eq!(strip_toxic(lexicon(), ""), "");
        assert_eq!(polite_rewrite(lexicon(), " \t\n "), "");
    }

    #[test]
    fn flagged_terms_keep_original_spelling() {
        assert_eq!(
            flagged_terms(lexicon(), "Stupid people HATE stupid-ness"),
            vec!["Stupid", "HATE"]
        );
    }

    fn clean_word() -> impl Strategy<Value = String> {
        "[A-Za-z,.!?']{1,10}".prop_filter("not a lexicon term", |word| {
            !Lexicon::builtin().contains(word)
        })
    }

    proptest! {
        #[test]
        fn transforms_are_identity_on_single_spaced_clean_text(
            words in prop::collection::vec(clean_word(), 0..12)
        ) {
            let text = words.join(" ");
            prop_assert_eq!(polite_rewrite(lexicon(), &text), text.clone());
            prop_assert_eq!(strip_toxic(lexicon(), &text), text);
        }

        #[test]
        fn transforms_are_idempotent_on_clean_text(
            words in prop::collection::vec(clean_word(), 0..12),
            gap in "[ \t]{1,3}"
        ) {
            let text = words.join(&gap);
            let rewritten = polite_rewrite(lexicon(), &text);
            prop_assert_eq!(polite_rewrite(lexicon(), &rewritten), rewritten.clone());
            let stripped = strip_toxic(lexicon(), &text);
            prop_assert_eq!(strip_toxic(lexicon(), &stripped), stripped);
        }
    }
}

//! Toxic comment moderation: classification, polite rewrites, toxic-word
//! removal and per-session warning tickets.

mod classifier;
mod error;
mod lexicon;
mod moderator;
pub mod pdf;
mod session;
mod store;
mod ticket;
mod transform;

#[cfg(feature = "web")]
pub mod web;

pub use classifier::{Classifier, Label, LexiconClassifier, LinearClassifier, LinearModelArtifact};
pub use error::{Error, Result};
pub use lexicon::Lexicon;
pub use moderator::{Moderator, TrackOutcome, Verdict};
pub use session::{SessionAccountant, TOXIC_THRESHOLD, TicketReady};
pub use store::{
    DEFAULT_MAX_SESSIONS, SessionHandle, SessionState, SessionStore, generate_session_id,
};
pub use ticket::{
    ISSUED_FORMAT, TICKET_FILENAME, TICKET_FOOTER, TICKET_MIME, TICKET_SECTION_HEADER,
    TICKET_TITLE, Ticket, build_ticket,
};
pub use transform::{flagged_terms, polite_rewrite, strip_toxic};

use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Builds a moderator from optional model and lexicon files.
///
/// Without a model the lexicon itself acts as the classifier.
pub fn load_moderator(model: Option<&Path>, lexicon: Option<&Path>) -> Result<Moderator> {
    let lexicon = match lexicon {
        Some(path) => {
            let table = Lexicon::from_path(path)?;
            info!(path = %path.display(), terms = table.len(), "Loaded lexicon");
            Arc::new(table)
        }
        None => Arc::new(Lexicon::default()),
    };
    match model {
        Some(path) => {
            let classifier = LinearClassifier::from_path(path)?;
            Ok(Moderator::new(Arc::new(classifier), lexicon))
        }
        None => {
            info!("No model artifact configured; using keyword classifier");
            Ok(Moderator::keyword_only(lexicon))
        }
    }
}

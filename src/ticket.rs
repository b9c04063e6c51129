//! Warning tickets: PDF summaries of the toxic messages seen in a session.

use crate::pdf::{FontStyle, PdfDocument};
use chrono::{Local, NaiveDateTime};

pub const TICKET_TITLE: &str = "AI SAFETY WARNING TICKET";
pub const TICKET_SECTION_HEADER: &str = "Detected Toxic Messages:";
pub const TICKET_FOOTER: &str = "This ticket is auto-generated for safety review.";
pub const TICKET_FILENAME: &str = "AI_Warning_Ticket.pdf";
pub const TICKET_MIME: &str = "application/pdf";
pub const ISSUED_FORMAT: &str = "%d-%m-%Y %H:%M:%S";

/// A point-in-time incident document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    issued_at: NaiveDateTime,
    messages: Vec<String>,
}

impl Ticket {
    /// Stamps `messages` with the current local time.
    pub fn new(messages: Vec<String>) -> Self {
        Self::issued_at(Local::now().naive_local(), messages)
    }

    pub fn issued_at(issued_at: NaiveDateTime, messages: Vec<String>) -> Self {
        Self {
            issued_at,
            messages,
        }
    }

    pub fn issued(&self) -> NaiveDateTime {
        self.issued_at
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn issued_line(&self) -> String {
        format!("Issued: {}", self.issued_at.format(ISSUED_FORMAT))
    }

    /// Renders the ticket as PDF bytes. Never fails; glyphs outside WinAnsi
    /// are dropped.
    pub fn render(&self) -> Vec<u8> {
        let mut doc = PdfDocument::new("AI Safety Warning Ticket");
        doc.text_row(FontStyle::Bold, 20.0, 10.0, TICKET_TITLE);
        doc.text_row(FontStyle::Regular, 12.0, 8.0, &self.issued_line());
        doc.gap(5.0);
        doc.text_row(FontStyle::Bold, 14.0, 10.0, TICKET_SECTION_HEADER);
        for message in &self.messages {
            doc.text_row(FontStyle::Regular, 12.0, 8.0, &format!("- {message}"));
        }
        doc.gap(10.0);
        doc.text_row(FontStyle::Italic, 12.0, 8.0, TICKET_FOOTER);
        doc.finish()
    }

    /// Suggested file name when saving to disk, stamped to the second.
    pub fn file_name(&self) -> String {
        format!(
            "AI_Warning_Ticket_{}.pdf",
            self.issued_at.format("%Y%m%d_%H%M%S")
        )
    }
}

/// Renders a ticket for `messages` stamped with the current time.
pub fn build_ticket<S: AsRef<str>>(messages: &[S]) -> Vec<u8> {
    Ticket::new(messages.iter().map(|m| m.as_ref().to_string()).collect()).render()
}

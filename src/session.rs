use crate::ticket::Ticket;
use chrono::{Local, NaiveDateTime};
use tracing::info;

/// Toxic detections that trigger a warning ticket.
pub const TOXIC_THRESHOLD: usize = 3;

/// Emitted when a session reaches [`TOXIC_THRESHOLD`]. The delivery layer
/// decides how the PDF reaches the user.
#[derive(Debug, Clone)]
pub struct TicketReady {
    pub ticket: Ticket,
    pub pdf: Vec<u8>,
}

/// Per-session toxic message accounting.
#[derive(Debug, Clone, Default)]
pub struct SessionAccountant {
    toxic_count: usize,
    toxic_history: Vec<String>,
    tickets_issued: u64,
}

impl SessionAccountant {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn toxic_count(&self) -> usize {
        self.toxic_count
    }

    pub fn history(&self) -> &[String] {
        &self.toxic_history
    }

    /// Tickets emitted over the lifetime of this session.
    pub fn tickets_issued(&self) -> u64 {
        self.tickets_issued
    }

    /// Records a toxic message; returns the ticket when the threshold is hit.
    pub fn record_toxic(&mut self, message: impl Into<String>) -> Option<TicketReady> {
        self.record_toxic_at(message, Local::now().naive_local())
    }

    /// As [`record_toxic`](Self::record_toxic) with an explicit issue time.
    pub fn record_toxic_at(
        &mut self,
        message: impl Into<String>,
        now: NaiveDateTime,
    ) -> Option<TicketReady> {
        self.toxic_history.push(message.into());
        self.toxic_count += 1;
        if self.toxic_count < TOXIC_THRESHOLD {
            return None;
        }

        let ticket = Ticket::issued_at(now, std::mem::take(&mut self.toxic_history));
        self.toxic_count = 0;
        self.tickets_issued = self.tickets_issued.saturating_add(1);
        let pdf = ticket.render();
        info!(
            messages = ticket.messages().len(),
            bytes = pdf.len(),
            "Toxic threshold reached; warning ticket issued"
        );
        Some(TicketReady { ticket, pdf })
    }

    /// Safe messages are not tracked.
    pub fn record_safe(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn third_toxic_message_issues_one_ticket_and_resets() {
        let mut session = SessionAccountant::new();
        assert!(session.record_toxic("one").is_none());
        assert_eq!(session.toxic_count(), 1);
        assert!(session.record_toxic("two").is_none());
        assert_eq!(session.history(), ["one", "two"]);

        let ready = session.record_toxic("three").expect("ticket at threshold");
        assert_eq!(ready.ticket.messages(), ["one", "two", "three"]);
        assert!(ready.pdf.starts_with(b"%PDF-"));
        assert_eq!(session.toxic_count(), 0);
        assert!(session.history().is_empty());
        assert_eq!(session.tickets_issued(), 1);
    }

    #[test]
    fn fourth_message_starts_a_fresh_cycle() {
        let mut session = SessionAccountant::new();
        for msg in ["a", "b", "c"] {
            session.record_toxic(msg);
        }
        assert!(session.record_toxic("d").is_none());
        assert_eq!(session.toxic_count(), 1);
        assert_eq!(session.history(), ["d"]);
        session.record_toxic("e");
        let ready = session.record_toxic("f").unwrap();
        assert_eq!(ready.ticket.messages(), ["d", "e", "f"]);
        assert_eq!(session.tickets_issued(), 2);
    }

    #[test]
    fn safe_messages_leave_state_untouched() {
        let mut session = SessionAccountant::new();
        session.record_toxic("bad");
        session.record_safe();
        session.record_safe();
        assert_eq!(session.toxic_count(), 1);
        assert_eq!(session.history(), ["bad"]);
    }

    #[test]
    fn ticket_uses_supplied_issue_time() {
        let now = chrono::NaiveDate::from_ymd_opt(2025, 1, 2)
            .unwrap()
            .and_hms_opt(3, 4, 5)
            .unwrap();
        let mut session = SessionAccountant::new();
        session.record_toxic_at("x", now);
        session.record_toxic_at("y", now);
        let ready = session.record_toxic_at("z", now).unwrap();
        assert_eq!(ready.ticket.issued(), now);
        assert_eq!(ready.ticket.issued_line(), "Issued: 02-01-2025 03:04:05");
    }

    #[test]
    fn sessions_are_independent() {
        let mut alice = SessionAccountant::new();
        let mut bob = SessionAccountant::new();
        alice.record_toxic("a1");
        alice.record_toxic("a2");
        bob.record_toxic("b1");
        assert!(bob.record_toxic("b2").is_none());
        assert_eq!(alice.toxic_count(), 2);
        assert_eq!(bob.history(), ["b1", "b2"]);
    }
}

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestTicket(u64);

/// Orders in-flight lookups so that only the newest input may publish a result.
#[derive(Debug, Default)]
pub struct RequestSequencer {
    latest: AtomicU64,
}

impl RequestSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self) -> RequestTicket {
        RequestTicket(self.latest.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn is_current(&self, ticket: RequestTicket) -> bool {
        self.latest.load(Ordering::SeqCst) == ticket.0
    }
}

#[cfg(test)]
mod tests {
    use super::RequestSequencer;

    #[test]
    fn newer_ticket_supersedes_older() {
        let sequencer = RequestSequencer::new();
        let first = sequencer.begin();
        assert!(sequencer.is_current(first));
        let second = sequencer.begin();
        assert!(!sequencer.is_current(first));
        assert!(sequencer.is_current(second));
    }
}

use serde::{Deserialize, Serialize};

use crate::executor::CandidateCode;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub code: CandidateCode,
    pub failures: usize,
}

/// Failure count per attempted candidate, keyed by source text and kept in
/// first-attempt order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccuracyLedger {
    entries: Vec<LedgerEntry>,
}

impl AccuracyLedger {
    /// Records a run. Re-running identical source updates its count in
    /// place rather than adding an entry.
    pub fn record(&mut self, code: CandidateCode, failures: usize) {
        match self.entries.iter_mut().find(|e| e.code.source == code.source) {
            Some(entry) => entry.failures = failures,
            None => self.entries.push(LedgerEntry { code, failures }),
        }
    }

    /// Fewest failures; the earliest entry wins ties.
    pub fn least_bad(&self) -> Option<&LedgerEntry> {
        self.entries.iter().min_by_key(|e| e.failures)
    }

    pub fn failures_for(&self, source: &str) -> Option<usize> {
        self.entries
            .iter()
            .find(|e| e.code.source == source)
            .map(|e| e.failures)
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(src: &str) -> CandidateCode {
        CandidateCode::new("f", src)
    }

    #[test]
    fn identical_source_is_one_entry() {
        let mut ledger = AccuracyLedger::default();
        ledger.record(code("a"), 3);
        ledger.record(code("a"), 2);
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.failures_for("a"), Some(2));
    }

    #[test]
    fn least_bad_prefers_first_on_ties() {
        let mut ledger = AccuracyLedger::default();
        ledger.record(code("a"), 4);
        ledger.record(code("b"), 1);
        ledger.record(code("c"), 1);
        assert_eq!(ledger.least_bad().map(|e| e.code.source.as_str()), Some("b"));
        assert!(AccuracyLedger::default().least_bad().is_none());
    }
}

//! Run Fingerprint
//!
//! SHA-256 over the canonicalized fill and ledger sequences. Two runs have the
//! same fingerprint iff their observable outputs are identical.
//!
//! # Canonicalization
//!
//! - Floats are hashed by their exact IEEE-754 bit pattern
//! - Integers are hashed little-endian
//! - Records are hashed in log order, each prefixed with a tag byte

use crate::backtest::ledger::{EntryKind, Fill, LedgerEntry, Liquidity};
use crate::backtest::events::Side;
use sha2::{Digest, Sha256};

/// Fingerprint version string - increment when format changes.
pub const FINGERPRINT_VERSION: &str = "SCALPFP_V2";

/// Incremental fingerprint builder.
pub struct Fingerprinter {
    hasher: Sha256,
    records: u64,
}

impl Fingerprinter {
    pub fn new() -> Self {
        let mut hasher = Sha256::new();
        hasher.update(FINGERPRINT_VERSION.as_bytes());
        Self { hasher, records: 0 }
    }

    fn int(&mut self, v: i64) {
        self.hasher.update(v.to_le_bytes());
    }

    fn float(&mut self, v: f64) {
        self.hasher.update(v.to_bits().to_le_bytes());
    }

    pub fn fill(&mut self, fill: &Fill) {
        self.hasher.update([b'F']);
        self.int(fill.fill_id as i64);
        self.int(fill.order_id as i64);
        self.int(fill.timestamp_ns);
        self.hasher.update([match fill.side {
            Side::Buy => 0u8,
            Side::Sell => 1u8,
        }]);
        self.float(fill.price);
        self.float(fill.quantity);
        self.float(fill.fee_bps_applied);
        self.float(fill.fee_paid);
        self.hasher.update([match fill.liquidity {
            Liquidity::Maker => 0u8,
            Liquidity::Taker => 1u8,
        }]);
        self.records += 1;
    }

    pub fn entry(&mut self, entry: &LedgerEntry) {
        self.hasher.update([b'L']);
        self.int(entry.entry_id as i64);
        self.int(entry.timestamp_ns);
        self.hasher.update([match entry.kind {
            EntryKind::Fill => 0u8,
            EntryKind::Funding => 1u8,
        }]);
        self.float(entry.realized_pnl_delta);
        self.float(entry.fee_paid);
        self.float(entry.funding_paid);
        self.float(entry.inventory_after);
        self.records += 1;
    }

    pub fn records(&self) -> u64 {
        self.records
    }

    /// Lowercase hex digest.
    pub fn finish(self) -> String {
        format!("{:x}", self.hasher.finalize())
    }
}

impl Default for Fingerprinter {
    fn default() -> Self {
        Self::new()
    }
}

/// Fingerprint of a complete run output.
pub fn fingerprint(fills: &[Fill], entries: &[LedgerEntry]) -> String {
    let mut fp = Fingerprinter::new();
    for fill in fills {
        fp.fill(fill);
    }
    for entry in entries {
        fp.entry(entry);
    }
    fp.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtest::ledger::Ledger;

    fn sample_ledger(price: f64) -> Ledger {
        let mut ledger = Ledger::new();
        ledger.post_fill(1, 100, Side::Buy, price, 1.0, Liquidity::Maker, 1.0);
        ledger.post_fill(2, 200, Side::Sell, price + 1.0, 1.0, Liquidity::Maker, 1.0);
        ledger
    }

    #[test]
    fn test_identical_outputs_identical_fingerprint() {
        let a = sample_ledger(100.0);
        let b = sample_ledger(100.0);
        let fa = fingerprint(a.fills(), a.entries());
        assert_eq!(fa, fingerprint(b.fills(), b.entries()));
        assert_eq!(fa.len(), 64);
    }

    #[test]
    fn test_any_change_changes_fingerprint() {
        let a = sample_ledger(100.0);
        let b = sample_ledger(100.000_001);
        assert_ne!(
            fingerprint(a.fills(), a.entries()),
            fingerprint(b.fills(), b.entries())
        );
        assert_ne!(fingerprint(&[], &[]), fingerprint(a.fills(), &[]));
    }

    #[test]
    fn test_sub_nano_fee_difference_changes_fingerprint() {
        let a = sample_ledger(100.0);
        let mut fills = a.fills().to_vec();
        fills[0].fee_paid += 1e-12;
        assert_ne!(
            fingerprint(a.fills(), a.entries()),
            fingerprint(&fills, a.entries())
        );
    }
}

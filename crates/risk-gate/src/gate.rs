use std::collections::HashSet;

use crate::models::*;

/// Broad-market indices, sector/bond/commodity ETFs and leveraged or inverse
/// products. None of these are eligible for automated entry.
const DEFAULT_EXCLUSIONS: &[&str] = &[
    // Index trackers
    "SPY", "QQQ", "DIA", "IWM", "VTI", "VOO", "IVV", "RSP", "MDY",
    // Sector SPDRs
    "XLF", "XLK", "XLE", "XLV", "XLI", "XLU", "XLP", "XLY", "XLB", "XLRE", "XLC",
    // Bonds
    "TLT", "IEF", "SHY", "HYG", "LQD", "AGG", "BND",
    // International / thematic
    "EEM", "EFA", "ARKK", "SMH", "SOXX",
    // Leveraged and inverse
    "TQQQ", "SQQQ", "SPXL", "SPXS", "UPRO", "SPXU", "SOXL", "SOXS", "TNA", "TZA",
    "LABU", "LABD", "FAS", "FAZ", "UVXY", "SVXY", "VXX", "VIXY", "SH", "PSQ",
    // Commodity proxies
    "GLD", "IAU", "SLV", "USO", "UNG", "DBC", "GDX", "GDXJ",
];

/// The built-in exclusion set, upper-cased.
pub fn default_exclusions() -> HashSet<String> {
    DEFAULT_EXCLUSIONS.iter().map(|s| s.to_string()).collect()
}

fn normalize(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

/// Filters and ranks raw candidates into a capacity-bounded, admissible list.
///
/// Pure: no I/O, deterministic for identical inputs.
#[derive(Debug, Clone)]
pub struct RiskGate {
    max_positions: usize,
    min_score: f64,
    excluded: HashSet<String>,
}

impl RiskGate {
    pub fn new(max_positions: usize, min_score: f64, excluded: HashSet<String>) -> Self {
        Self {
            max_positions,
            min_score,
            excluded: excluded.iter().map(|s| normalize(s)).collect(),
        }
    }

    pub fn is_excluded(&self, symbol: &str) -> bool {
        self.excluded.contains(&normalize(symbol))
    }

    /// Slots left before `max_positions` is reached.
    pub fn remaining_capacity(&self, open_count: usize) -> usize {
        self.max_positions.saturating_sub(open_count)
    }

    /// Run the gate.
    ///
    /// `held` lists symbols of currently open positions; `open_count` is the
    /// number of open positions counted against `max_positions`.
    pub fn filter<S: AsRef<str>>(
        &self,
        picks: &[CandidatePick],
        held: &[S],
        open_count: usize,
    ) -> GateOutcome {
        let held: HashSet<String> = held.iter().map(|s| normalize(s.as_ref())).collect();
        let mut outcome = GateOutcome::default();

        let mut eligible: Vec<CandidatePick> = Vec::with_capacity(picks.len());
        for pick in picks {
            let symbol = normalize(&pick.symbol);

            let reason = if self.excluded.contains(&symbol) {
                Some(RejectReason::Excluded)
            } else if held.contains(&symbol) {
                Some(RejectReason::AlreadyHeld)
            } else if pick.trend != Trend::Bullish {
                Some(RejectReason::NotBullish)
            } else if pick.score.is_nan() || pick.score < self.min_score {
                Some(RejectReason::BelowMinScore)
            } else {
                None
            };

            match reason {
                Some(reason) => outcome.rejected.push(Rejection { symbol, reason }),
                None => eligible.push(CandidatePick {
                    symbol,
                    ..pick.clone()
                }),
            }
        }

        // Vec::sort_by is stable: equal scores keep their input order.
        eligible.sort_by(|a, b| b.score.total_cmp(&a.score));

        let capacity = self.remaining_capacity(open_count);
        let mut seen: HashSet<String> = HashSet::new();
        for pick in eligible {
            if !seen.insert(pick.symbol.clone()) {
                outcome.rejected.push(Rejection {
                    symbol: pick.symbol,
                    reason: RejectReason::Duplicate,
                });
            } else if outcome.admitted.len() >= capacity {
                outcome.rejected.push(Rejection {
                    symbol: pick.symbol,
                    reason: RejectReason::OverCapacity,
                });
            } else {
                outcome.admitted.push(pick);
            }
        }

        tracing::debug!(
            "Risk gate: {} admitted, {} rejected (capacity {}, open {})",
            outcome.admitted.len(),
            outcome.rejected.len(),
            capacity,
            open_count
        );

        outcome
    }
}

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Bullish,
    Bearish,
    Neutral,
}

impl std::str::FromStr for Trend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bullish" => Ok(Trend::Bullish),
            "bearish" => Ok(Trend::Bearish),
            "neutral" => Ok(Trend::Neutral),
            other => Err(format!("unknown trend '{}'", other)),
        }
    }
}

// Scanners disagree on casing ("bullish", "BULLISH", "Bullish").
impl<'de> Deserialize<'de> for Trend {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A ranked candidate produced by the external scanner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidatePick {
    pub symbol: String,
    /// Conviction score, higher is stronger.
    pub score: f64,
    pub trend: Trend,
    #[serde(default)]
    pub sector: Option<String>,
}

impl CandidatePick {
    pub fn new(symbol: impl Into<String>, score: f64, trend: Trend) -> Self {
        Self {
            symbol: symbol.into(),
            score,
            trend,
            sector: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    Excluded,
    AlreadyHeld,
    NotBullish,
    BelowMinScore,
    Duplicate,
    OverCapacity,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::Excluded => write!(f, "excluded symbol"),
            RejectReason::AlreadyHeld => write!(f, "already held"),
            RejectReason::NotBullish => write!(f, "trend not bullish"),
            RejectReason::BelowMinScore => write!(f, "score below minimum"),
            RejectReason::Duplicate => write!(f, "duplicate symbol"),
            RejectReason::OverCapacity => write!(f, "no position capacity left"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rejection {
    pub symbol: String,
    pub reason: RejectReason,
}

/// Result of running a candidate list through the gate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GateOutcome {
    /// Admissible picks in execution order (score descending, stable).
    pub admitted: Vec<CandidatePick>,
    pub rejected: Vec<Rejection>,
}

impl GateOutcome {
    pub fn admitted_symbols(&self) -> Vec<&str> {
        self.admitted.iter().map(|p| p.symbol.as_str()).collect()
    }
}

//! Coarse market-phase labels.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Regime {
    #[default]
    Unknown,
    Accumulation,
    Markup,
    Distribution,
    Markdown,
}

impl Regime {
    pub const ALL: [Regime; 5] = [
        Regime::Unknown,
        Regime::Accumulation,
        Regime::Markup,
        Regime::Distribution,
        Regime::Markdown,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Regime::Unknown => "UNKNOWN",
            Regime::Accumulation => "ACCUMULATION",
            Regime::Markup => "MARKUP",
            Regime::Distribution => "DISTRIBUTION",
            Regime::Markdown => "MARKDOWN",
        }
    }
}

impl fmt::Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_unknown() {
        assert_eq!(Regime::default(), Regime::Unknown);
    }

    #[test]
    fn serde_matches_display() {
        for regime in Regime::ALL {
            let json = serde_json::to_string(&regime).unwrap();
            assert_eq!(json, format!("\"{regime}\""));
        }
    }
}

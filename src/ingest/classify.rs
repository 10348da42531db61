//! Series name classification

use serde::{Deserialize, Serialize};
use std::fmt;

/// Statistic categories a usage series can feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StatisticKind {
    OffPeak,
    OnPeak,
    Total,
}

impl StatisticKind {
    pub const ALL: [StatisticKind; 3] = [Self::OffPeak, Self::OnPeak, Self::Total];

    /// External statistic id
    pub fn statistic_id(&self) -> &'static str {
        match self {
            Self::OffPeak => "psegli:off_peak_usage",
            Self::OnPeak => "psegli:on_peak_usage",
            Self::Total => "psegli:energy_usage",
        }
    }

    pub fn from_statistic_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.statistic_id() == id)
    }
}

impl fmt::Display for StatisticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.statistic_id())
    }
}

/// Map a series name to its category; first matching rule wins
pub fn classify(series_name: &str) -> Option<StatisticKind> {
    if series_name.contains("Off-Peak") {
        Some(StatisticKind::OffPeak)
    } else if series_name.contains("On-Peak") {
        Some(StatisticKind::OnPeak)
    } else if series_name.contains("Residential Service") || series_name.starts_with("Meter #") {
        Some(StatisticKind::Total)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_map_to_categories() {
        assert_eq!(classify("Off-Peak Usage"), Some(StatisticKind::OffPeak));
        assert_eq!(classify("On-Peak Usage"), Some(StatisticKind::OnPeak));
        assert_eq!(
            classify("Residential Service (RS)"),
            Some(StatisticKind::Total)
        );
        assert_eq!(classify("Meter #12345678"), Some(StatisticKind::Total));
        assert_eq!(classify("Irrelevant Sensor"), None);
        // prefix rule only
        assert_eq!(classify("Old Meter #1"), None);
    }

    #[test]
    fn rule_order_decides_overlaps() {
        assert_eq!(
            classify("Residential Service Off-Peak"),
            Some(StatisticKind::OffPeak)
        );
        assert_eq!(classify("Meter #1 On-Peak"), Some(StatisticKind::OnPeak));
    }

    #[test]
    fn ids_round_trip_through_lookup() {
        for kind in StatisticKind::ALL {
            assert_eq!(StatisticKind::from_statistic_id(kind.statistic_id()), Some(kind));
        }
        assert_eq!(StatisticKind::from_statistic_id("sensor:other"), None);
    }
}

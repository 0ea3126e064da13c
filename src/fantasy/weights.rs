use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Points for playing at least `from` minutes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MinutesBand {
    pub from: i32,
    pub points: f64,
}

/// Weight of every counter the scoring engine accrues.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub goal: f64,
    pub own_goal: f64,
    pub assist: f64,
    pub clean_sheet: f64,
    pub yellow_card: f64,
    pub red_card: f64,
    pub saved_penalty: f64,
    pub missed_penalty: f64,
    pub minutes_bands: Vec<MinutesBand>,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        ScoringWeights {
            goal: 5.0,
            own_goal: -2.0,
            assist: 3.0,
            clean_sheet: 4.0,
            yellow_card: -1.0,
            red_card: -3.0,
            saved_penalty: 5.0,
            missed_penalty: -2.0,
            minutes_bands: vec![
                MinutesBand { from: 1, points: 1.0 },
                MinutesBand { from: 60, points: 2.0 },
            ],
        }
    }
}

impl ScoringWeights {
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scoring weights {}", path))?;
        Self::from_toml(&content).with_context(|| format!("Invalid scoring weights in {}", path))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let mut weights: ScoringWeights = toml::from_str(content)?;
        weights.minutes_bands.sort_by_key(|b| b.from);
        Ok(weights)
    }

    /// Points of the highest band reached; nothing below the first band.
    pub fn minutes_points(&self, minutes: i32) -> f64 {
        self.minutes_bands
            .iter()
            .filter(|b| b.from <= minutes)
            .max_by_key(|b| b.from)
            .map_or(0.0, |b| b.points)
    }
}

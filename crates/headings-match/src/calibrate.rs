//! Opt-in cross-vocabulary ranking.
//!
//! Raw scores from two vocabularies are only comparable when both were
//! embedded the same way. Merging therefore requires an explicit linear
//! calibration per vocabulary; vocabularies without one are left out.
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use headings_core::{AuthorityCandidate, Error, Result, VocabularyCode};

use crate::matcher::TopicMatches;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreCalibration {
    pub scale: f32,
    pub offset: f32,
}

impl ScoreCalibration {
    /// `scale` must be positive so calibration never reorders a vocabulary's own list.
    pub fn new(scale: f32, offset: f32) -> Result<Self> {
        let calibration = Self { scale, offset };
        calibration.validate()?;
        Ok(calibration)
    }

    pub fn identity() -> Self {
        Self { scale: 1.0, offset: 0.0 }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.scale.is_finite() || self.scale <= 0.0 || !self.offset.is_finite() {
            return Err(Error::InvalidConfig(format!(
                "calibration needs a finite positive scale and finite offset, got scale={} offset={}",
                self.scale, self.offset
            )));
        }
        Ok(())
    }

    pub fn apply(&self, score: f32) -> f32 {
        (score * self.scale + self.offset).clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibratedCandidate {
    pub candidate: AuthorityCandidate,
    pub calibrated_score: f32,
}

/// Validate calibrations keyed by raw vocabulary code strings (config form).
pub fn calibrations_from_config(raw: HashMap<String, ScoreCalibration>) -> Result<HashMap<VocabularyCode, ScoreCalibration>> {
    raw.into_iter()
        .map(|(code, cal)| {
            cal.validate()?;
            let code = VocabularyCode::new(&code).map_err(|e| Error::InvalidConfig(e.to_string()))?;
            Ok((code, cal))
        })
        .collect()
}

/// One list across vocabularies, best calibrated score first. Ties keep the
/// matcher's order (vocabulary request order, then raw score).
pub fn merge_calibrated(
    matches: &TopicMatches,
    calibrations: &HashMap<VocabularyCode, ScoreCalibration>,
) -> Vec<CalibratedCandidate> {
    let mut merged: Vec<CalibratedCandidate> = matches
        .groups
        .iter()
        .filter_map(|group| calibrations.get(&group.vocabulary).map(|cal| (group, cal)))
        .flat_map(|(group, cal)| {
            group.candidates.iter().map(move |c| CalibratedCandidate {
                candidate: c.clone(),
                calibrated_score: cal.apply(c.score),
            })
        })
        .collect();
    merged.sort_by(|a, b| b.calibrated_score.partial_cmp(&a.calibrated_score).unwrap_or(std::cmp::Ordering::Equal));
    merged
}

//! Domain-factor multipliers
//!
//! Each factor maps one raw metric to a bounded multiplier. The same
//! functions feed the training label and the live compatibility score, so
//! the two paths cannot drift apart.

use serde::{Deserialize, Serialize};

use crate::pairs::PairMetrics;

/// BMI assumed when a record carries none
pub const DEFAULT_BMI: f64 = 25.0;

/// Multiplier applied when blood groups are incompatible
pub const BLOOD_INCOMPATIBLE_FACTOR: f64 = 0.15;

pub fn blood_factor(compatible: bool) -> f64 {
    if compatible {
        1.0
    } else {
        BLOOD_INCOMPATIBLE_FACTOR
    }
}

pub fn hla_factor(hla_score: f64) -> f64 {
    hla_score.max(0.3)
}

/// `freshness` is the 0-100 organ freshness score.
pub fn storage_factor(freshness: f64) -> f64 {
    (freshness / 100.0).max(0.4)
}

/// Higher urgency tolerates slightly more risk. A level of 0 counts as 1.
pub fn urgency_factor(urgency_level: f64) -> f64 {
    let urgency = if urgency_level == 0.0 { 1.0 } else { urgency_level };
    (0.8 + (urgency / 10.0) * 0.35).min(1.15)
}

pub fn medical_risk_factor(donor_risk: f64, recipient_risk: f64) -> f64 {
    let combined = (donor_risk + recipient_risk) / 2.0;
    (1.0 - combined * 0.6).max(0.4)
}

pub fn age_factor(age_difference: f64) -> f64 {
    if age_difference <= 5.0 {
        1.0
    } else {
        (1.0 - (age_difference - 5.0) * 0.015).max(0.5)
    }
}

/// Zero BMI means unknown and is replaced with [`DEFAULT_BMI`].
pub fn bmi_factor(donor_bmi: f64, recipient_bmi: f64) -> f64 {
    let donor = if donor_bmi == 0.0 { DEFAULT_BMI } else { donor_bmi };
    let recipient = if recipient_bmi == 0.0 { DEFAULT_BMI } else { recipient_bmi };
    (1.0 - (donor - recipient).abs() * 0.025).max(0.6)
}

/// Size mismatch as a percentage of the donor organ, capped at 30%.
/// An unknown (zero) donor organ size counts as no mismatch.
pub fn size_factor(organ_size_difference: f64, donor_organ_size: f64) -> f64 {
    let pct = if donor_organ_size == 0.0 {
        0.0
    } else {
        organ_size_difference / donor_organ_size.max(0.1) * 100.0
    };
    (1.0 - pct.min(30.0) * 0.015).max(0.5)
}

/// Step function over transit distance; NaN means unknown.
///
/// Takes the unrounded distance, the same value the training features use.
/// Scoring does not round to 0.1 km first, so 500.04 km already falls in the
/// 0.85 band.
pub fn distance_factor(distance_km: f64) -> f64 {
    if distance_km.is_nan() {
        0.9
    } else if distance_km <= 500.0 {
        1.0
    } else if distance_km <= 1000.0 {
        0.85
    } else if distance_km <= 2000.0 {
        0.6
    } else {
        0.4
    }
}

/// Minor bonus for same gender; unknown genders are neutral.
pub fn gender_factor(same_gender: Option<bool>) -> f64 {
    match same_gender {
        Some(true) => 1.05,
        _ => 1.0,
    }
}

/// The ten multipliers for one pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FactorSet {
    pub blood: f64,
    pub hla: f64,
    pub storage: f64,
    pub urgency: f64,
    pub medical_risk: f64,
    pub age: f64,
    pub bmi: f64,
    pub size: f64,
    pub distance: f64,
    pub gender: f64,
}

impl FactorSet {
    pub fn from_metrics(metrics: &PairMetrics) -> Self {
        Self {
            blood: blood_factor(metrics.blood_compatible),
            hla: hla_factor(metrics.hla_match_score),
            storage: storage_factor(metrics.organ_freshness_score),
            urgency: urgency_factor(metrics.urgency_level),
            medical_risk: medical_risk_factor(
                metrics.donor_medical_risk,
                metrics.recipient_medical_risk,
            ),
            age: age_factor(metrics.age_difference),
            bmi: bmi_factor(metrics.donor_bmi, metrics.recipient_bmi),
            size: size_factor(metrics.organ_size_difference, metrics.donor_organ_size),
            distance: distance_factor(metrics.gps_distance_km),
            gender: gender_factor(metrics.same_gender),
        }
    }

    pub fn as_array(&self) -> [f64; 10] {
        [
            self.blood,
            self.hla,
            self.storage,
            self.urgency,
            self.medical_risk,
            self.age,
            self.bmi,
            self.size,
            self.distance,
            self.gender,
        ]
    }

    /// Combined factor score
    pub fn product(&self) -> f64 {
        self.as_array().iter().product()
    }
}

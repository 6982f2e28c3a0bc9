//! Pair enumeration and feature vectors
//!
//! A pair is one donor combined with one recipient whose needed organ equals
//! the donor's organ type. Pairs are produced recipient-major (outer loop over
//! recipients, inner over donors); callers rely on this order for stable
//! tie-breaking.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::factors::FactorSet;
use crate::features;
use crate::records::{Donor, RecordId, Recipient};

/// Model input columns, in the order they are stored in a bundle.
pub const FEATURE_COLUMNS: [&str; 23] = [
    "hla_match_score",
    "blood_group_compatible",
    "organ_freshness_score",
    "gps_distance_km",
    "age_difference",
    "organ_size_difference",
    "donor_bmi",
    "recipient_bmi",
    "donor_medical_risk",
    "recipient_medical_risk",
    "urgency_level",
    "gender_compatible",
    "blood_factor",
    "hla_factor",
    "storage_factor",
    "urgency_factor",
    "medical_risk_factor",
    "age_factor",
    "bmi_factor",
    "size_factor",
    "distance_factor",
    "gender_factor",
    "combined_factor_score",
];

/// Raw per-pair metrics shared by feature building and live scoring
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PairMetrics {
    pub hla_match_score: f64,
    pub blood_compatible: bool,
    pub organ_freshness_score: f64,
    /// NaN when a coordinate is missing
    pub gps_distance_km: f64,
    pub age_difference: f64,
    pub organ_size_difference: f64,
    /// 0 when unknown
    pub donor_bmi: f64,
    /// 0 when unknown
    pub recipient_bmi: f64,
    pub donor_medical_risk: f64,
    pub recipient_medical_risk: f64,
    pub urgency_level: f64,
    pub gender_compatible: f64,
    pub same_gender: Option<bool>,
    /// 0 when unknown
    pub donor_organ_size: f64,
}

impl PairMetrics {
    pub fn compute(donor: &Donor, recipient: &Recipient) -> Self {
        let genders =
            features::normalized_genders(donor.gender.as_deref(), recipient.gender.as_deref());

        Self {
            hla_match_score: features::hla_match_score(
                donor.hla_typing.as_deref(),
                recipient.hla_typing.as_deref(),
            ),
            blood_compatible: features::blood_compatible(
                donor.blood_group.as_deref(),
                recipient.blood_group.as_deref(),
            ),
            organ_freshness_score: features::organ_freshness_score(
                donor.organ_storage_hours,
                &donor.organ_type,
            ),
            gps_distance_km: features::gps_distance_km(
                donor.latitude,
                donor.longitude,
                recipient.latitude,
                recipient.longitude,
            ),
            age_difference: features::absolute_difference(
                donor.age.map(f64::from),
                recipient.age.map(f64::from),
            ),
            organ_size_difference: features::absolute_difference(
                donor.organ_size,
                recipient.organ_size_needed,
            ),
            donor_bmi: known_bmi(donor.bmi, "donor", donor.id),
            recipient_bmi: known_bmi(recipient.bmi, "recipient", recipient.id),
            donor_medical_risk: features::medical_risk_score(
                donor.diabetes,
                donor.hypertension,
                donor.smoking,
                donor.alcohol,
            ),
            recipient_medical_risk: features::medical_risk_score(
                recipient.diabetes,
                recipient.hypertension,
                false,
                false,
            ),
            urgency_level: match recipient.urgency_level {
                Some(level) if level > 0 => f64::from(level),
                _ => 1.0,
            },
            gender_compatible: features::gender_compatibility(
                donor.gender.as_deref(),
                recipient.gender.as_deref(),
            ),
            same_gender: genders.map(|(d, r)| d == r),
            donor_organ_size: donor.organ_size.unwrap_or(0.0),
        }
    }
}

fn known_bmi(bmi: Option<f64>, role: &str, id: RecordId) -> f64 {
    match bmi {
        Some(value) if value != 0.0 && !value.is_nan() => value,
        _ => {
            debug!("Missing BMI for {} {}, using average", role, id);
            0.0
        }
    }
}

/// Engineered features for one pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub donor_id: RecordId,
    pub recipient_id: RecordId,
    pub metrics: PairMetrics,
    pub factors: FactorSet,
}

impl FeatureVector {
    pub fn new(donor: &Donor, recipient: &Recipient) -> Self {
        let metrics = PairMetrics::compute(donor, recipient);
        let factors = FactorSet::from_metrics(&metrics);
        Self {
            donor_id: donor.id,
            recipient_id: recipient.id,
            metrics,
            factors,
        }
    }

    pub fn combined_factor_score(&self) -> f64 {
        self.factors.product()
    }

    /// Value of a named column, or `None` if the name is not a feature column.
    pub fn get(&self, column: &str) -> Option<f64> {
        let m = &self.metrics;
        let f = &self.factors;
        let value = match column {
            "hla_match_score" => m.hla_match_score,
            "blood_group_compatible" => bool_value(m.blood_compatible),
            "organ_freshness_score" => m.organ_freshness_score,
            "gps_distance_km" => m.gps_distance_km,
            "age_difference" => m.age_difference,
            "organ_size_difference" => m.organ_size_difference,
            "donor_bmi" => m.donor_bmi,
            "recipient_bmi" => m.recipient_bmi,
            "donor_medical_risk" => m.donor_medical_risk,
            "recipient_medical_risk" => m.recipient_medical_risk,
            "urgency_level" => m.urgency_level,
            "gender_compatible" => m.gender_compatible,
            "blood_factor" => f.blood,
            "hla_factor" => f.hla,
            "storage_factor" => f.storage,
            "urgency_factor" => f.urgency,
            "medical_risk_factor" => f.medical_risk,
            "age_factor" => f.age,
            "bmi_factor" => f.bmi,
            "size_factor" => f.size,
            "distance_factor" => f.distance,
            "gender_factor" => f.gender,
            "combined_factor_score" => self.combined_factor_score(),
            _ => return None,
        };
        Some(value)
    }

    /// Heuristic compatibility used as the training target.
    ///
    /// This is a proxy built from the same rules as the factor model, not a
    /// clinical outcome.
    pub fn heuristic_score(&self) -> f64 {
        let m = &self.metrics;
        m.hla_match_score * 0.25
            + bool_value(m.blood_compatible) * 0.25
            + (m.organ_freshness_score / 100.0) * 0.15
            + (1.0 - m.donor_medical_risk.min(1.0)) * 0.1
            + (1.0 - m.recipient_medical_risk.min(1.0)) * 0.1
            + self.combined_factor_score() * 0.15
    }

    /// Binary training label: 1 when the heuristic score exceeds 0.5.
    pub fn label(&self) -> u8 {
        u8::from(self.heuristic_score() > 0.5)
    }
}

fn bool_value(flag: bool) -> f64 {
    if flag {
        1.0
    } else {
        0.0
    }
}

/// Feature vectors for every organ-matching pair, recipient-major.
pub fn build_pairs(donors: &[Donor], recipients: &[Recipient]) -> Vec<FeatureVector> {
    let mut pairs = Vec::new();
    for recipient in recipients {
        for donor in donors {
            if donor.organ_type != recipient.organ_needed {
                continue;
            }
            pairs.push(FeatureVector::new(donor, recipient));
        }
    }
    pairs
}

/// Feature vectors and their heuristic labels.
pub fn build_labelled_pairs(
    donors: &[Donor],
    recipients: &[Recipient],
) -> (Vec<FeatureVector>, Vec<u8>) {
    let pairs = build_pairs(donors, recipients);
    let labels = pairs.iter().map(FeatureVector::label).collect();
    (pairs, labels)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn donor(id: RecordId, organ: &str) -> Donor {
        Donor::new(id, organ)
    }

    fn recipient(id: RecordId, organ: &str) -> Recipient {
        Recipient::new(id, organ)
    }

    #[test]
    fn test_pairs_only_for_matching_organs() {
        let donors = vec![donor(1, "Kidney"), donor(2, "Liver"), donor(3, "Kidney")];
        let recipients = vec![recipient(10, "Kidney"), recipient(11, "Heart"), recipient(12, "Kidney")];

        let pairs = build_pairs(&donors, &recipients);
        assert_eq!(pairs.len(), 4);

        let order: Vec<(RecordId, RecordId)> =
            pairs.iter().map(|p| (p.donor_id, p.recipient_id)).collect();
        assert_eq!(order, vec![(1, 10), (3, 10), (1, 12), (3, 12)]);
    }

    #[test]
    fn test_organ_match_is_exact() {
        let pairs = build_pairs(&[donor(1, "kidney")], &[recipient(2, "Kidney")]);
        assert!(pairs.is_empty());
    }

    #[test]
    fn test_every_column_resolves() {
        let pair = FeatureVector::new(&donor(1, "Kidney"), &recipient(2, "Kidney"));
        for column in FEATURE_COLUMNS {
            assert!(pair.get(column).is_some(), "missing column {column}");
        }
        assert!(pair.get("donor_id").is_none());
        assert!(pair.get("gps_distance_km").is_some_and(f64::is_nan));
    }

    #[test]
    fn test_defaults_for_sparse_records() {
        let pair = FeatureVector::new(&donor(1, "Kidney"), &recipient(2, "Kidney"));
        assert_eq!(pair.metrics.urgency_level, 1.0);
        assert_eq!(pair.metrics.donor_bmi, 0.0);
        assert_eq!(pair.metrics.gender_compatible, 0.7);
        assert_eq!(pair.factors.distance, 0.9);
        assert_eq!(pair.factors.blood, 0.15);
    }

    #[test]
    fn test_label_for_strong_pair() {
        let mut d = donor(1, "Kidney");
        d.blood_group = Some("O-".into());
        d.hla_typing = Some("A1,B8".into());
        d.organ_storage_hours = Some(1.0);
        let mut r = recipient(2, "Kidney");
        r.blood_group = Some("AB+".into());
        r.hla_typing = Some("A1,B8".into());
        r.urgency_level = Some(5);

        let pair = FeatureVector::new(&d, &r);
        assert!(pair.heuristic_score() > 0.5);
        assert_eq!(pair.label(), 1);
    }

    #[test]
    fn test_label_for_incompatible_pair() {
        let mut d = donor(1, "Heart");
        d.blood_group = Some("AB+".into());
        d.organ_storage_hours = Some(6.0);
        d.diabetes = true;
        d.smoking = true;
        let mut r = recipient(2, "Heart");
        r.blood_group = Some("O-".into());
        r.hla_typing = Some("A2".into());
        d.hla_typing = Some("A1".into());

        let pair = FeatureVector::new(&d, &r);
        assert_eq!(pair.label(), 0);
    }
}

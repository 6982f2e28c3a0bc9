//! Raw clinical metrics for a donor/recipient pair
//!
//! Every function here is total: missing or malformed inputs degrade to a
//! documented neutral value instead of failing.

/// Mean Earth radius in kilometres (IUGG)
pub const EARTH_RADIUS_KM: f64 = 6371.0088;

/// Neutral HLA score used when either typing is unknown
pub const NEUTRAL_HLA_SCORE: f64 = 0.5;

/// Maximum cold-storage time per organ type, in hours
pub const MAX_STORAGE_HOURS: [(&str, f64); 5] = [
    ("Kidney", 36.0),
    ("Liver", 12.0),
    ("Heart", 6.0),
    ("Lung", 8.0),
    ("Intestine", 6.0),
];

/// Donor HLA alleles present on the recipient side, over the larger allele count.
///
/// Typing strings are comma separated; case and whitespace are ignored.
/// Returns 0.5 when either side is missing or empty.
pub fn hla_match_score(donor_hla: Option<&str>, recipient_hla: Option<&str>) -> f64 {
    let (Some(donor), Some(recipient)) = (donor_hla, recipient_hla) else {
        return NEUTRAL_HLA_SCORE;
    };
    if donor.is_empty() || recipient.is_empty() {
        return NEUTRAL_HLA_SCORE;
    }

    let donor_alleles = split_alleles(donor);
    let recipient_alleles = split_alleles(recipient);

    let total = donor_alleles.len().max(recipient_alleles.len());
    if total == 0 {
        return NEUTRAL_HLA_SCORE;
    }

    let matches = donor_alleles
        .iter()
        .filter(|allele| recipient_alleles.contains(allele))
        .count();

    matches as f64 / total as f64
}

fn split_alleles(typing: &str) -> Vec<String> {
    typing
        .to_uppercase()
        .replace(' ', "")
        .split(',')
        .map(str::to_string)
        .collect()
}

/// Recipient blood groups that can receive from the given donor group
fn compatible_recipients(donor_group: &str) -> Option<&'static [&'static str]> {
    let recipients: &'static [&'static str] = match donor_group {
        "O+" => &["O+", "A+", "B+", "AB+"],
        "O-" => &["O+", "O-", "A+", "A-", "B+", "B-", "AB+", "AB-"],
        "A+" => &["A+", "AB+"],
        "A-" => &["A+", "A-", "AB+", "AB-"],
        "B+" => &["B+", "AB+"],
        "B-" => &["B+", "B-", "AB+", "AB-"],
        "AB+" => &["AB+"],
        "AB-" => &["AB+", "AB-"],
        _ => return None,
    };
    Some(recipients)
}

/// ABO/Rh compatibility. Unknown or missing groups are incompatible.
pub fn blood_compatible(donor_group: Option<&str>, recipient_group: Option<&str>) -> bool {
    let (Some(donor), Some(recipient)) = (donor_group, recipient_group) else {
        return false;
    };
    let donor = donor.trim().to_uppercase();
    let recipient = recipient.trim().to_uppercase();

    compatible_recipients(&donor)
        .map(|allowed| allowed.contains(&recipient.as_str()))
        .unwrap_or(false)
}

/// Maximum storage hours for an organ type, after trimming and capitalizing.
pub fn max_storage_hours(organ_type: &str) -> Option<f64> {
    let normalized = capitalize(organ_type.trim());
    MAX_STORAGE_HOURS
        .iter()
        .find(|(organ, _)| *organ == normalized)
        .map(|(_, hours)| *hours)
}

fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Linear freshness decay in [0, 100]; 0 for unknown organs or missing hours.
pub fn organ_freshness_score(storage_hours: Option<f64>, organ_type: &str) -> f64 {
    let Some(hours) = storage_hours.filter(|h| !h.is_nan()) else {
        return 0.0;
    };
    let Some(max_hours) = max_storage_hours(organ_type) else {
        return 0.0;
    };

    ((1.0 - hours / max_hours) * 100.0).clamp(0.0, 100.0)
}

/// Great-circle distance in kilometres, NaN when any coordinate is missing.
pub fn gps_distance_km(
    donor_lat: Option<f64>,
    donor_lon: Option<f64>,
    recipient_lat: Option<f64>,
    recipient_lon: Option<f64>,
) -> f64 {
    let (Some(lat1), Some(lon1), Some(lat2), Some(lon2)) =
        (donor_lat, donor_lon, recipient_lat, recipient_lon)
    else {
        return f64::NAN;
    };

    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

/// Absolute difference with missing values treated as zero.
pub fn absolute_difference(a: Option<f64>, b: Option<f64>) -> f64 {
    (a.unwrap_or(0.0) - b.unwrap_or(0.0)).abs()
}

/// 0.25 per present comorbidity flag.
pub fn medical_risk_score(diabetes: bool, hypertension: bool, smoking: bool, alcohol: bool) -> f64 {
    [diabetes, hypertension, smoking, alcohol]
        .iter()
        .filter(|flag| **flag)
        .count() as f64
        * 0.25
}

/// Same gender 0.8, different 0.6, unknown 0.7.
pub fn gender_compatibility(donor_gender: Option<&str>, recipient_gender: Option<&str>) -> f64 {
    match normalized_genders(donor_gender, recipient_gender) {
        Some((donor, recipient)) if donor == recipient => 0.8,
        Some(_) => 0.6,
        None => 0.7,
    }
}

/// Trimmed, lowercased gender pair; `None` if either side is missing or blank.
pub(crate) fn normalized_genders(
    donor_gender: Option<&str>,
    recipient_gender: Option<&str>,
) -> Option<(String, String)> {
    let donor = donor_gender.map(str::trim).filter(|g| !g.is_empty())?;
    let recipient = recipient_gender.map(str::trim).filter(|g| !g.is_empty())?;
    Some((donor.to_lowercase(), recipient.to_lowercase()))
}

//! Donor and recipient snapshots as handed over by the persistence layer.

use serde::{Deserialize, Serialize};

/// Opaque record identifier
pub type RecordId = i64;

/// A donated organ together with the donor's clinical attributes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Donor {
    pub id: RecordId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub blood_group: Option<String>,
    pub organ_type: String,
    #[serde(default)]
    pub bmi: Option<f64>,
    #[serde(default)]
    pub hla_typing: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub organ_storage_hours: Option<f64>,
    #[serde(default)]
    pub organ_size: Option<f64>,
    #[serde(default)]
    pub diabetes: bool,
    #[serde(default)]
    pub hypertension: bool,
    #[serde(default)]
    pub smoking: bool,
    #[serde(default)]
    pub alcohol: bool,
}

/// A patient waiting for an organ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipient {
    pub id: RecordId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub blood_group: Option<String>,
    pub organ_needed: String,
    #[serde(default)]
    pub bmi: Option<f64>,
    #[serde(default)]
    pub hla_typing: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub organ_size_needed: Option<f64>,
    #[serde(default)]
    pub diabetes: bool,
    #[serde(default)]
    pub hypertension: bool,
    #[serde(default)]
    pub urgency_level: Option<u8>,
}

impl Donor {
    /// Minimal donor for the given organ; every optional attribute is unset.
    pub fn new(id: RecordId, organ_type: impl Into<String>) -> Self {
        Self {
            id,
            name: String::new(),
            age: None,
            gender: None,
            blood_group: None,
            organ_type: organ_type.into(),
            bmi: None,
            hla_typing: None,
            latitude: None,
            longitude: None,
            organ_storage_hours: None,
            organ_size: None,
            diabetes: false,
            hypertension: false,
            smoking: false,
            alcohol: false,
        }
    }

    /// Location is the only attribute that may change after creation.
    pub fn with_location(mut self, latitude: f64, longitude: f64) -> Self {
        self.latitude = Some(latitude);
        self.longitude = Some(longitude);
        self
    }
}

impl Recipient {
    /// Minimal recipient needing the given organ; every optional attribute is unset.
    pub fn new(id: RecordId, organ_needed: impl Into<String>) -> Self {
        Self {
            id,
            name: String::new(),
            age: None,
            gender: None,
            blood_group: None,
            organ_needed: organ_needed.into(),
            bmi: None,
            hla_typing: None,
            latitude: None,
            longitude: None,
            organ_size_needed: None,
            diabetes: false,
            hypertension: false,
            urgency_level: None,
        }
    }

    pub fn with_location(mut self, latitude: f64, longitude: f64) -> Self {
        self.latitude = Some(latitude);
        self.longitude = Some(longitude);
        self
    }
}

//! Live donor and recipient registry

use organmatch_core::{Donor, RecordId, Recipient};
use parking_lot::RwLock;
use std::collections::BTreeMap;

use crate::errors::{Result, ServiceError};

/// Read access to the current records, in id order
pub trait RecordSource: Send + Sync {
    fn donors(&self) -> Vec<Donor>;
    fn recipients(&self) -> Vec<Recipient>;

    fn donor(&self, id: RecordId) -> Option<Donor>;
    fn recipient(&self, id: RecordId) -> Option<Recipient>;

    /// Both lists as of one instant
    fn snapshot(&self) -> (Vec<Donor>, Vec<Recipient>) {
        (self.donors(), self.recipients())
    }
}

/// In-memory registry keyed by record id
#[derive(Debug, Default)]
pub struct MemoryRecords {
    donors: RwLock<BTreeMap<RecordId, Donor>>,
    recipients: RwLock<BTreeMap<RecordId, Recipient>>,
}

impl MemoryRecords {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a donor
    pub fn upsert_donor(&self, donor: Donor) {
        self.donors.write().insert(donor.id, donor);
    }

    /// Insert or replace a recipient
    pub fn upsert_recipient(&self, recipient: Recipient) {
        self.recipients.write().insert(recipient.id, recipient);
    }

    pub fn update_donor_location(&self, id: RecordId, latitude: f64, longitude: f64) -> Result<()> {
        let mut donors = self.donors.write();
        let donor = donors.remove(&id).ok_or(ServiceError::UnknownDonor(id))?;
        donors.insert(id, donor.with_location(latitude, longitude));
        Ok(())
    }

    pub fn update_recipient_location(
        &self,
        id: RecordId,
        latitude: f64,
        longitude: f64,
    ) -> Result<()> {
        let mut recipients = self.recipients.write();
        let recipient = recipients
            .remove(&id)
            .ok_or(ServiceError::UnknownRecipient(id))?;
        recipients.insert(id, recipient.with_location(latitude, longitude));
        Ok(())
    }

    pub fn donor_count(&self) -> usize {
        self.donors.read().len()
    }

    pub fn recipient_count(&self) -> usize {
        self.recipients.read().len()
    }
}

impl RecordSource for MemoryRecords {
    fn donors(&self) -> Vec<Donor> {
        self.donors.read().values().cloned().collect()
    }

    fn recipients(&self) -> Vec<Recipient> {
        self.recipients.read().values().cloned().collect()
    }

    fn donor(&self, id: RecordId) -> Option<Donor> {
        self.donors.read().get(&id).cloned()
    }

    fn recipient(&self, id: RecordId) -> Option<Recipient> {
        self.recipients.read().get(&id).cloned()
    }

    fn snapshot(&self) -> (Vec<Donor>, Vec<Recipient>) {
        let donors = self.donors.read();
        let recipients = self.recipients.read();
        (
            donors.values().cloned().collect(),
            recipients.values().cloned().collect(),
        )
    }
}

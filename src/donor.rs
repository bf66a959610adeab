//! Donor candidate record and pledge validation
use crate::error::{TransitionError, ValidationError};
use crate::types::{BloodType, OrganType, TimeStamp};
use crate::utils::new_uuid_to_bech32;
use chrono::Utc;
use sled::Db;

/// Draft for registering a donor, validated once on
/// [`DonorCandidateDraft::finalise`].
#[derive(Debug, Default)]
pub struct DonorCandidateDraft {
    full_name: Option<String>,
    blood_type: Option<BloodType>,
    age: u8,
    health_score: u8,
    location: Option<String>,
    pledged: Vec<OrganType>,
}

impl DonorCandidateDraft {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_full_name(mut self, full_name: String) -> Self {
        self.full_name = Some(full_name);
        self
    }
    pub fn set_blood_type(mut self, blood_type: BloodType) -> Self {
        self.blood_type = Some(blood_type);
        self
    }
    pub fn set_age(mut self, age: u8) -> Self {
        self.age = age;
        self
    }
    pub fn set_health_score(mut self, health_score: u8) -> Self {
        self.health_score = health_score;
        self
    }
    pub fn set_location(mut self, location: String) -> Self {
        self.location = Some(location);
        self
    }
    pub fn pledge(mut self, organ: OrganType) -> Self {
        if !self.pledged.contains(&organ) {
            self.pledged.push(organ);
        }
        self
    }

    pub fn finalise(self) -> anyhow::Result<DonorCandidate> {
        let full_name = self
            .full_name
            .ok_or(ValidationError::MissingField("full_name"))?;
        let blood_type = self
            .blood_type
            .ok_or(ValidationError::MissingField("blood_type"))?;
        let location = self
            .location
            .ok_or(ValidationError::MissingField("location"))?;

        if self.pledged.is_empty() {
            return Err(ValidationError::EmptyPledge.into());
        }
        if self.health_score > 100 {
            return Err(ValidationError::HealthScoreOutOfRange(self.health_score).into());
        }
        if self.age == 0 {
            return Err(ValidationError::ImplausibleAge(self.age).into());
        }

        Ok(DonorCandidate {
            donor_id: new_uuid_to_bech32("donor_")?,
            full_name,
            blood_type,
            age: self.age,
            health_score: self.health_score,
            location,
            pledged: self.pledged,
            available: true,
            registered_at: TimeStamp::new(),
        })
    }
}

// key is "donor/" followed by the bech32 donor id
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct DonorCandidate {
    #[n(0)]
    pub donor_id: String,
    #[n(1)]
    pub full_name: String,
    #[n(2)]
    pub blood_type: BloodType,
    #[n(3)]
    pub age: u8,
    #[n(4)]
    pub health_score: u8,
    #[n(5)]
    pub location: String,
    #[n(6)]
    pub pledged: Vec<OrganType>,
    #[n(7)]
    pub available: bool,
    #[n(8)]
    pub registered_at: TimeStamp<Utc>,
}

impl DonorCandidate {
    pub fn db_key(donor_id: &str) -> Vec<u8> {
        format!("donor/{donor_id}").into_bytes()
    }

    /// A donor enters matching only while available and pledging the organ.
    pub fn is_eligible_for(&self, organ: OrganType, recipient_blood: BloodType) -> bool {
        self.available
            && self.pledged.contains(&organ)
            && self.blood_type.can_donate_to(recipient_blood)
    }

    pub fn save_to_db(&self, db: &Db) -> anyhow::Result<()> {
        db.insert(Self::db_key(&self.donor_id), minicbor::to_vec(self)?)?;
        Ok(())
    }

    pub fn load_from_db(db: &Db, donor_id: &str) -> anyhow::Result<Self> {
        let bytes = db
            .get(Self::db_key(donor_id))?
            .ok_or_else(|| TransitionError::UnknownDonor(donor_id.to_string()))?;
        Ok(minicbor::decode(&bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> DonorCandidateDraft {
        DonorCandidateDraft::new()
            .set_full_name("Test Donor".to_string())
            .set_blood_type(BloodType::ONeg)
            .set_age(34)
            .set_health_score(90)
            .set_location("Nairobi".to_string())
            .pledge(OrganType::Kidneys)
    }

    #[test]
    fn finalise_accepts_valid_draft() {
        let donor = draft().finalise().unwrap();

        assert!(donor.donor_id.starts_with("donor_1"));
        assert!(donor.available);
        assert_eq!(donor.pledged, vec![OrganType::Kidneys]);
    }

    #[test]
    fn finalise_rejects_empty_pledge() {
        let no_pledge = DonorCandidateDraft::new()
            .set_full_name("Test Donor".to_string())
            .set_blood_type(BloodType::ONeg)
            .set_age(34)
            .set_health_score(90)
            .set_location("Nairobi".to_string());

        assert!(no_pledge.finalise().is_err());
    }

    #[test]
    fn finalise_rejects_health_score_over_100() {
        assert!(draft().set_health_score(101).finalise().is_err());
    }

    #[test]
    fn pledge_deduplicates() {
        let donor = draft().pledge(OrganType::Kidneys).finalise().unwrap();
        assert_eq!(donor.pledged.len(), 1);
    }

    #[test]
    fn eligibility_requires_pledge_availability_and_blood() {
        let mut donor = draft().finalise().unwrap();

        assert!(donor.is_eligible_for(OrganType::Kidneys, BloodType::APos));
        assert!(!donor.is_eligible_for(OrganType::Heart, BloodType::APos));

        donor.available = false;
        assert!(!donor.is_eligible_for(OrganType::Kidneys, BloodType::APos));

        donor.available = true;
        donor.blood_type = BloodType::AbPos;
        assert!(!donor.is_eligible_for(OrganType::Kidneys, BloodType::APos));
    }
}

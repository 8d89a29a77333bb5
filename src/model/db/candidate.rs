use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::model::{
    common::{status::CandidateStatus, MemberId, PropertyId},
    mongodb::Id,
};

/// Core candidate data, as stored in the database.
///
/// Everything except `status` is fixed at creation; `status` is derived from
/// the candidate's ballots and rewritten on every ballot mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateCore {
    /// Foreign Key group ID.
    pub group_id: Id,
    /// The property under consideration.
    pub property_id: PropertyId,
    /// The member who put the property forward.
    pub added_by: MemberId,
    pub status: CandidateStatus,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl CandidateCore {
    /// A fresh candidate, with no ballots and therefore still being voted on.
    pub fn new(group_id: Id, property_id: PropertyId, added_by: MemberId) -> Self {
        Self {
            group_id,
            property_id,
            added_by,
            status: CandidateStatus::Voting,
            created_at: Utc::now(),
        }
    }
}

/// A candidate without an ID.
pub type NewCandidate = CandidateCore;

/// A candidate from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub candidate: CandidateCore,
}

impl Deref for Candidate {
    type Target = CandidateCore;

    fn deref(&self) -> &Self::Target {
        &self.candidate
    }
}

impl DerefMut for Candidate {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.candidate
    }
}

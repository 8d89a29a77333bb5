use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::model::{
    common::{vote::Vote, MemberId, PropertyId},
    mongodb::Id,
};

/// Core ballot data, as stored in the database.
/// There is at most one ballot per (group, property, member).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallotCore {
    /// Foreign Key group ID.
    pub group_id: Id,
    /// The candidate property within the group.
    pub property_id: PropertyId,
    /// The member who cast this ballot.
    pub member_id: MemberId,
    pub vote: Vote,
    /// Time of the most recent cast, which overwrites any previous one.
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl BallotCore {
    pub fn new(group_id: Id, property_id: PropertyId, member_id: MemberId, vote: Vote) -> Self {
        Self {
            group_id,
            property_id,
            member_id,
            vote,
            updated_at: Utc::now(),
        }
    }
}

/// A ballot without an ID.
pub type NewBallot = BallotCore;

/// A ballot from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ballot {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub ballot: BallotCore,
}

impl Deref for Ballot {
    type Target = BallotCore;

    fn deref(&self) -> &Self::Target {
        &self.ballot
    }
}

impl DerefMut for Ballot {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.ballot
    }
}

use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::model::{
    common::{invite::InviteCode, MemberId},
    mongodb::Id,
};

/// Core group data, as stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupCore {
    /// Display name.
    pub name: String,
    /// Unique code used to join the group.
    pub invite_code: InviteCode,
    /// The member who created the group.
    pub created_by: MemberId,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl GroupCore {
    /// Create a new group with the given invite code.
    pub fn new(name: String, invite_code: InviteCode, created_by: MemberId) -> Self {
        Self {
            name,
            invite_code,
            created_by,
            created_at: Utc::now(),
        }
    }
}

/// A group without an ID.
pub type NewGroup = GroupCore;

/// A group from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub group: GroupCore,
}

impl Deref for Group {
    type Target = GroupCore;

    fn deref(&self) -> &Self::Target {
        &self.group
    }
}

impl DerefMut for Group {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.group
    }
}

use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::model::{
    common::{role::Role, MemberId},
    mongodb::Id,
};

/// Core membership data, as stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipCore {
    /// Foreign Key group ID.
    pub group_id: Id,
    /// Identity-provider ID of the member.
    pub member_id: MemberId,
    /// Name shown next to the member's ballots.
    pub display_name: String,
    pub role: Role,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub joined_at: DateTime<Utc>,
}

impl MembershipCore {
    pub fn new(group_id: Id, member_id: MemberId, display_name: String, role: Role) -> Self {
        Self {
            group_id,
            member_id,
            display_name,
            role,
            joined_at: Utc::now(),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// A membership without an ID.
pub type NewMembership = MembershipCore;

/// A membership from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub membership: MembershipCore,
}

impl Deref for Membership {
    type Target = MembershipCore;

    fn deref(&self) -> &Self::Target {
        &self.membership
    }
}

impl DerefMut for Membership {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.membership
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    common::{invite::InviteCode, role::Role, MemberId},
    db::{group::Group, membership::Membership},
    mongodb::ApiId,
};
use crate::tracker::GroupDetails;

/// A request to create a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSpec {
    pub name: String,
}

/// A request to join a group by its invite code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRequest {
    pub invite_code: String,
}

/// A group without its members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSummary {
    pub id: ApiId,
    pub name: String,
    pub invite_code: InviteCode,
    pub created_by: MemberId,
    pub created_at: DateTime<Utc>,
}

impl From<Group> for GroupSummary {
    fn from(group: Group) -> Self {
        Self {
            id: group.id.into(),
            name: group.group.name,
            invite_code: group.group.invite_code,
            created_by: group.group.created_by,
            created_at: group.group.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberDescription {
    pub member_id: MemberId,
    pub display_name: String,
    pub role: Role,
    pub joined_at: DateTime<Utc>,
}

impl From<Membership> for MemberDescription {
    fn from(membership: Membership) -> Self {
        Self {
            member_id: membership.membership.member_id,
            display_name: membership.membership.display_name,
            role: membership.membership.role,
            joined_at: membership.membership.joined_at,
        }
    }
}

/// A group with its member list, in joining order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupDescription {
    #[serde(flatten)]
    pub group: GroupSummary,
    pub members: Vec<MemberDescription>,
}

impl From<GroupDetails> for GroupDescription {
    fn from(details: GroupDetails) -> Self {
        Self {
            group: details.group.into(),
            members: details.members.into_iter().map(Into::into).collect(),
        }
    }
}

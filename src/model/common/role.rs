use mongodb::bson::{to_bson, Bson};
use serde::{Deserialize, Serialize};

/// A member's privileges within one group.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Can remove other members and delete the group.
    Admin,
    /// Can add candidates and vote.
    Member,
}

impl From<Role> for Bson {
    fn from(role: Role) -> Self {
        to_bson(&role).expect("Serialisation is infallible")
    }
}

//! The persistence seam.
//!
//! Every method is a single unit of work: implementations must apply all of a
//! method's writes atomically, so that no reader ever sees a ballot without
//! the matching candidate status or a group without its creator.

use crate::error::Result;
use crate::model::{
    common::{invite::InviteCode, role::Role, tally::Tally},
    db::{
        ballot::{Ballot, NewBallot},
        candidate::{Candidate, NewCandidate},
        group::Group,
        membership::{Membership, NewMembership},
    },
    mongodb::Id,
};

mod memory;
mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

#[rocket::async_trait]
pub trait Store: Send + Sync {
    /// Insert a group together with its creator's membership.
    /// Fails with `Conflict` if the invite code is already taken.
    async fn create_group(&self, group: &Group, creator: &NewMembership) -> Result<()>;

    async fn group(&self, group_id: Id) -> Result<Option<Group>>;

    async fn group_by_invite(&self, code: &InviteCode) -> Result<Option<Group>>;

    /// All groups the member belongs to, oldest first.
    async fn groups_for_member(&self, member_id: &str) -> Result<Vec<Group>>;

    /// Delete a group and everything it owns. Returns false if it didn't exist.
    async fn delete_group(&self, group_id: Id) -> Result<bool>;

    /// Fails with `Conflict` if the member already belongs to the group.
    async fn add_membership(&self, membership: &NewMembership) -> Result<()>;

    async fn membership(&self, group_id: Id, member_id: &str) -> Result<Option<Membership>>;

    /// All memberships of a group, in joining order.
    async fn memberships(&self, group_id: Id) -> Result<Vec<Membership>>;

    /// Change a member's role. Returns false if they are not a member.
    async fn set_role(&self, group_id: Id, member_id: &str, role: Role) -> Result<bool>;

    /// Remove a member along with their ballots in the group, recomputing the
    /// status of every candidate they had voted on.
    /// Returns false if they were not a member.
    async fn remove_membership(&self, group_id: Id, member_id: &str) -> Result<bool>;

    /// Fails with `Conflict` if the property is already a candidate in the group.
    async fn add_candidate(&self, candidate: &NewCandidate) -> Result<Candidate>;

    async fn candidate(&self, group_id: Id, property_id: &str) -> Result<Option<Candidate>>;

    /// All candidates of a group, oldest first.
    async fn candidates(&self, group_id: Id) -> Result<Vec<Candidate>>;

    /// Delete a candidate and its ballots. Returns false if it didn't exist.
    async fn remove_candidate(&self, group_id: Id, property_id: &str) -> Result<bool>;

    /// Insert or overwrite the ballot, then recompute and store the candidate's
    /// status from its full ballot set. Returns the tally the status was derived from.
    /// Fails with `Forbidden` if the caster is no longer a member, checked in
    /// the same unit of work as the write, and with `NotFound` if the candidate
    /// does not exist.
    async fn record_ballot(&self, ballot: &NewBallot) -> Result<Tally>;

    async fn ballots(&self, group_id: Id, property_id: &str) -> Result<Vec<Ballot>>;
}

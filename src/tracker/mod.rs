//! Group, candidate and ballot operations on behalf of an identified member.
//!
//! Every operation takes the calling [`Member`] explicitly and checks its
//! preconditions in a fixed order: the group must exist (`NotFound`), the
//! caller must belong to it (`Forbidden`), and only then is the candidate or
//! target looked up.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::model::{
    common::{
        invite::InviteCode,
        member::Member,
        role::Role,
        status::{CandidateStatus, CandidateView},
        tally::Tally,
        vote::Vote,
    },
    db::{
        ballot::{Ballot, NewBallot},
        candidate::{Candidate, NewCandidate},
        group::{Group, NewGroup},
        membership::{Membership, NewMembership},
    },
    mongodb::Id,
};
use crate::store::Store;

pub mod retry;

pub use retry::RetryPolicy;

/// Longest allowed group name, in characters.
pub const MAX_GROUP_NAME_LENGTH: usize = 100;

/// Shown next to ballots whose caster is no longer in the group.
pub const FORMER_MEMBER: &str = "Former member";

/// Default number of invite codes tried before giving up on creating a group.
pub const DEFAULT_INVITE_CODE_ATTEMPTS: u32 = 5;

/// The aggregate status of a candidate and the counts it was derived from.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Consensus {
    pub status: CandidateStatus,
    pub tally: Tally,
}

impl From<Tally> for Consensus {
    fn from(tally: Tally) -> Self {
        Self {
            status: tally.status(),
            tally,
        }
    }
}

/// A group together with everyone in it.
#[derive(Debug, Clone)]
pub struct GroupDetails {
    pub group: Group,
    pub members: Vec<Membership>,
}

/// A candidate with its current consensus.
#[derive(Debug, Clone)]
pub struct CandidateDetails {
    pub candidate: Candidate,
    pub consensus: Consensus,
}

/// A ballot annotated with the name of whoever cast it.
#[derive(Debug, Clone)]
pub struct AnnotatedBallot {
    pub ballot: Ballot,
    pub display_name: String,
}

/// Everything cast on a candidate.
#[derive(Debug, Clone)]
pub struct CandidateBallots {
    pub candidate: Candidate,
    pub consensus: Consensus,
    pub ballots: Vec<AnnotatedBallot>,
}

pub struct ConsensusTracker {
    store: Arc<dyn Store>,
    retry: RetryPolicy,
    invite_code_attempts: u32,
}

impl ConsensusTracker {
    pub fn new(store: Arc<dyn Store>, retry: RetryPolicy, invite_code_attempts: u32) -> Self {
        Self {
            store,
            retry,
            invite_code_attempts: invite_code_attempts.max(1),
        }
    }

    /// Create a group with a fresh invite code, making the caller its admin.
    pub async fn create_group(&self, member: &Member, name: &str) -> Result<Group> {
        let name = name.trim();
        if name.is_empty() || name.chars().count() > MAX_GROUP_NAME_LENGTH {
            return Err(Error::BadRequest(format!(
                "Group name must be between 1 and {MAX_GROUP_NAME_LENGTH} characters"
            )));
        }

        for attempt in 1..=self.invite_code_attempts {
            let code = InviteCode::generate(rand::thread_rng());
            let group = Group {
                id: Id::new(),
                group: NewGroup::new(name.to_string(), code, member.id.clone()),
            };
            let creator = NewMembership::new(
                group.id,
                member.id.clone(),
                member.display_name.clone(),
                Role::Admin,
            );
            match self
                .retry
                .run("create group", || self.store.create_group(&group, &creator))
                .await
            {
                Ok(()) => {
                    info!("{} created group {} ({name})", member.id, group.id);
                    return Ok(group);
                }
                Err(Error::Conflict(_)) => {
                    warn!("Invite code collision on attempt {attempt}, regenerating");
                }
                Err(err) => return Err(err),
            }
        }

        error!(
            "No unique invite code after {} attempts",
            self.invite_code_attempts
        );
        Err(Error::conflict(
            "Could not generate a unique invite code, please try again",
        ))
    }

    /// Join the group with the given invite code as an ordinary member.
    pub async fn join_group(&self, member: &Member, invite_code: &str) -> Result<Group> {
        let code = InviteCode::parse(invite_code);
        let group = self
            .store
            .group_by_invite(&code)
            .await?
            .ok_or_else(|| Error::not_found(format!("Group with invite code {code}")))?;

        let membership = NewMembership::new(
            group.id,
            member.id.clone(),
            member.display_name.clone(),
            Role::Member,
        );
        self.retry
            .run("join group", || self.store.add_membership(&membership))
            .await?;
        info!("{} joined group {}", member.id, group.id);
        Ok(group)
    }

    /// All groups the caller belongs to.
    pub async fn groups(&self, member: &Member) -> Result<Vec<Group>> {
        self.store.groups_for_member(&member.id).await
    }

    pub async fn group(&self, member: &Member, group_id: Id) -> Result<GroupDetails> {
        let (group, _) = self.require_member(member, group_id).await?;
        let members = self.store.memberships(group_id).await?;
        Ok(GroupDetails { group, members })
    }

    /// Leave a group, discarding the caller's ballots.
    ///
    /// The last admin cannot leave while anyone else remains, and the group is
    /// deleted when its last member leaves.
    pub async fn leave_group(&self, member: &Member, group_id: Id) -> Result<()> {
        self.retry
            .run("leave group", || self.leave_group_once(member, group_id))
            .await
    }

    async fn leave_group_once(&self, member: &Member, group_id: Id) -> Result<()> {
        let (_, membership) = self.require_member(member, group_id).await?;
        let members = self.store.memberships(group_id).await?;

        if members.len() == 1 {
            self.store.delete_group(group_id).await?;
            info!("Last member {} left, deleted group {group_id}", member.id);
            return Ok(());
        }

        let admins = members.iter().filter(|m| m.is_admin()).count();
        if membership.is_admin() && admins == 1 {
            return Err(Error::conflict(
                "You are the only admin of this group, promote another member first",
            ));
        }

        self.store.remove_membership(group_id, &member.id).await?;
        info!("{} left group {group_id}", member.id);
        Ok(())
    }

    /// Remove someone else from the group. Admin only.
    pub async fn remove_member(&self, admin: &Member, group_id: Id, target: &str) -> Result<()> {
        self.require_admin(admin, group_id).await?;
        if target == admin.id {
            return Err(Error::BadRequest(
                "Admins cannot remove themselves, leave the group instead".to_string(),
            ));
        }

        let removed = self
            .retry
            .run("remove member", || {
                self.store.remove_membership(group_id, target)
            })
            .await?;
        if !removed {
            return Err(Error::not_found(format!("Member {target} in group {group_id}")));
        }
        info!("{} removed {target} from group {group_id}", admin.id);
        Ok(())
    }

    /// Make another member an admin. Admin only.
    pub async fn promote_member(&self, admin: &Member, group_id: Id, target: &str) -> Result<()> {
        self.require_admin(admin, group_id).await?;
        let promoted = self
            .retry
            .run("promote member", || {
                self.store.set_role(group_id, target, Role::Admin)
            })
            .await?;
        if !promoted {
            return Err(Error::not_found(format!("Member {target} in group {group_id}")));
        }
        info!("{} promoted {target} in group {group_id}", admin.id);
        Ok(())
    }

    /// Delete a group and everything in it. Admin only.
    pub async fn delete_group(&self, admin: &Member, group_id: Id) -> Result<()> {
        self.require_admin(admin, group_id).await?;
        let deleted = self
            .retry
            .run("delete group", || self.store.delete_group(group_id))
            .await?;
        if !deleted {
            return Err(Error::not_found(format!("Group {group_id}")));
        }
        info!("{} deleted group {group_id}", admin.id);
        Ok(())
    }

    /// Put a property forward for the group to vote on.
    pub async fn add_candidate(
        &self,
        member: &Member,
        group_id: Id,
        property_id: &str,
    ) -> Result<Candidate> {
        let property_id = property_id.trim();
        if property_id.is_empty() {
            return Err(Error::BadRequest("Property ID must not be empty".to_string()));
        }
        self.require_member(member, group_id).await?;

        let candidate = NewCandidate::new(group_id, property_id.to_string(), member.id.clone());
        let candidate = self
            .retry
            .run("add candidate", || self.store.add_candidate(&candidate))
            .await?;
        info!("{} added {property_id} to group {group_id}", member.id);
        Ok(candidate)
    }

    /// Drop a candidate and all of its ballots.
    pub async fn remove_candidate(
        &self,
        member: &Member,
        group_id: Id,
        property_id: &str,
    ) -> Result<()> {
        self.require_member(member, group_id).await?;
        let removed = self
            .retry
            .run("remove candidate", || {
                self.store.remove_candidate(group_id, property_id)
            })
            .await?;
        if !removed {
            return Err(candidate_not_found(group_id, property_id));
        }
        info!("{} removed {property_id} from group {group_id}", member.id);
        Ok(())
    }

    /// The candidates that belong in the given view, oldest first.
    pub async fn candidates(
        &self,
        member: &Member,
        group_id: Id,
        view: CandidateView,
    ) -> Result<Vec<Candidate>> {
        self.require_member(member, group_id).await?;
        let mut candidates = self.store.candidates(group_id).await?;
        candidates.retain(|c| view.includes(c.status));
        candidates.sort_by_key(|c| c.created_at);
        Ok(candidates)
    }

    pub async fn candidate(
        &self,
        member: &Member,
        group_id: Id,
        property_id: &str,
    ) -> Result<CandidateDetails> {
        self.require_member(member, group_id).await?;
        let candidate = self.require_candidate(group_id, property_id).await?;
        let ballots = self.store.ballots(group_id, property_id).await?;
        let consensus: Consensus = ballots.iter().map(|b| b.vote).collect::<Tally>().into();
        Ok(CandidateDetails {
            candidate,
            consensus,
        })
    }

    /// Cast or overwrite the caller's ballot, returning the new consensus.
    ///
    /// The whole operation is rerun if the store aborts it.
    pub async fn cast_ballot(
        &self,
        member: &Member,
        group_id: Id,
        property_id: &str,
        vote: Vote,
    ) -> Result<Consensus> {
        self.retry
            .run("cast ballot", || {
                self.cast_ballot_once(member, group_id, property_id, vote)
            })
            .await
    }

    async fn cast_ballot_once(
        &self,
        member: &Member,
        group_id: Id,
        property_id: &str,
        vote: Vote,
    ) -> Result<Consensus> {
        self.require_member(member, group_id).await?;
        let before = self.require_candidate(group_id, property_id).await?.status;

        let ballot = NewBallot::new(group_id, property_id.to_string(), member.id.clone(), vote);
        let consensus = Consensus::from(self.store.record_ballot(&ballot).await?);

        if consensus.status != before {
            info!(
                "Candidate {property_id} in group {group_id}: {before} -> {}",
                consensus.status
            );
        } else {
            debug!(
                "Candidate {property_id} in group {group_id} stays {before} after {} voted {vote}",
                member.id
            );
        }
        Ok(consensus)
    }

    /// Every ballot on a candidate, with the caster's display name.
    pub async fn ballots(
        &self,
        member: &Member,
        group_id: Id,
        property_id: &str,
    ) -> Result<CandidateBallots> {
        self.require_member(member, group_id).await?;
        let candidate = self.require_candidate(group_id, property_id).await?;
        let ballots = self.store.ballots(group_id, property_id).await?;
        let memberships = self.store.memberships(group_id).await?;

        let names: HashMap<&str, &str> = memberships
            .iter()
            .map(|m| (m.member_id.as_str(), m.display_name.as_str()))
            .collect();
        let consensus: Consensus = ballots.iter().map(|b| b.vote).collect::<Tally>().into();
        let ballots = ballots
            .into_iter()
            .map(|ballot| {
                let display_name = names
                    .get(ballot.member_id.as_str())
                    .copied()
                    .unwrap_or(FORMER_MEMBER)
                    .to_string();
                AnnotatedBallot {
                    ballot,
                    display_name,
                }
            })
            .collect();

        Ok(CandidateBallots {
            candidate,
            consensus,
            ballots,
        })
    }

    /// Look up the group and the caller's membership of it.
    async fn require_member(&self, member: &Member, group_id: Id) -> Result<(Group, Membership)> {
        let group = self
            .store
            .group(group_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Group {group_id}")))?;
        let membership = self
            .store
            .membership(group_id, &member.id)
            .await?
            .ok_or_else(|| {
                Error::forbidden(format!("{} is not a member of group {group_id}", member.id))
            })?;
        Ok((group, membership))
    }

    async fn require_admin(&self, member: &Member, group_id: Id) -> Result<(Group, Membership)> {
        let (group, membership) = self.require_member(member, group_id).await?;
        if !membership.is_admin() {
            return Err(Error::forbidden(format!(
                "{} is not an admin of group {group_id}",
                member.id
            )));
        }
        Ok((group, membership))
    }

    async fn require_candidate(&self, group_id: Id, property_id: &str) -> Result<Candidate> {
        self.store
            .candidate(group_id, property_id)
            .await?
            .ok_or_else(|| candidate_not_found(group_id, property_id))
    }
}

fn candidate_not_found(group_id: Id, property_id: &str) -> Error {
    Error::not_found(format!("Candidate {property_id} in group {group_id}"))
}

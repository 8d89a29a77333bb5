#[cfg(test)]
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::Utc;
use rocket::tokio::sync::Mutex;

use crate::error::{Error, Result};
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

use super::Store;

/// All records, guarded by a single lock so that every operation is atomic.
#[derive(Default)]
struct Tables {
    groups: Vec<Group>,
    memberships: Vec<Membership>,
    candidates: Vec<Candidate>,
    ballots: Vec<Ballot>,
}

impl Tables {
    /// Recompute a candidate's status from its ballots.
    /// Returns `None` if the candidate does not exist.
    fn recompute(&mut self, group_id: Id, property_id: &str) -> Option<Tally> {
        let tally = self
            .ballots
            .iter()
            .filter(|b| b.group_id == group_id && b.property_id == property_id)
            .map(|b| b.vote)
            .collect::<Tally>();
        let candidate = self
            .candidates
            .iter_mut()
            .find(|c| c.group_id == group_id && c.property_id == property_id)?;
        candidate.status = tally.status();
        Some(tally)
    }

    /// Remove a membership and the member's ballots, recomputing what they touched.
    fn remove_membership(&mut self, group_id: Id, member_id: &str) -> bool {
        let before = self.memberships.len();
        self.memberships
            .retain(|m| !(m.group_id == group_id && m.member_id == member_id));
        if self.memberships.len() == before {
            return false;
        }

        let mut touched = Vec::new();
        self.ballots.retain(|b| {
            let theirs = b.group_id == group_id && b.member_id == member_id;
            if theirs {
                touched.push(b.property_id.clone());
            }
            !theirs
        });
        for property_id in touched {
            self.recompute(group_id, &property_id);
        }
        true
    }
}

/// A store that lives entirely in process memory.
/// Used when no database is configured, and by the tests.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    #[cfg(test)]
    failures: AtomicU32,
    #[cfg(test)]
    evictions: std::sync::Mutex<Vec<(Id, String)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` ballot writes abort as if they had hit a write conflict.
    #[cfg(test)]
    pub fn fail_next_ballots(&self, count: u32) {
        self.failures.store(count, Ordering::SeqCst);
    }

    #[cfg(test)]
    fn injected_failure(&self) -> Result<()> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(Error::TransientStore("injected write conflict".to_string()));
        }
        Ok(())
    }

    #[cfg(not(test))]
    fn injected_failure(&self) -> Result<()> {
        Ok(())
    }

    /// Remove the member just before the next ballot write takes the lock, as
    /// a removal committing between the caller's checks and the write would.
    #[cfg(test)]
    pub fn remove_before_next_ballot(&self, group_id: Id, member_id: &str) {
        if let Ok(mut evictions) = self.evictions.lock() {
            evictions.push((group_id, member_id.to_string()));
        }
    }

    #[cfg(test)]
    fn evict_pending(&self, tables: &mut Tables) {
        let pending = match self.evictions.lock() {
            Ok(mut evictions) => std::mem::take(&mut *evictions),
            Err(_) => return,
        };
        for (group_id, member_id) in pending {
            tables.remove_membership(group_id, &member_id);
        }
    }

    #[cfg(not(test))]
    fn evict_pending(&self, _tables: &mut Tables) {}
}

#[rocket::async_trait]
impl Store for MemoryStore {
    async fn create_group(&self, group: &Group, creator: &NewMembership) -> Result<()> {
        let mut tables = self.tables.lock().await;
        if tables
            .groups
            .iter()
            .any(|g| g.invite_code == group.invite_code)
        {
            return Err(Error::conflict("Invite code already in use"));
        }
        tables.groups.push(group.clone());
        tables.memberships.push(Membership {
            id: Id::new(),
            membership: creator.clone(),
        });
        Ok(())
    }

    async fn group(&self, group_id: Id) -> Result<Option<Group>> {
        let tables = self.tables.lock().await;
        Ok(tables.groups.iter().find(|g| g.id == group_id).cloned())
    }

    async fn group_by_invite(&self, code: &InviteCode) -> Result<Option<Group>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .groups
            .iter()
            .find(|g| &g.invite_code == code)
            .cloned())
    }

    async fn groups_for_member(&self, member_id: &str) -> Result<Vec<Group>> {
        let tables = self.tables.lock().await;
        let groups = tables
            .groups
            .iter()
            .filter(|g| {
                tables
                    .memberships
                    .iter()
                    .any(|m| m.group_id == g.id && m.member_id == member_id)
            })
            .cloned()
            .collect();
        Ok(groups)
    }

    async fn delete_group(&self, group_id: Id) -> Result<bool> {
        let mut tables = self.tables.lock().await;
        let before = tables.groups.len();
        tables.groups.retain(|g| g.id != group_id);
        if tables.groups.len() == before {
            return Ok(false);
        }
        tables.memberships.retain(|m| m.group_id != group_id);
        tables.candidates.retain(|c| c.group_id != group_id);
        tables.ballots.retain(|b| b.group_id != group_id);
        Ok(true)
    }

    async fn add_membership(&self, membership: &NewMembership) -> Result<()> {
        let mut tables = self.tables.lock().await;
        if tables
            .memberships
            .iter()
            .any(|m| m.group_id == membership.group_id && m.member_id == membership.member_id)
        {
            return Err(Error::conflict("You are already a member of this group"));
        }
        tables.memberships.push(Membership {
            id: Id::new(),
            membership: membership.clone(),
        });
        Ok(())
    }

    async fn membership(&self, group_id: Id, member_id: &str) -> Result<Option<Membership>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .memberships
            .iter()
            .find(|m| m.group_id == group_id && m.member_id == member_id)
            .cloned())
    }

    async fn memberships(&self, group_id: Id) -> Result<Vec<Membership>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .memberships
            .iter()
            .filter(|m| m.group_id == group_id)
            .cloned()
            .collect())
    }

    async fn set_role(&self, group_id: Id, member_id: &str, role: Role) -> Result<bool> {
        let mut tables = self.tables.lock().await;
        let membership = tables
            .memberships
            .iter_mut()
            .find(|m| m.group_id == group_id && m.member_id == member_id);
        Ok(match membership {
            Some(membership) => {
                membership.role = role;
                true
            }
            None => false,
        })
    }

    async fn remove_membership(&self, group_id: Id, member_id: &str) -> Result<bool> {
        let mut tables = self.tables.lock().await;
        Ok(tables.remove_membership(group_id, member_id))
    }

    async fn add_candidate(&self, candidate: &NewCandidate) -> Result<Candidate> {
        let mut tables = self.tables.lock().await;
        if tables
            .candidates
            .iter()
            .any(|c| c.group_id == candidate.group_id && c.property_id == candidate.property_id)
        {
            return Err(Error::conflict("Property is already in the list"));
        }
        let candidate = Candidate {
            id: Id::new(),
            candidate: candidate.clone(),
        };
        tables.candidates.push(candidate.clone());
        Ok(candidate)
    }

    async fn candidate(&self, group_id: Id, property_id: &str) -> Result<Option<Candidate>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .candidates
            .iter()
            .find(|c| c.group_id == group_id && c.property_id == property_id)
            .cloned())
    }

    async fn candidates(&self, group_id: Id) -> Result<Vec<Candidate>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .candidates
            .iter()
            .filter(|c| c.group_id == group_id)
            .cloned()
            .collect())
    }

    async fn remove_candidate(&self, group_id: Id, property_id: &str) -> Result<bool> {
        let mut tables = self.tables.lock().await;
        let before = tables.candidates.len();
        tables
            .candidates
            .retain(|c| !(c.group_id == group_id && c.property_id == property_id));
        if tables.candidates.len() == before {
            return Ok(false);
        }
        tables
            .ballots
            .retain(|b| !(b.group_id == group_id && b.property_id == property_id));
        Ok(true)
    }

    async fn record_ballot(&self, ballot: &NewBallot) -> Result<Tally> {
        self.injected_failure()?;
        let mut tables = self.tables.lock().await;
        self.evict_pending(&mut tables);
        if !tables
            .memberships
            .iter()
            .any(|m| m.group_id == ballot.group_id && m.member_id == ballot.member_id)
        {
            return Err(Error::forbidden(format!(
                "{} is not a member of group {}",
                ballot.member_id, ballot.group_id
            )));
        }
        if !tables
            .candidates
            .iter()
            .any(|c| c.group_id == ballot.group_id && c.property_id == ballot.property_id)
        {
            return Err(Error::not_found(format!(
                "Candidate {} in group {}",
                ballot.property_id, ballot.group_id
            )));
        }

        let existing = tables.ballots.iter().position(|b| {
            b.group_id == ballot.group_id
                && b.property_id == ballot.property_id
                && b.member_id == ballot.member_id
        });
        match existing {
            Some(index) => {
                let existing = &mut tables.ballots[index];
                existing.vote = ballot.vote;
                existing.updated_at = Utc::now();
            }
            None => tables.ballots.push(Ballot {
                id: Id::new(),
                ballot: ballot.clone(),
            }),
        }

        // Presence checked above, under the same lock.
        tables
            .recompute(ballot.group_id, &ballot.property_id)
            .ok_or_else(|| Error::not_found(format!("Candidate {}", ballot.property_id)))
    }

    async fn ballots(&self, group_id: Id, property_id: &str) -> Result<Vec<Ballot>> {
        let tables = self.tables.lock().await;
        let mut ballots: Vec<Ballot> = tables
            .ballots
            .iter()
            .filter(|b| b.group_id == group_id && b.property_id == property_id)
            .cloned()
            .collect();
        ballots.sort_by_key(|b| b.updated_at);
        Ok(ballots)
    }
}

#[cfg(test)]
mod tests {
    use crate::model::common::{member::Member, status::CandidateStatus, vote::Vote};
    use crate::model::db::group::NewGroup;

    use super::*;

    async fn group_with_candidate(store: &MemoryStore) -> (Group, String) {
        let creator = Member::example1();
        let group = Group {
            id: Id::new(),
            group: NewGroup::new(
                "Sommarstuga".to_string(),
                InviteCode::generate(rand::thread_rng()),
                creator.id.clone(),
            ),
        };
        let membership =
            NewMembership::new(group.id, creator.id.clone(), creator.display_name, Role::Admin);
        store.create_group(&group, &membership).await.unwrap();
        let property = "listing-4711".to_string();
        store
            .add_candidate(&NewCandidate::new(group.id, property.clone(), creator.id))
            .await
            .unwrap();
        (group, property)
    }

    #[rocket::async_test]
    async fn record_ballot_overwrites() {
        let store = MemoryStore::new();
        let (group, property) = group_with_candidate(&store).await;
        let member = Member::example1().id;

        let ballot = NewBallot::new(group.id, property.clone(), member.clone(), Vote::No);
        let tally = store.record_ballot(&ballot).await.unwrap();
        assert_eq!(tally, Tally { yes: 0, no: 1, maybe: 0 });

        let ballot = NewBallot::new(group.id, property.clone(), member, Vote::Yes);
        let tally = store.record_ballot(&ballot).await.unwrap();
        assert_eq!(tally, Tally { yes: 1, no: 0, maybe: 0 });

        assert_eq!(store.ballots(group.id, &property).await.unwrap().len(), 1);
        let candidate = store.candidate(group.id, &property).await.unwrap().unwrap();
        assert_eq!(candidate.status, CandidateStatus::Approved);
    }

    #[rocket::async_test]
    async fn record_ballot_requires_candidate() {
        let store = MemoryStore::new();
        let (group, _) = group_with_candidate(&store).await;
        let ballot = NewBallot::new(
            group.id,
            "missing".to_string(),
            Member::example1().id,
            Vote::Yes,
        );
        let err = store.record_ballot(&ballot).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert!(store.ballots(group.id, "missing").await.unwrap().is_empty());
    }

    #[rocket::async_test]
    async fn record_ballot_requires_membership() {
        let store = MemoryStore::new();
        let (group, property) = group_with_candidate(&store).await;

        let ballot = NewBallot::new(group.id, property.clone(), Member::outsider().id, Vote::No);
        let err = store.record_ballot(&ballot).await.unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
        assert!(store.ballots(group.id, &property).await.unwrap().is_empty());
        let candidate = store.candidate(group.id, &property).await.unwrap().unwrap();
        assert_eq!(candidate.status, CandidateStatus::Voting);
    }

    #[rocket::async_test]
    async fn duplicate_invite_codes_conflict() {
        let store = MemoryStore::new();
        let (group, _) = group_with_candidate(&store).await;
        let other = Group {
            id: Id::new(),
            group: NewGroup::new(
                "Annan".to_string(),
                group.invite_code.clone(),
                "x".to_string(),
            ),
        };
        let membership =
            NewMembership::new(other.id, "x".to_string(), "X".to_string(), Role::Admin);
        let err = store.create_group(&other, &membership).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        assert!(store.group(other.id).await.unwrap().is_none());
        assert!(store.memberships(other.id).await.unwrap().is_empty());
    }

    #[rocket::async_test]
    async fn removing_a_member_recomputes_status() {
        let store = MemoryStore::new();
        let (group, property) = group_with_candidate(&store).await;
        let second = Member::example2();
        store
            .add_membership(&NewMembership::new(
                group.id,
                second.id.clone(),
                second.display_name.clone(),
                Role::Member,
            ))
            .await
            .unwrap();

        store
            .record_ballot(&NewBallot::new(group.id, property.clone(), Member::example1().id, Vote::Yes))
            .await
            .unwrap();
        store
            .record_ballot(&NewBallot::new(group.id, property.clone(), second.id.clone(), Vote::No))
            .await
            .unwrap();
        let candidate = store.candidate(group.id, &property).await.unwrap().unwrap();
        assert_eq!(candidate.status, CandidateStatus::Voting);

        assert!(store.remove_membership(group.id, &second.id).await.unwrap());
        assert!(!store.remove_membership(group.id, &second.id).await.unwrap());
        let candidate = store.candidate(group.id, &property).await.unwrap().unwrap();
        assert_eq!(candidate.status, CandidateStatus::Approved);
        assert_eq!(store.ballots(group.id, &property).await.unwrap().len(), 1);
    }

    #[rocket::async_test]
    async fn deleting_a_group_cascades() {
        let store = MemoryStore::new();
        let (group, property) = group_with_candidate(&store).await;
        store
            .record_ballot(&NewBallot::new(group.id, property.clone(), Member::example1().id, Vote::Maybe))
            .await
            .unwrap();

        assert!(store.delete_group(group.id).await.unwrap());
        assert!(store.group(group.id).await.unwrap().is_none());
        assert!(store.memberships(group.id).await.unwrap().is_empty());
        assert!(store.candidates(group.id).await.unwrap().is_empty());
        assert!(store.ballots(group.id, &property).await.unwrap().is_empty());
        assert!(!store.delete_group(group.id).await.unwrap());
    }

    #[rocket::async_test]
    async fn injected_failures_run_out() {
        let store = MemoryStore::new();
        let (group, property) = group_with_candidate(&store).await;
        store.fail_next_ballots(1);
        let ballot = NewBallot::new(group.id, property.clone(), Member::example1().id, Vote::Yes);
        assert!(store.record_ballot(&ballot).await.unwrap_err().is_transient());
        assert!(store.ballots(group.id, &property).await.unwrap().is_empty());
        assert!(store.record_ballot(&ballot).await.is_ok());
    }
}

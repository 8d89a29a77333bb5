use mongodb::{
    bson::{doc, Document},
    error::Error as DbError,
    options::{FindOptions, UpdateOptions},
    Client, ClientSession, Database,
};
use log::warn;
use rocket::futures::TryStreamExt;

use crate::error::{Error, Result};
use crate::model::{
    common::{invite::InviteCode, role::Role, tally::Tally},
    db::{
        ballot::{Ballot, NewBallot},
        candidate::{Candidate, NewCandidate},
        group::Group,
        membership::{Membership, NewMembership},
    },
    mongodb::{is_duplicate_key_error, is_unknown_commit_result, Coll, Id, MongoCollection},
};

use super::Store;

/// A store backed by MongoDB.
///
/// Multi-document operations run inside transactions, which requires the
/// server to be part of a replica set.
pub struct MongoStore {
    client: Client,
    db: Database,
}

impl MongoStore {
    pub fn new(client: Client, db: Database) -> Self {
        Self { client, db }
    }

    fn coll<T: MongoCollection>(&self) -> Coll<T> {
        Coll::from_db(&self.db)
    }

    async fn transaction(&self) -> Result<ClientSession> {
        let mut session = self.client.start_session(None).await?;
        session.start_transaction(None).await?;
        Ok(session)
    }

    /// Recompute a candidate's status from its ballots within the given session.
    /// Returns `None` if the candidate does not exist.
    ///
    /// Writing the candidate document means two transactions recomputing the
    /// same candidate always conflict, so neither can commit a status derived
    /// from a ballot set that misses the other's write.
    async fn recompute(
        &self,
        group_id: Id,
        property_id: &str,
        session: &mut ClientSession,
    ) -> Result<Option<Tally>> {
        let filter = candidate_filter(group_id, property_id);
        let mut ballots = self
            .coll::<Ballot>()
            .find_with_session(filter.clone(), None, session)
            .await?;
        let mut tally = Tally::default();
        while let Some(ballot) = ballots.next(session).await {
            tally.add(ballot?.vote);
        }

        let update = doc! {
            "$set": {
                "status": tally.status(),
            }
        };
        let result = self
            .coll::<Candidate>()
            .update_one_with_session(filter, update, None, session)
            .await?;
        Ok((result.matched_count == 1).then_some(tally))
    }
}

/// How many times a commit with an unknown outcome is retried.
const COMMIT_ATTEMPTS: u32 = 3;

/// Commit the session's transaction.
///
/// A commit whose outcome is unknown is retried on its own; the operation
/// itself is never rerun, since its writes may already be durable.
async fn commit(session: &mut ClientSession) -> Result<()> {
    let mut attempt = 1;
    loop {
        match session.commit_transaction().await {
            Err(err) if is_unknown_commit_result(&err) && attempt < COMMIT_ATTEMPTS => {
                warn!("Commit outcome unknown on attempt {attempt}, retrying commit: {err}");
                attempt += 1;
            }
            result => return Ok(result?),
        }
    }
}

/// Turn a duplicate key error into a `Conflict` with the given message.
fn conflict_on_duplicate(err: DbError, message: &str) -> Error {
    if is_duplicate_key_error(&err) {
        Error::conflict(message)
    } else {
        err.into()
    }
}

/// Filter for a single candidate's records.
fn candidate_filter(group_id: Id, property_id: &str) -> Document {
    doc! {
        "group_id": group_id,
        "property_id": property_id,
    }
}

#[rocket::async_trait]
impl Store for MongoStore {
    async fn create_group(&self, group: &Group, creator: &NewMembership) -> Result<()> {
        let mut session = self.transaction().await?;
        self.coll::<Group>()
            .insert_one_with_session(group, None, &mut session)
            .await
            .map_err(|e| conflict_on_duplicate(e, "Invite code already in use"))?;
        self.coll::<NewMembership>()
            .insert_one_with_session(creator, None, &mut session)
            .await?;
        commit(&mut session).await?;
        Ok(())
    }

    async fn group(&self, group_id: Id) -> Result<Option<Group>> {
        Ok(self.coll::<Group>().find_one(group_id.as_doc(), None).await?)
    }

    async fn group_by_invite(&self, code: &InviteCode) -> Result<Option<Group>> {
        let filter = doc! {
            "invite_code": code,
        };
        Ok(self.coll::<Group>().find_one(filter, None).await?)
    }

    async fn groups_for_member(&self, member_id: &str) -> Result<Vec<Group>> {
        let filter = doc! {
            "member_id": member_id,
        };
        let group_ids: Vec<Id> = self
            .coll::<Membership>()
            .find(filter, None)
            .await?
            .map_ok(|membership| membership.group_id)
            .try_collect()
            .await?;

        let filter = doc! {
            "_id": { "$in": group_ids },
        };
        let options = FindOptions::builder()
            .sort(doc! { "created_at": 1 })
            .build();
        let groups = self
            .coll::<Group>()
            .find(filter, options)
            .await?
            .try_collect()
            .await?;
        Ok(groups)
    }

    async fn delete_group(&self, group_id: Id) -> Result<bool> {
        let mut session = self.transaction().await?;
        let result = self
            .coll::<Group>()
            .delete_one_with_session(group_id.as_doc(), None, &mut session)
            .await?;
        if result.deleted_count == 0 {
            session.abort_transaction().await?;
            return Ok(false);
        }

        let owned = doc! {
            "group_id": group_id,
        };
        self.coll::<Membership>()
            .delete_many_with_session(owned.clone(), None, &mut session)
            .await?;
        self.coll::<Candidate>()
            .delete_many_with_session(owned.clone(), None, &mut session)
            .await?;
        self.coll::<Ballot>()
            .delete_many_with_session(owned, None, &mut session)
            .await?;

        commit(&mut session).await?;
        Ok(true)
    }

    async fn add_membership(&self, membership: &NewMembership) -> Result<()> {
        self.coll::<NewMembership>()
            .insert_one(membership, None)
            .await
            .map_err(|e| conflict_on_duplicate(e, "You are already a member of this group"))?;
        Ok(())
    }

    async fn membership(&self, group_id: Id, member_id: &str) -> Result<Option<Membership>> {
        let filter = doc! {
            "group_id": group_id,
            "member_id": member_id,
        };
        Ok(self.coll::<Membership>().find_one(filter, None).await?)
    }

    async fn memberships(&self, group_id: Id) -> Result<Vec<Membership>> {
        let filter = doc! {
            "group_id": group_id,
        };
        let options = FindOptions::builder()
            .sort(doc! { "joined_at": 1 })
            .build();
        let memberships = self
            .coll::<Membership>()
            .find(filter, options)
            .await?
            .try_collect()
            .await?;
        Ok(memberships)
    }

    async fn set_role(&self, group_id: Id, member_id: &str, role: Role) -> Result<bool> {
        let filter = doc! {
            "group_id": group_id,
            "member_id": member_id,
        };
        let update = doc! {
            "$set": {
                "role": role,
            }
        };
        let result = self
            .coll::<Membership>()
            .update_one(filter, update, None)
            .await?;
        Ok(result.matched_count == 1)
    }

    async fn remove_membership(&self, group_id: Id, member_id: &str) -> Result<bool> {
        let mut session = self.transaction().await?;
        let membership_filter = doc! {
            "group_id": group_id,
            "member_id": member_id,
        };
        let result = self
            .coll::<Membership>()
            .delete_one_with_session(membership_filter.clone(), None, &mut session)
            .await?;
        if result.deleted_count == 0 {
            session.abort_transaction().await?;
            return Ok(false);
        }

        // Find everything the member voted on, drop their ballots, and recompute.
        let mut touched = Vec::new();
        let mut ballots = self
            .coll::<Ballot>()
            .find_with_session(membership_filter.clone(), None, &mut session)
            .await?;
        while let Some(ballot) = ballots.next(&mut session).await {
            touched.push(ballot?.ballot.property_id);
        }
        self.coll::<Ballot>()
            .delete_many_with_session(membership_filter, None, &mut session)
            .await?;
        for property_id in touched {
            self.recompute(group_id, &property_id, &mut session).await?;
        }

        commit(&mut session).await?;
        Ok(true)
    }

    async fn add_candidate(&self, candidate: &NewCandidate) -> Result<Candidate> {
        let candidate = Candidate {
            id: Id::new(),
            candidate: candidate.clone(),
        };
        self.coll::<Candidate>()
            .insert_one(&candidate, None)
            .await
            .map_err(|e| conflict_on_duplicate(e, "Property is already in the list"))?;
        Ok(candidate)
    }

    async fn candidate(&self, group_id: Id, property_id: &str) -> Result<Option<Candidate>> {
        let filter = candidate_filter(group_id, property_id);
        Ok(self.coll::<Candidate>().find_one(filter, None).await?)
    }

    async fn candidates(&self, group_id: Id) -> Result<Vec<Candidate>> {
        let filter = doc! {
            "group_id": group_id,
        };
        let options = FindOptions::builder()
            .sort(doc! { "created_at": 1 })
            .build();
        let candidates = self
            .coll::<Candidate>()
            .find(filter, options)
            .await?
            .try_collect()
            .await?;
        Ok(candidates)
    }

    async fn remove_candidate(&self, group_id: Id, property_id: &str) -> Result<bool> {
        let mut session = self.transaction().await?;
        let filter = candidate_filter(group_id, property_id);
        let result = self
            .coll::<Candidate>()
            .delete_one_with_session(filter.clone(), None, &mut session)
            .await?;
        if result.deleted_count == 0 {
            session.abort_transaction().await?;
            return Ok(false);
        }
        self.coll::<Ballot>()
            .delete_many_with_session(filter, None, &mut session)
            .await?;
        commit(&mut session).await?;
        Ok(true)
    }

    async fn record_ballot(&self, ballot: &NewBallot) -> Result<Tally> {
        let mut session = self.transaction().await?;

        // Writing the membership makes a concurrent removal of the caster
        // conflict with this transaction instead of slipping past it.
        let membership_filter = doc! {
            "group_id": ballot.group_id,
            "member_id": ballot.member_id.as_str(),
        };
        let touch = doc! {
            "$set": {
                "last_voted_at": ballot.updated_at,
            }
        };
        let result = self
            .coll::<Membership>()
            .update_one_with_session(membership_filter, touch, None, &mut session)
            .await?;
        if result.matched_count == 0 {
            session.abort_transaction().await?;
            return Err(Error::forbidden(format!(
                "{} is not a member of group {}",
                ballot.member_id, ballot.group_id
            )));
        }

        // Upsert: the filter fields are copied into the document if it is new.
        let filter = doc! {
            "group_id": ballot.group_id,
            "property_id": ballot.property_id.as_str(),
            "member_id": ballot.member_id.as_str(),
        };
        let update = doc! {
            "$set": {
                "vote": ballot.vote,
                "updated_at": ballot.updated_at,
            }
        };
        let upsert = UpdateOptions::builder().upsert(true).build();
        self.coll::<Ballot>()
            .update_one_with_session(filter, update, upsert, &mut session)
            .await
            .map_err(|e| {
                // A concurrent upsert of the same ballot won the insert; running
                // again will take the update path.
                if is_duplicate_key_error(&e) {
                    Error::TransientStore(e.to_string())
                } else {
                    e.into()
                }
            })?;

        let tally = match self
            .recompute(ballot.group_id, &ballot.property_id, &mut session)
            .await?
        {
            Some(tally) => tally,
            None => {
                session.abort_transaction().await?;
                return Err(Error::not_found(format!(
                    "Candidate {} in group {}",
                    ballot.property_id, ballot.group_id
                )));
            }
        };

        commit(&mut session).await?;
        Ok(tally)
    }

    async fn ballots(&self, group_id: Id, property_id: &str) -> Result<Vec<Ballot>> {
        let filter = candidate_filter(group_id, property_id);
        let options = FindOptions::builder()
            .sort(doc! { "updated_at": 1 })
            .build();
        let ballots = self
            .coll::<Ballot>()
            .find(filter, options)
            .await?
            .try_collect()
            .await?;
        Ok(ballots)
    }
}

#[cfg(test)]
mod tests {
    use crate::model::common::{member::Member, status::CandidateStatus, vote::Vote};
    use crate::model::db::group::NewGroup;
    use crate::model::mongodb::ensure_indexes_exist;

    use super::*;

    /// A store over a fresh, uniquely named database, or `None` if no test
    /// database is configured through `ROCKET_TEST_DB_URI`. Transactions need
    /// the server to be a replica set.
    async fn test_store() -> Option<(MongoStore, Database)> {
        let db_uri = match rocket::Config::figment().extract_inner::<String>("test_db_uri") {
            Ok(db_uri) => db_uri,
            Err(_) => {
                eprintln!("No `test_db_uri` configured, skipping MongoDB test");
                return None;
            }
        };
        let client = Client::with_uri_str(&db_uri).await.unwrap();
        let db = client.database(&format!("consensus_test_{}", Id::new()));
        ensure_indexes_exist(&db).await.unwrap();
        Some((MongoStore::new(client, db.clone()), db))
    }

    fn new_group(name: &str, invite_code: InviteCode, creator: &Member) -> (Group, NewMembership) {
        let group = Group {
            id: Id::new(),
            group: NewGroup::new(name.to_string(), invite_code, creator.id.clone()),
        };
        let membership = NewMembership::new(
            group.id,
            creator.id.clone(),
            creator.display_name.clone(),
            Role::Admin,
        );
        (group, membership)
    }

    /// A group of `Member::example1()` and `Member::example2()` with one candidate.
    async fn group_with_candidate(store: &MongoStore) -> (Group, String) {
        let (group, creator) = new_group(
            "Sommarstuga",
            InviteCode::generate(rand::thread_rng()),
            &Member::example1(),
        );
        store.create_group(&group, &creator).await.unwrap();
        let second = Member::example2();
        store
            .add_membership(&NewMembership::new(
                group.id,
                second.id,
                second.display_name,
                Role::Member,
            ))
            .await
            .unwrap();
        let property = "listing-4711".to_string();
        store
            .add_candidate(&NewCandidate::new(
                group.id,
                property.clone(),
                Member::example1().id,
            ))
            .await
            .unwrap();
        (group, property)
    }

    async fn status(store: &MongoStore, group: &Group, property: &str) -> CandidateStatus {
        store
            .candidate(group.id, property)
            .await
            .unwrap()
            .unwrap()
            .status
    }

    #[rocket::async_test]
    async fn record_ballot_upserts_and_recomputes() {
        let Some((store, db)) = test_store().await else {
            return;
        };
        let (group, property) = group_with_candidate(&store).await;
        let member = Member::example1().id;

        let ballot = NewBallot::new(group.id, property.clone(), member.clone(), Vote::No);
        let tally = store.record_ballot(&ballot).await.unwrap();
        assert_eq!(tally, Tally { yes: 0, no: 1, maybe: 0 });
        assert_eq!(status(&store, &group, &property).await, CandidateStatus::Rejected);

        let ballot = NewBallot::new(group.id, property.clone(), member, Vote::Yes);
        let tally = store.record_ballot(&ballot).await.unwrap();
        assert_eq!(tally, Tally { yes: 1, no: 0, maybe: 0 });
        assert_eq!(status(&store, &group, &property).await, CandidateStatus::Approved);
        let ballots = store.ballots(group.id, &property).await.unwrap();
        assert_eq!(ballots.len(), 1);
        assert_eq!(ballots[0].vote, Vote::Yes);

        let outsider = NewBallot::new(group.id, property.clone(), Member::outsider().id, Vote::No);
        let err = store.record_ballot(&outsider).await.unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));

        let missing = NewBallot::new(
            group.id,
            "listing-0".to_string(),
            Member::example2().id,
            Vote::No,
        );
        let err = store.record_ballot(&missing).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert!(store.ballots(group.id, "listing-0").await.unwrap().is_empty());
        assert_eq!(store.ballots(group.id, &property).await.unwrap().len(), 1);

        db.drop(None).await.unwrap();
    }

    #[rocket::async_test]
    async fn removing_a_member_cascades() {
        let Some((store, db)) = test_store().await else {
            return;
        };
        let (group, property) = group_with_candidate(&store).await;
        let second = Member::example2().id;
        for (member, vote) in [(Member::example1().id, Vote::Yes), (second.clone(), Vote::No)] {
            let ballot = NewBallot::new(group.id, property.clone(), member, vote);
            store.record_ballot(&ballot).await.unwrap();
        }
        assert_eq!(status(&store, &group, &property).await, CandidateStatus::Voting);

        assert!(store.remove_membership(group.id, &second).await.unwrap());
        assert!(!store.remove_membership(group.id, &second).await.unwrap());
        assert!(store.membership(group.id, &second).await.unwrap().is_none());
        assert_eq!(store.ballots(group.id, &property).await.unwrap().len(), 1);
        assert_eq!(status(&store, &group, &property).await, CandidateStatus::Approved);

        db.drop(None).await.unwrap();
    }

    #[rocket::async_test]
    async fn deleting_a_group_cascades() {
        let Some((store, db)) = test_store().await else {
            return;
        };
        let (group, property) = group_with_candidate(&store).await;
        let ballot = NewBallot::new(group.id, property.clone(), Member::example1().id, Vote::Maybe);
        store.record_ballot(&ballot).await.unwrap();

        assert!(store.delete_group(group.id).await.unwrap());
        assert!(store.group(group.id).await.unwrap().is_none());
        assert!(store.memberships(group.id).await.unwrap().is_empty());
        assert!(store.candidates(group.id).await.unwrap().is_empty());
        assert!(store.ballots(group.id, &property).await.unwrap().is_empty());
        assert!(!store.delete_group(group.id).await.unwrap());

        db.drop(None).await.unwrap();
    }

    #[rocket::async_test]
    async fn duplicates_conflict() {
        let Some((store, db)) = test_store().await else {
            return;
        };
        let (group, property) = group_with_candidate(&store).await;

        // Invite codes are unique, and nothing of the losing group is kept.
        let (other, creator) = new_group("Annan", group.invite_code.clone(), &Member::outsider());
        let err = store.create_group(&other, &creator).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        assert!(store.group(other.id).await.unwrap().is_none());
        assert!(store.memberships(other.id).await.unwrap().is_empty());

        let second = Member::example2();
        let err = store
            .add_membership(&NewMembership::new(
                group.id,
                second.id,
                second.display_name,
                Role::Member,
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        assert_eq!(store.memberships(group.id).await.unwrap().len(), 2);

        let err = store
            .add_candidate(&NewCandidate::new(
                group.id,
                property,
                Member::example2().id,
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        assert_eq!(store.candidates(group.id).await.unwrap().len(), 1);

        db.drop(None).await.unwrap();
    }
}

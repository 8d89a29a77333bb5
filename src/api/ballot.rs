use rocket::{serde::json::Json, Route, State};

use crate::error::Result;
use crate::model::{
    api::{
        auth::AuthToken,
        ballot::{BallotSpec, BallotsDescription, ConsensusDescription},
    },
    common::member::Member,
    mongodb::Id,
};
use crate::tracker::ConsensusTracker;

pub fn routes() -> Vec<Route> {
    routes![cast_ballot, get_ballots]
}

/// Cast or change the caller's vote, returning the new consensus.
#[put(
    "/groups/<group_id>/candidates/<property_id>/ballot",
    data = "<ballot>",
    format = "json"
)]
async fn cast_ballot(
    token: AuthToken,
    group_id: Id,
    property_id: &str,
    ballot: Json<BallotSpec>,
    tracker: &State<ConsensusTracker>,
) -> Result<Json<ConsensusDescription>> {
    let member = Member::from(token);
    let consensus = tracker
        .cast_ballot(&member, group_id, property_id, ballot.vote)
        .await?;
    Ok(Json(consensus.into()))
}

#[get("/groups/<group_id>/candidates/<property_id>/ballots")]
async fn get_ballots(
    token: AuthToken,
    group_id: Id,
    property_id: &str,
    tracker: &State<ConsensusTracker>,
) -> Result<Json<BallotsDescription>> {
    let member = Member::from(token);
    let ballots = tracker.ballots(&member, group_id, property_id).await?;
    Ok(Json(ballots.into()))
}

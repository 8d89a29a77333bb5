use rocket::{serde::json::Json, Route, State};

use crate::error::Result;
use crate::model::{
    api::{
        auth::AuthToken,
        candidate::{CandidateDescription, CandidateSpec},
    },
    common::{member::Member, status::CandidateView},
    mongodb::Id,
};
use crate::tracker::ConsensusTracker;

pub fn routes() -> Vec<Route> {
    routes![add_candidate, get_candidates, get_candidate, remove_candidate]
}

#[post("/groups/<group_id>/candidates", data = "<spec>", format = "json")]
async fn add_candidate(
    token: AuthToken,
    group_id: Id,
    spec: Json<CandidateSpec>,
    tracker: &State<ConsensusTracker>,
) -> Result<Json<CandidateDescription>> {
    let member = Member::from(token);
    let candidate = tracker
        .add_candidate(&member, group_id, &spec.property_id)
        .await?;
    Ok(Json(candidate.into()))
}

/// List candidates, by default every one that has not been rejected.
#[get("/groups/<group_id>/candidates?<view>")]
async fn get_candidates(
    token: AuthToken,
    group_id: Id,
    view: Option<CandidateView>,
    tracker: &State<ConsensusTracker>,
) -> Result<Json<Vec<CandidateDescription>>> {
    let member = Member::from(token);
    let candidates = tracker
        .candidates(&member, group_id, view.unwrap_or_default())
        .await?;
    Ok(Json(candidates.into_iter().map(Into::into).collect()))
}

#[get("/groups/<group_id>/candidates/<property_id>")]
async fn get_candidate(
    token: AuthToken,
    group_id: Id,
    property_id: &str,
    tracker: &State<ConsensusTracker>,
) -> Result<Json<CandidateDescription>> {
    let member = Member::from(token);
    let details = tracker.candidate(&member, group_id, property_id).await?;
    Ok(Json(details.into()))
}

#[delete("/groups/<group_id>/candidates/<property_id>")]
async fn remove_candidate(
    token: AuthToken,
    group_id: Id,
    property_id: &str,
    tracker: &State<ConsensusTracker>,
) -> Result<()> {
    tracker
        .remove_candidate(&Member::from(token), group_id, property_id)
        .await
}

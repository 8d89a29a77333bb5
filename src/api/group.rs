use rocket::{serde::json::Json, Route, State};

use crate::error::Result;
use crate::model::{
    api::{
        auth::AuthToken,
        group::{GroupDescription, GroupSpec, GroupSummary, JoinRequest},
    },
    common::member::Member,
    mongodb::Id,
};
use crate::tracker::ConsensusTracker;

pub fn routes() -> Vec<Route> {
    routes![
        create_group,
        get_groups,
        join_group,
        get_group,
        delete_group,
        leave_group,
        remove_member,
        promote_member,
    ]
}

#[post("/groups", data = "<spec>", format = "json")]
async fn create_group(
    token: AuthToken,
    spec: Json<GroupSpec>,
    tracker: &State<ConsensusTracker>,
) -> Result<Json<GroupSummary>> {
    let member = Member::from(token);
    let group = tracker.create_group(&member, &spec.name).await?;
    Ok(Json(group.into()))
}

#[get("/groups")]
async fn get_groups(
    token: AuthToken,
    tracker: &State<ConsensusTracker>,
) -> Result<Json<Vec<GroupSummary>>> {
    let member = Member::from(token);
    let groups = tracker.groups(&member).await?;
    Ok(Json(groups.into_iter().map(Into::into).collect()))
}

#[post("/groups/join", data = "<request>", format = "json")]
async fn join_group(
    token: AuthToken,
    request: Json<JoinRequest>,
    tracker: &State<ConsensusTracker>,
) -> Result<Json<GroupSummary>> {
    let member = Member::from(token);
    let group = tracker.join_group(&member, &request.invite_code).await?;
    Ok(Json(group.into()))
}

#[get("/groups/<group_id>")]
async fn get_group(
    token: AuthToken,
    group_id: Id,
    tracker: &State<ConsensusTracker>,
) -> Result<Json<GroupDescription>> {
    let member = Member::from(token);
    let details = tracker.group(&member, group_id).await?;
    Ok(Json(details.into()))
}

#[delete("/groups/<group_id>")]
async fn delete_group(
    token: AuthToken,
    group_id: Id,
    tracker: &State<ConsensusTracker>,
) -> Result<()> {
    tracker.delete_group(&Member::from(token), group_id).await
}

#[post("/groups/<group_id>/leave")]
async fn leave_group(
    token: AuthToken,
    group_id: Id,
    tracker: &State<ConsensusTracker>,
) -> Result<()> {
    tracker.leave_group(&Member::from(token), group_id).await
}

#[delete("/groups/<group_id>/members/<member_id>")]
async fn remove_member(
    token: AuthToken,
    group_id: Id,
    member_id: &str,
    tracker: &State<ConsensusTracker>,
) -> Result<()> {
    tracker
        .remove_member(&Member::from(token), group_id, member_id)
        .await
}

#[put("/groups/<group_id>/members/<member_id>/admin")]
async fn promote_member(
    token: AuthToken,
    group_id: Id,
    member_id: &str,
    tracker: &State<ConsensusTracker>,
) -> Result<()> {
    tracker
        .promote_member(&Member::from(token), group_id, member_id)
        .await
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use rocket::{
        http::{ContentType, Cookie, Status},
        local::asynchronous::Client,
        serde::json::serde_json::json,
    };

    use crate::auth_header;
    use crate::config::Config;
    use crate::error::ErrorBody;
    use crate::model::{api::auth::AUTH_TOKEN_COOKIE, common::role::Role};
    use crate::store::{MemoryStore, Store};

    use super::*;

    /// Create a group as `member` through the API.
    pub(crate) async fn create(client: &Client, member: &Member) -> GroupSummary {
        let response = client
            .post(uri!(create_group))
            .header(ContentType::JSON)
            .header(auth_header(client, member))
            .body(json!(GroupSpec::example()).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        response.into_json().await.unwrap()
    }

    /// Join a group as `member` through the API.
    pub(crate) async fn join(client: &Client, member: &Member, group: &GroupSummary) -> Status {
        let request = JoinRequest {
            invite_code: group.invite_code.to_string(),
        };
        client
            .post(uri!(join_group))
            .header(ContentType::JSON)
            .header(auth_header(client, member))
            .body(json!(request).to_string())
            .dispatch()
            .await
            .status()
    }

    async fn describe(client: &Client, member: &Member, group: &GroupSummary) -> GroupDescription {
        let response = client
            .get(uri!(get_group(*group.id)))
            .header(auth_header(client, member))
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        response.into_json().await.unwrap()
    }

    async fn leave(client: &Client, member: &Member, group: &GroupSummary) -> Status {
        client
            .post(uri!(leave_group(*group.id)))
            .header(auth_header(client, member))
            .dispatch()
            .await
            .status()
    }

    #[backend_test]
    async fn create_and_join(client: Client, store: Arc<MemoryStore>) {
        let creator = Member::example1();
        let group = create(&client, &creator).await;
        assert_eq!(group.name, GroupSpec::example().name);
        assert_eq!(group.created_by, creator.id);
        assert!(store.group(*group.id).await.unwrap().is_some());

        assert_eq!(Status::Ok, join(&client, &Member::example2(), &group).await);
        assert_eq!(Status::Conflict, join(&client, &Member::example2(), &group).await);

        let description = describe(&client, &Member::example2(), &group).await;
        assert_eq!(description.group, group);
        let roles: Vec<_> = description
            .members
            .iter()
            .map(|m| (m.display_name.as_str(), m.role))
            .collect();
        assert_eq!(roles, vec![("Astrid", Role::Admin), ("Björn", Role::Member)]);

        // Both see the group in their list.
        for member in [Member::example1(), Member::example2()] {
            let response = client
                .get(uri!(get_groups))
                .header(auth_header(&client, &member))
                .dispatch()
                .await;
            assert_eq!(Status::Ok, response.status());
            let groups: Vec<GroupSummary> = response.into_json().await.unwrap();
            assert_eq!(groups, vec![group.clone()]);
        }
    }

    #[backend_test]
    async fn requests_need_identity(client: Client) {
        let response = client.get(uri!(get_groups)).dispatch().await;
        assert_eq!(Status::Unauthorized, response.status());
        let body: ErrorBody = response.into_json().await.unwrap();
        assert_eq!(body.status, 401);

        let response = client
            .get(uri!(get_groups))
            .header(rocket::http::Header::new("Authorization", "Bearer not-a-token"))
            .dispatch()
            .await;
        assert_eq!(Status::Unauthorized, response.status());
    }

    #[backend_test]
    async fn stale_cookie_falls_back_to_header(client: Client) {
        let member = Member::example1();
        create(&client, &member).await;
        let stale = Cookie::new(AUTH_TOKEN_COOKIE, "expired-session");

        let response = client
            .get(uri!(get_groups))
            .cookie(stale.clone())
            .header(auth_header(&client, &member))
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let groups: Vec<GroupSummary> = response.into_json().await.unwrap();
        assert_eq!(groups.len(), 1);

        let response = client.get(uri!(get_groups)).cookie(stale).dispatch().await;
        assert_eq!(Status::Unauthorized, response.status());

        // A valid cookie on its own is enough.
        let config = client.rocket().state::<Config>().unwrap();
        let token = AuthToken::new(&member).encode(config).unwrap();
        let response = client
            .get(uri!(get_groups))
            .cookie(Cookie::new(AUTH_TOKEN_COOKIE, token))
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
    }

    #[backend_test]
    async fn outsiders_get_generic_denial(client: Client) {
        let group = create(&client, &Member::example1()).await;
        let response = client
            .get(uri!(get_group(*group.id)))
            .header(auth_header(&client, &Member::outsider()))
            .dispatch()
            .await;
        assert_eq!(Status::Forbidden, response.status());
        let body: ErrorBody = response.into_json().await.unwrap();
        assert_eq!(body.message, "You do not have access to this resource.");

        let response = client
            .get(uri!(get_group(Id::new())))
            .header(auth_header(&client, &Member::outsider()))
            .dispatch()
            .await;
        assert_eq!(Status::NotFound, response.status());
    }

    #[backend_test]
    async fn empty_names_are_rejected(client: Client) {
        let response = client
            .post(uri!(create_group))
            .header(ContentType::JSON)
            .header(auth_header(&client, &Member::example1()))
            .body(json!(GroupSpec { name: " ".to_string() }).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::BadRequest, response.status());
    }

    #[backend_test]
    async fn admin_hands_over_and_leaves(client: Client, store: Arc<MemoryStore>) {
        let admin = Member::example1();
        let other = Member::example2();
        let group = create(&client, &admin).await;
        join(&client, &other, &group).await;

        assert_eq!(Status::Conflict, leave(&client, &admin, &group).await);

        let response = client
            .put(uri!(promote_member(*group.id, other.id.as_str())))
            .header(auth_header(&client, &admin))
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());

        assert_eq!(Status::Ok, leave(&client, &admin, &group).await);
        assert!(store.membership(*group.id, &admin.id).await.unwrap().is_none());

        // The last member leaving takes the group with them.
        assert_eq!(Status::Ok, leave(&client, &other, &group).await);
        assert!(store.group(*group.id).await.unwrap().is_none());
    }

    #[backend_test]
    async fn admin_removes_member_and_deletes_group(client: Client, store: Arc<MemoryStore>) {
        let admin = Member::example1();
        let other = Member::example2();
        let group = create(&client, &admin).await;
        join(&client, &other, &group).await;

        // Ordinary members cannot remove anyone.
        let response = client
            .delete(uri!(remove_member(*group.id, admin.id.as_str())))
            .header(auth_header(&client, &other))
            .dispatch()
            .await;
        assert_eq!(Status::Forbidden, response.status());

        let response = client
            .delete(uri!(remove_member(*group.id, other.id.as_str())))
            .header(auth_header(&client, &admin))
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        assert_eq!(store.memberships(*group.id).await.unwrap().len(), 1);

        let response = client
            .delete(uri!(delete_group(*group.id)))
            .header(auth_header(&client, &admin))
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        assert!(store.group(*group.id).await.unwrap().is_none());
    }
}

use rocket::{http::Status, response::status::Custom, serde::json::Json, Catcher, Request, Route};

use crate::error::ErrorBody;

mod ballot;
mod candidate;
mod group;

pub fn routes() -> Vec<Route> {
    let mut routes = Vec::new();
    routes.extend(group::routes());
    routes.extend(candidate::routes());
    routes.extend(ballot::routes());
    routes
}

pub fn catchers() -> Vec<Catcher> {
    catchers![default_catcher]
}

/// Render failures that never reached a handler (bad tokens, unknown routes,
/// malformed bodies) in the same shape as handler errors.
#[catch(default)]
fn default_catcher(status: Status, _req: &Request<'_>) -> Custom<Json<ErrorBody>> {
    let message = match status.code {
        401 | 403 | 404 => "You do not have access to this resource.",
        400 | 422 => "The request was malformed.",
        code if code >= 500 => "Something went wrong.",
        _ => status.reason_lossy(),
    };
    let body = ErrorBody {
        status: status.code,
        message: message.to_string(),
    };
    Custom(status, Json(body))
}

#[macro_use]
extern crate rocket;

#[cfg(test)]
#[macro_use]
extern crate backend_test;

use rocket::{Build, Rocket};

use crate::config::{ConfigFairing, StoreFairing};
use crate::logging::LoggerFairing;

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod store;
pub mod tracker;

/// Assemble the server from the ambient configuration.
pub fn build() -> Rocket<Build> {
    rocket::build()
        .mount("/", api::routes())
        .register("/", api::catchers())
        .attach(LoggerFairing)
        .attach(ConfigFairing)
        .attach(StoreFairing::configured())
}

/// A client for a fresh server over an empty in-memory store.
#[cfg(test)]
pub(crate) async fn test_client() -> (
    rocket::local::asynchronous::Client,
    std::sync::Arc<store::MemoryStore>,
) {
    let store = std::sync::Arc::new(store::MemoryStore::new());
    let figment = rocket::Config::figment()
        .merge(("jwt_secret", "test secret"))
        .merge(("store_retry_backoff_ms", 1));
    let rocket = rocket::custom(figment)
        .mount("/", api::routes())
        .register("/", api::catchers())
        .attach(ConfigFairing)
        .attach(StoreFairing::with_store(store.clone()));
    let client = rocket::local::asynchronous::Client::tracked(rocket)
        .await
        .unwrap();
    (client, store)
}

/// An `Authorization` header carrying a valid token for the given member.
#[cfg(test)]
pub(crate) fn auth_header(
    client: &rocket::local::asynchronous::Client,
    member: &model::common::member::Member,
) -> rocket::http::Header<'static> {
    let config = client.rocket().state::<config::Config>().unwrap();
    let token = model::api::auth::AuthToken::new(member)
        .encode(config)
        .unwrap();
    rocket::http::Header::new("Authorization", format!("Bearer {token}"))
}

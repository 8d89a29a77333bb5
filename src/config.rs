use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use mongodb::Client as MongoClient;
use rocket::{
    fairing::{Fairing, Info, Kind},
    Build, Rocket,
};
use serde::Deserialize;

use crate::model::mongodb::ensure_indexes_exist;
use crate::store::{MemoryStore, MongoStore, Store};
use crate::tracker::{ConsensusTracker, RetryPolicy, DEFAULT_INVITE_CODE_ATTEMPTS};

/// Application configuration, derived from `Rocket.toml` and `ROCKET_*`
/// environment variables. This struct becomes managed state and can be
/// inspected by any endpoint.
#[derive(Deserialize)]
pub struct Config {
    // non-secrets
    #[serde(default = "default_invite_code_attempts")]
    invite_code_attempts: u32,
    #[serde(default = "default_store_retry_attempts")]
    store_retry_attempts: u32,
    #[serde(default = "default_store_retry_backoff_ms")]
    store_retry_backoff_ms: u64,
    // secrets
    jwt_secret: String,
}

fn default_invite_code_attempts() -> u32 {
    DEFAULT_INVITE_CODE_ATTEMPTS
}

fn default_store_retry_attempts() -> u32 {
    3
}

fn default_store_retry_backoff_ms() -> u64 {
    50
}

impl Config {
    /// Shared secret used to verify identity tokens.
    pub fn jwt_secret(&self) -> &[u8] {
        self.jwt_secret.as_bytes()
    }

    /// How many invite codes to try when creating a group before giving up.
    pub fn invite_code_attempts(&self) -> u32 {
        self.invite_code_attempts
    }

    /// How operations aborted by the store are retried.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.store_retry_attempts,
            Duration::from_millis(self.store_retry_backoff_ms),
        )
    }
}

/// A fairing that loads the application config and puts it in managed state.
/// This could easily be achieved using `AdHoc::config`, but is written out
/// explicitly for symmetry with the other fairings and control over error
/// messages.
pub struct ConfigFairing;

#[rocket::async_trait]
impl Fairing for ConfigFairing {
    fn info(&self) -> Info {
        Info {
            name: "Config",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<Config>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load application config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };

        // Manage the state.
        rocket = rocket.manage(config);
        Ok(rocket)
    }
}

/// Configuration for the persistent store.
#[derive(Deserialize)]
struct StoreConfig {
    // secrets
    db_uri: Option<String>,
    // non-secrets
    #[serde(default = "default_db_name")]
    db_name: String,
}

fn default_db_name() -> String {
    "consensus".to_string()
}

/// A fairing that sets up the store and places a [`ConsensusTracker`] over it
/// into managed state.
///
/// With a `db_uri` configured it connects to MongoDB and ensures the required
/// indexes exist; without one everything lives in memory and is lost on
/// shutdown. Must be attached after [`ConfigFairing`].
pub struct StoreFairing {
    preset: Option<Arc<dyn Store>>,
}

impl StoreFairing {
    /// Use whichever store the configuration asks for.
    pub fn configured() -> Self {
        Self { preset: None }
    }

    /// Use the given store, ignoring any database configuration.
    pub fn with_store(store: Arc<dyn Store>) -> Self {
        Self {
            preset: Some(store),
        }
    }
}

#[rocket::async_trait]
impl Fairing for StoreFairing {
    fn info(&self) -> Info {
        Info {
            name: "Store",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        let store = match &self.preset {
            Some(store) => store.clone(),
            None => match connect(&rocket).await {
                Some(store) => store,
                None => return Err(rocket),
            },
        };

        let tracker = match rocket.state::<Config>() {
            Some(config) => {
                ConsensusTracker::new(store, config.retry_policy(), config.invite_code_attempts())
            }
            None => {
                error!("Application config must be loaded before the store");
                return Err(rocket);
            }
        };

        // Manage the state.
        Ok(rocket.manage(tracker))
    }
}

/// Build the store described by the configuration, logging any failure.
async fn connect(rocket: &Rocket<Build>) -> Option<Arc<dyn Store>> {
    // Load the config.
    let config = match rocket.figment().extract::<StoreConfig>() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load store config");
            rocket::config::pretty_print_error(e);
            return None;
        }
    };

    let db_uri = match config.db_uri {
        Some(db_uri) => db_uri,
        None => {
            warn!("No `db_uri` configured, keeping all data in memory");
            return Some(Arc::new(MemoryStore::new()));
        }
    };

    info!("Loaded database config, connecting...");
    // Construct the connection.
    let client = match MongoClient::with_uri_str(db_uri).await {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to connect to database: {e}");
            return None;
        }
    };
    let db = client.database(&config.db_name);

    // Ensure the required indexes exist.
    if let Err(e) = ensure_indexes_exist(&db).await {
        error!("Failed to connect to database: {e}");
        return None;
    }
    info!("...database connection online!");

    Some(Arc::new(MongoStore::new(client, db)))
}

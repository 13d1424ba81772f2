//! Application layer of the identity service.
//!
//! Applications depend only on the ports in [`ports`]; [`store::PgStore`] and
//! [`distributor::PgTaskDistributor`] are the PostgreSQL implementations, and
//! [`Services`] wires everything together for a process.

pub mod config;
pub mod deadline;
pub mod distributor;
pub mod outbox;
pub mod ports;
pub mod session;
pub mod store;
pub mod user;
pub mod verify_email;

use std::sync::Arc;

use tessera_core::error::CoreError;
use tessera_core::password::{Argon2Hasher, CredentialHasher};
use tessera_core::token::TokenService;
use tessera_db::DbPool;

use crate::config::ServiceConfig;
use crate::distributor::PgTaskDistributor;
use crate::outbox::OutboxRelay;
use crate::session::SessionApplication;
use crate::store::PgStore;
use crate::user::{UserApplication, UserApplicationSettings};
use crate::verify_email::VerifyEmailApplication;

/// Every application of the service, built over one pool.
pub struct Services {
    pub users: UserApplication,
    pub sessions: SessionApplication,
    pub verify_email: VerifyEmailApplication,
    pub outbox_relay: OutboxRelay,
    /// Shared with the gateway for request authorization.
    pub tokens: Arc<TokenService>,
}

impl Services {
    /// Wire the PostgreSQL-backed applications.
    ///
    /// Fails only when the token key is too short.
    pub fn new(pool: DbPool, config: &ServiceConfig) -> Result<Self, CoreError> {
        let tokens = Arc::new(TokenService::new(&config.token_symmetric_key)?);
        let hasher: Arc<dyn CredentialHasher> = Arc::new(Argon2Hasher::default());
        Ok(Self::with_hasher(pool, config, tokens, hasher))
    }

    /// Like [`Services::new`] with an explicit hasher and token service.
    pub fn with_hasher(
        pool: DbPool,
        config: &ServiceConfig,
        tokens: Arc<TokenService>,
        hasher: Arc<dyn CredentialHasher>,
    ) -> Self {
        let store = Arc::new(PgStore::new(pool.clone()));
        let distributor = Arc::new(PgTaskDistributor::new(pool.clone()));

        let users = UserApplication::new(
            store.clone(),
            store.clone(),
            store.clone(),
            distributor.clone(),
            hasher,
            tokens.clone(),
            UserApplicationSettings::from(config),
        );
        let sessions = SessionApplication::new(
            store.clone(),
            tokens.clone(),
            tokens.clone(),
            config.access_token_duration,
            config.operation_timeout,
        );
        let verify_email = VerifyEmailApplication::new(store, config.operation_timeout);
        let outbox_relay = OutboxRelay::new(
            pool,
            distributor,
            config.outbox_batch_size,
            config.outbox_poll_interval,
        );

        Self {
            users,
            sessions,
            verify_email,
            outbox_relay,
            tokens,
        }
    }
}

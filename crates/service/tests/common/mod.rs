//! In-memory port fakes shared by the application tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use argon2::Params;
use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use tessera_core::error::CoreError;
use tessera_core::password::Argon2Hasher;
use tessera_core::token::TokenService;
use tessera_core::types::DbId;
use tessera_db::models::outbox::{NewOutboxEvent, OutboxEvent};
use tessera_db::models::session::{CreateSession, Session};
use tessera_db::models::task::NewTask;
use tessera_db::models::user::{CreateUser, User, UserPatch};
use tessera_service::ports::{
    EnqueueOutcome, OutboxStore, SessionStore, TaskDistributor, UserStore,
};
use tessera_service::session::SessionApplication;
use tessera_service::user::{UserApplication, UserApplicationSettings};
use uuid::Uuid;

pub const TOKEN_KEY: &str = "0123456789abcdef0123456789abcdef";

pub fn cheap_hasher() -> Arc<Argon2Hasher> {
    Arc::new(Argon2Hasher::with_params(
        Params::new(8, 1, 1, None).expect("valid argon2 params"),
    ))
}

pub fn token_service() -> Arc<TokenService> {
    Arc::new(TokenService::new(TOKEN_KEY).expect("valid key"))
}

pub fn settings() -> UserApplicationSettings {
    UserApplicationSettings {
        access_token_duration: TimeDelta::minutes(15),
        refresh_token_duration: TimeDelta::hours(24),
        operation_timeout: Duration::from_secs(5),
        conceal_unknown_users: false,
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

#[derive(Default)]
struct State {
    users: HashMap<String, User>,
    sessions: HashMap<Uuid, Session>,
    outbox: Vec<OutboxEvent>,
}

/// Users, sessions and outbox rows kept in memory, with the same uniqueness
/// rules as the schema.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    /// When set, `create_user` fails as if the outbox insert had failed.
    pub fail_outbox: AtomicBool,
}

impl MemoryStore {
    pub fn user(&self, username: &str) -> Option<User> {
        self.state.lock().unwrap().users.get(username).cloned()
    }

    pub fn session_count(&self) -> usize {
        self.state.lock().unwrap().sessions.len()
    }

    pub fn session(&self, id: Uuid) -> Option<Session> {
        self.state.lock().unwrap().sessions.get(&id).cloned()
    }

    pub fn outbox(&self) -> Vec<OutboxEvent> {
        self.state.lock().unwrap().outbox.clone()
    }

    pub fn set_session_expiry(&self, id: Uuid, expires_at: chrono::DateTime<Utc>) {
        if let Some(s) = self.state.lock().unwrap().sessions.get_mut(&id) {
            s.expires_at = expires_at;
        }
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_user(
        &self,
        input: CreateUser,
        events: Vec<NewOutboxEvent>,
    ) -> Result<(User, Vec<OutboxEvent>), CoreError> {
        let mut state = self.state.lock().unwrap();
        if state.users.contains_key(&input.username) {
            return Err(CoreError::UsernameAlreadyExists);
        }
        if state.users.values().any(|u| u.email == input.email) {
            return Err(CoreError::EmailAlreadyExists);
        }
        if self.fail_outbox.load(Ordering::SeqCst) {
            return Err(CoreError::Internal("outbox insert failed".into()));
        }

        let now = Utc::now();
        let user = User {
            username: input.username.clone(),
            role: input.role.unwrap_or_else(|| "user".into()),
            hashed_password: input.hashed_password,
            full_name: input.full_name,
            email: input.email,
            is_email_verified: false,
            password_changed_at: chrono::DateTime::<Utc>::MIN_UTC,
            created_at: now,
        };
        state.users.insert(user.username.clone(), user.clone());

        let mut recorded = Vec::new();
        for event in events {
            let row = OutboxEvent {
                id: state.outbox.len() as DbId + 1,
                event_type: event.event_type,
                payload: event.payload,
                attempts: 0,
                last_error: None,
                created_at: now,
                dispatched_at: None,
            };
            state.outbox.push(row.clone());
            recorded.push(row);
        }
        Ok((user, recorded))
    }

    async fn get_user(&self, username: &str) -> Result<Option<User>, CoreError> {
        Ok(self.user(username))
    }

    async fn update_user(
        &self,
        username: &str,
        patch: UserPatch,
    ) -> Result<Option<User>, CoreError> {
        let mut state = self.state.lock().unwrap();
        if let Some(email) = &patch.email {
            if state
                .users
                .values()
                .any(|u| &u.email == email && u.username != username)
            {
                return Err(CoreError::EmailAlreadyExists);
            }
        }
        let Some(user) = state.users.get_mut(username) else {
            return Ok(None);
        };
        if let Some(v) = patch.full_name {
            user.full_name = v;
        }
        if let Some(v) = patch.email {
            user.email = v;
        }
        if let Some(v) = patch.hashed_password {
            user.hashed_password = v;
        }
        if let Some(v) = patch.password_changed_at {
            user.password_changed_at = v;
        }
        Ok(Some(user.clone()))
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create_session(&self, input: CreateSession) -> Result<Session, CoreError> {
        let mut state = self.state.lock().unwrap();
        if !state.users.contains_key(&input.username) {
            return Err(CoreError::user_not_found(&input.username));
        }
        let session = Session {
            id: input.id,
            username: input.username,
            refresh_token: input.refresh_token,
            user_agent: input.user_agent,
            client_ip: input.client_ip,
            is_blocked: false,
            expires_at: input.expires_at,
            created_at: Utc::now(),
        };
        state.sessions.insert(session.id, session.clone());
        Ok(session)
    }

    async fn get_session(&self, id: Uuid) -> Result<Option<Session>, CoreError> {
        Ok(self.session(id))
    }

    async fn block_session(&self, id: Uuid) -> Result<Option<bool>, CoreError> {
        let mut state = self.state.lock().unwrap();
        Ok(state.sessions.get_mut(&id).map(|s| {
            let changed = !s.is_blocked;
            s.is_blocked = true;
            changed
        }))
    }
}

#[async_trait]
impl OutboxStore for MemoryStore {
    async fn mark_dispatched(&self, id: DbId) -> Result<bool, CoreError> {
        let mut state = self.state.lock().unwrap();
        Ok(state
            .outbox
            .iter_mut()
            .find(|e| e.id == id && e.dispatched_at.is_none())
            .map(|e| e.dispatched_at = Some(Utc::now()))
            .is_some())
    }

    async fn record_failure(&self, id: DbId, error: &str) -> Result<(), CoreError> {
        let mut state = self.state.lock().unwrap();
        if let Some(e) = state.outbox.iter_mut().find(|e| e.id == id) {
            e.attempts += 1;
            e.last_error = Some(error.to_string());
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RecordingDistributor
// ---------------------------------------------------------------------------

/// Records enqueued tasks; de-duplicates by key like the real queue.
#[derive(Default)]
pub struct RecordingDistributor {
    tasks: Mutex<Vec<NewTask>>,
    pub fail: AtomicBool,
    /// Delay applied to every enqueue before it takes effect.
    delay: Option<Duration>,
}

impl RecordingDistributor {
    pub fn failing() -> Self {
        let d = Self::default();
        d.fail.store(true, Ordering::SeqCst);
        d
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn tasks(&self) -> Vec<NewTask> {
        self.tasks.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskDistributor for RecordingDistributor {
    async fn enqueue(&self, task: NewTask) -> Result<EnqueueOutcome, CoreError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(CoreError::Transient("queue unreachable".into()));
        }
        let mut tasks = self.tasks.lock().unwrap();
        if tasks.iter().any(|t| t.task_key == task.task_key) {
            return Ok(EnqueueOutcome::Duplicate);
        }
        tasks.push(task);
        Ok(EnqueueOutcome::Enqueued)
    }
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub distributor: Arc<RecordingDistributor>,
    pub tokens: Arc<TokenService>,
    pub users: UserApplication,
    pub sessions: SessionApplication,
}

pub fn harness_with(
    settings: UserApplicationSettings,
    distributor: RecordingDistributor,
) -> Harness {
    let store = Arc::new(MemoryStore::default());
    let distributor = Arc::new(distributor);
    let tokens = token_service();

    let users = UserApplication::new(
        store.clone(),
        store.clone(),
        store.clone(),
        distributor.clone(),
        cheap_hasher(),
        tokens.clone(),
        settings.clone(),
    );
    let sessions = SessionApplication::new(
        store.clone(),
        tokens.clone(),
        tokens.clone(),
        settings.access_token_duration,
        settings.operation_timeout,
    );

    Harness {
        store,
        distributor,
        tokens,
        users,
        sessions,
    }
}

pub fn harness() -> Harness {
    harness_with(settings(), RecordingDistributor::default())
}

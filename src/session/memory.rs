// src/session/memory.rs

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    common::error::CoreError,
    models::Session,
    session::{AuthGateway, SessionStore},
};

// Gateway de autenticação em memória para testes. Segredos em texto
// puro e tokens opacos: é um dublê, não um cofre.
pub struct MemoryAuthGateway {
    users: Mutex<HashMap<String, (Uuid, String)>>,
    session_ttl: chrono::Duration,
    fail_invalidate: AtomicBool,
    fail_refresh: AtomicBool,
}

impl Default for MemoryAuthGateway {
    fn default() -> Self {
        Self {
            users: Mutex::new(HashMap::new()),
            session_ttl: chrono::Duration::hours(1),
            fail_invalidate: AtomicBool::new(false),
            fail_refresh: AtomicBool::new(false),
        }
    }
}

impl MemoryAuthGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(session_ttl: chrono::Duration) -> Self {
        Self { session_ttl, ..Self::default() }
    }

    // Faz a próxima invalidação remota falhar com erro de rede, para
    // exercitar o teardown local do sign-out.
    pub fn fail_invalidate(&self) {
        self.fail_invalidate.store(true, Ordering::SeqCst);
    }

    pub fn fail_refresh(&self) {
        self.fail_refresh.store(true, Ordering::SeqCst);
    }

    fn issue(&self, user_id: Uuid) -> Session {
        Session {
            access_token: Uuid::new_v4().simple().to_string(),
            user_id,
            expires_at: Utc::now() + self.session_ttl,
        }
    }
}

#[async_trait]
impl AuthGateway for MemoryAuthGateway {
    async fn register(&self, user_id: Uuid, login: &str, secret: &str) -> Result<(), CoreError> {
        let mut users = self.users.lock().await;
        if users.contains_key(login) {
            return Err(CoreError::Conflict("auth_credentials_login_key".into()));
        }
        users.insert(login.to_string(), (user_id, secret.to_string()));
        Ok(())
    }

    async fn authenticate(&self, login: &str, secret: &str) -> Result<Session, CoreError> {
        let users = self.users.lock().await;
        match users.get(login) {
            Some((user_id, stored)) if stored == secret => Ok(self.issue(*user_id)),
            _ => Err(CoreError::InvalidCredentials),
        }
    }

    async fn refresh(&self, session: &Session) -> Result<Session, CoreError> {
        if self.fail_refresh.swap(false, Ordering::SeqCst) {
            return Err(CoreError::InvalidCredentials);
        }
        if Utc::now() > session.expires_at {
            return Err(CoreError::InvalidCredentials);
        }
        Ok(self.issue(session.user_id))
    }

    async fn invalidate(&self, _session: &Session) -> Result<(), CoreError> {
        if self.fail_invalidate.swap(false, Ordering::SeqCst) {
            return Err(CoreError::Network);
        }
        Ok(())
    }

    async fn set_secret(&self, user_id: Uuid, secret: &str) -> Result<(), CoreError> {
        let mut users = self.users.lock().await;
        for (stored_id, stored_secret) in users.values_mut() {
            if *stored_id == user_id {
                *stored_secret = secret.to_string();
                return Ok(());
            }
        }
        Err(CoreError::NotFound)
    }
}

// Credencial persistida entre "reinícios": aqui, só um slot em memória.
#[derive(Default)]
pub struct MemorySessionStore {
    slot: Mutex<Option<Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self) -> Result<Option<Session>, CoreError> {
        Ok(self.slot.lock().await.clone())
    }

    async fn save(&self, session: &Session) -> Result<(), CoreError> {
        *self.slot.lock().await = Some(session.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), CoreError> {
        *self.slot.lock().await = None;
        Ok(())
    }
}

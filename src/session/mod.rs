// src/session/mod.rs

pub mod jwt;
pub mod memory;

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::{
    common::error::CoreError,
    models::{Profile, Session},
    realtime::ChangeFeedSubscriber,
    store::RemoteStore,
};

// Renova a credencial com esta folga antes de expirar.
const REFRESH_MARGIN: chrono::Duration = chrono::Duration::seconds(60);

// Resolução de perfil: retry com backoff, nunca espera fixa.
const PROFILE_RETRY_ATTEMPTS: u32 = 5;
const PROFILE_RETRY_BASE: Duration = Duration::from_millis(50);

// Teto para a chamada remota de sign-out; o teardown local nunca
// espera mais que isso pela rede.
const SIGN_OUT_REMOTE_TIMEOUT: Duration = Duration::from_secs(5);

// Autenticação remota, atrás de um trait para injeção (produção: JWT
// sobre Postgres; testes: memória).
#[async_trait]
pub trait AuthGateway: Send + Sync {
    async fn register(&self, user_id: Uuid, login: &str, secret: &str) -> Result<(), CoreError>;
    async fn authenticate(&self, login: &str, secret: &str) -> Result<Session, CoreError>;
    async fn refresh(&self, session: &Session) -> Result<Session, CoreError>;
    async fn invalidate(&self, session: &Session) -> Result<(), CoreError>;
    async fn set_secret(&self, user_id: Uuid, secret: &str) -> Result<(), CoreError>;
}

// Persistência da credencial entre reinícios do processo.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self) -> Result<Option<Session>, CoreError>;
    async fn save(&self, session: &Session) -> Result<(), CoreError>;
    async fn clear(&self) -> Result<(), CoreError>;
}

// Máquina de estados da sessão. Enquanto Restoring, leituras
// dependentes devem tratar como "carregando", nunca como deslogado.
#[derive(Debug, Clone)]
pub enum SessionState {
    Unknown,
    Restoring,
    Authenticated(Session),
    Refreshing(Session),
    Expired,
}

impl SessionState {
    pub fn is_loading(&self) -> bool {
        matches!(self, SessionState::Restoring)
    }

    pub fn session(&self) -> Option<&Session> {
        match self {
            SessionState::Authenticated(s) | SessionState::Refreshing(s) => Some(s),
            _ => None,
        }
    }
}

struct SessionInner {
    gateway: Arc<dyn AuthGateway>,
    store: Arc<dyn RemoteStore>,
    session_store: Arc<dyn SessionStore>,
    subscriber: ChangeFeedSubscriber,
    state: RwLock<SessionState>,
    profile: RwLock<Option<Profile>>,
    refresh_task: StdMutex<Option<JoinHandle<()>>>,
}

// Dono exclusivo do estado de sessão; os demais componentes apenas
// leem o snapshot.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<SessionInner>,
}

impl SessionManager {
    pub fn new(
        gateway: Arc<dyn AuthGateway>,
        store: Arc<dyn RemoteStore>,
        session_store: Arc<dyn SessionStore>,
        subscriber: ChangeFeedSubscriber,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                gateway,
                store,
                session_store,
                subscriber,
                state: RwLock::new(SessionState::Unknown),
                profile: RwLock::new(None),
                refresh_task: StdMutex::new(None),
            }),
        }
    }

    pub async fn state(&self) -> SessionState {
        self.inner.state.read().await.clone()
    }

    pub async fn profile(&self) -> Option<Profile> {
        self.inner.profile.read().await.clone()
    }

    // Tenta restaurar uma sessão persistida no início do processo.
    pub async fn restore(&self) -> Result<SessionState, CoreError> {
        *self.inner.state.write().await = SessionState::Restoring;

        let persisted = match self.inner.session_store.load().await {
            Ok(p) => p,
            Err(err) => {
                *self.inner.state.write().await = SessionState::Unknown;
                return Err(err);
            }
        };
        let Some(session) = persisted else {
            *self.inner.state.write().await = SessionState::Unknown;
            return Ok(SessionState::Unknown);
        };

        // Revalida (e renova) a credencial persistida junto ao gateway.
        match self.inner.gateway.refresh(&session).await {
            Ok(renewed) => {
                self.inner.session_store.save(&renewed).await?;
                *self.inner.state.write().await = SessionState::Authenticated(renewed.clone());
                self.resolve_profile(renewed.user_id).await?;
                self.schedule_refresh();
                Ok(SessionState::Authenticated(renewed))
            }
            Err(CoreError::InvalidCredentials) => {
                let _ = self.inner.session_store.clear().await;
                *self.inner.state.write().await = SessionState::Unknown;
                Ok(SessionState::Unknown)
            }
            Err(err) => {
                *self.inner.state.write().await = SessionState::Unknown;
                Err(err)
            }
        }
    }

    // Resolve o identificador humano para o handle canônico de login e
    // autentica. Falhas esperadas voltam como variantes tipadas, nunca
    // como panic.
    pub async fn sign_in(&self, identifier: &str, secret: &str) -> Result<Session, CoreError> {
        let profile = self
            .inner
            .store
            .find_profile_by_username(identifier)
            .await?
            .ok_or(CoreError::NotFound)?;

        let handle = login_handle(&profile.username);
        let session = self.inner.gateway.authenticate(&handle, secret).await?;

        self.inner.session_store.save(&session).await?;
        *self.inner.state.write().await = SessionState::Authenticated(session.clone());
        *self.inner.profile.write().await = Some(profile);
        self.schedule_refresh();

        tracing::info!("🔓 sessão aberta para {}", session.user_id);
        Ok(session)
    }

    // Encerramento idempotente. O teardown local SEMPRE acontece; a
    // invalidação remota é melhor esforço com teto de tempo: uma
    // falha de rede não pode deixar a UI presa em "logado".
    pub async fn sign_out(&self) {
        let current = self.inner.state.read().await.session().cloned();

        if let Some(session) = current {
            let remote = tokio::time::timeout(
                SIGN_OUT_REMOTE_TIMEOUT,
                self.inner.gateway.invalidate(&session),
            )
            .await;
            match remote {
                Ok(Ok(())) => {}
                Ok(Err(err)) => tracing::warn!("sign-out remoto falhou: {} (seguindo com teardown local)", err),
                Err(_) => tracing::warn!("sign-out remoto excedeu o tempo (seguindo com teardown local)"),
            }
        }

        if let Err(err) = self.inner.session_store.clear().await {
            tracing::warn!("falha ao limpar credencial persistida: {}", err);
        }
        if let Some(task) = self.inner.refresh_task.lock().expect("lock de refresh envenenado").take() {
            task.abort();
        }
        *self.inner.profile.write().await = None;
        *self.inner.state.write().await = SessionState::Unknown;
        self.inner.subscriber.close_all();
        tracing::info!("🔒 sessão encerrada");
    }

    // Sessão expirada reconhecida pela superfície: volta a Unknown.
    pub async fn acknowledge_expiry(&self) {
        let mut state = self.inner.state.write().await;
        if matches!(*state, SessionState::Expired) {
            *state = SessionState::Unknown;
        }
    }

    // Resolução de perfil desacoplada da chegada do evento de sessão:
    // as duas fontes chegam fora de ordem, então isto é idempotente e
    // tenta de novo com backoff, jamais um sleep fixo para "dar tempo".
    pub async fn resolve_profile(&self, user_id: Uuid) -> Result<Profile, CoreError> {
        let mut delay = PROFILE_RETRY_BASE;
        let mut last_err = CoreError::NotFound;
        for _ in 0..PROFILE_RETRY_ATTEMPTS {
            match self.inner.store.get_profile(user_id).await {
                Ok(profile) => {
                    // A sessão pode ter trocado enquanto buscávamos;
                    // só grava se ainda for o mesmo principal.
                    let still_current = self
                        .inner
                        .state
                        .read()
                        .await
                        .session()
                        .is_none_or(|s| s.user_id == user_id);
                    if still_current {
                        *self.inner.profile.write().await = Some(profile.clone());
                    }
                    return Ok(profile);
                }
                Err(err @ (CoreError::NotFound | CoreError::Network | CoreError::TimedOut)) => {
                    last_err = err;
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Err(err) => return Err(err),
            }
        }
        Err(last_err)
    }

    // Renovação silenciosa antes da expiração: Authenticated →
    // Refreshing → Authenticated, ou Expired se o gateway recusar.
    fn schedule_refresh(&self) {
        let inner = Arc::clone(&self.inner);
        let manager = self.clone();
        let task = tokio::spawn(async move {
            loop {
                let session = match inner.state.read().await.session().cloned() {
                    Some(s) => s,
                    None => break,
                };
                let until_refresh = (session.expires_at - REFRESH_MARGIN) - chrono::Utc::now();
                if let Ok(wait) = until_refresh.to_std() {
                    tokio::time::sleep(wait).await;
                }

                *inner.state.write().await = SessionState::Refreshing(session.clone());
                match inner.gateway.refresh(&session).await {
                    Ok(renewed) => {
                        if let Err(err) = inner.session_store.save(&renewed).await {
                            tracing::warn!("falha ao persistir credencial renovada: {}", err);
                        }
                        *inner.state.write().await = SessionState::Authenticated(renewed);
                    }
                    Err(err) if err.is_retryable() => {
                        tracing::warn!("renovação transitoriamente indisponível: {}", err);
                        *inner.state.write().await = SessionState::Authenticated(session);
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                    Err(err) => {
                        tracing::warn!("sessão expirada: {}", err);
                        let _ = inner.session_store.clear().await;
                        *inner.profile.write().await = None;
                        *inner.state.write().await = SessionState::Expired;
                        manager.inner.subscriber.close_all();
                        break;
                    }
                }
            }
        });
        if let Some(old) = self
            .inner
            .refresh_task
            .lock()
            .expect("lock de refresh envenenado")
            .replace(task)
        {
            old.abort();
        }
    }
}

// O identificador humano (username) vira o handle canônico de login da
// credencial, no mesmo domínio sintético que o cadastro usa.
pub fn login_handle(username: &str) -> String {
    format!("{}@oficina.app", username.trim().to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_de_login_normaliza_o_username() {
        assert_eq!(login_handle("Maria "), "maria@oficina.app");
        assert_eq!(login_handle("joao"), "joao@oficina.app");
    }
}

// src/services/invite.rs

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use crate::{
    cache::QueryCache,
    common::error::CoreError,
    models::auth::{RegisterPayload, Role},
    models::{InviteToken, Profile},
    session::{login_handle, AuthGateway},
    store::{RemoteStore, Table},
    workflow,
};

// Emissão e consumo de convites de cadastro. A máquina de estados do
// convite (workflow::invite) decide o que é consumível; aqui só
// orquestramos armazenamento e credencial.
#[derive(Clone)]
pub struct InviteService {
    store: Arc<dyn RemoteStore>,
    gateway: Arc<dyn AuthGateway>,
    cache: Arc<QueryCache>,
}

impl InviteService {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        gateway: Arc<dyn AuthGateway>,
        cache: Arc<QueryCache>,
    ) -> Self {
        Self { store, gateway, cache }
    }

    pub async fn create_invite(
        &self,
        actor: &Profile,
        validity: chrono::Duration,
    ) -> Result<InviteToken, CoreError> {
        if !actor.role.is_admin() {
            return Err(CoreError::PermissionDenied);
        }

        let invite = InviteToken {
            id: Uuid::new_v4(),
            token: Uuid::new_v4().simple().to_string(),
            created_by: actor.id,
            expires_at: Utc::now() + validity,
            used_at: None,
            used_by: None,
        };
        self.store.insert_invite(&invite).await?;
        self.cache.mark_table_stale(Table::InviteTokens).await;
        tracing::info!("✉️ convite emitido por {}", actor.username);
        Ok(invite)
    }

    // Registro via convite: valida o token pela máquina de estados,
    // cria perfil + credencial e marca o convite como usado gravando
    // QUEM o consumiu.
    pub async fn register(&self, payload: RegisterPayload) -> Result<Profile, CoreError> {
        payload.validate()?;

        let invite = self
            .store
            .find_invite_by_token(&payload.invite_token)
            .await?
            .ok_or(CoreError::NotFound)?;

        let user_id = Uuid::new_v4();
        let consumed = workflow::invite::consume(&invite, Utc::now(), user_id)?;

        let now = Utc::now();
        let profile = Profile {
            id: user_id,
            username: payload.username.trim().to_lowercase(),
            full_name: payload.full_name,
            role: Role::Mechanic,
            created_at: now,
            updated_at: now,
        };

        // Perfil primeiro: se o username colidir (Conflict), nenhuma
        // credencial órfã fica para trás.
        self.store.insert_profile(&profile).await?;
        self.gateway
            .register(user_id, &login_handle(&profile.username), &payload.password)
            .await?;
        self.store
            .mark_invite_used(invite.id, consumed.used_at, consumed.used_by)
            .await?;

        self.cache.mark_table_stale(Table::Profiles).await;
        self.cache.mark_table_stale(Table::InviteTokens).await;
        tracing::info!("👤 novo usuário registrado: {}", profile.username);
        Ok(profile)
    }
}

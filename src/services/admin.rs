// src/services/admin.rs

use std::sync::Arc;

use uuid::Uuid;

use crate::{
    cache::QueryCache,
    common::error::CoreError,
    models::log::NewSystemLog,
    models::Profile,
    session::AuthGateway,
    store::{RemoteStore, Table},
};

// Operações privilegiadas sobre contas de usuário. O papel do chamador
// é REVERIFICADO contra o armazenamento a cada chamada, independente
// do que o cliente alega ser.
#[derive(Clone)]
pub struct AdminService {
    store: Arc<dyn RemoteStore>,
    gateway: Arc<dyn AuthGateway>,
    cache: Arc<QueryCache>,
}

impl AdminService {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        gateway: Arc<dyn AuthGateway>,
        cache: Arc<QueryCache>,
    ) -> Self {
        Self { store, gateway, cache }
    }

    async fn require_admin(&self, actor_id: Uuid) -> Result<Profile, CoreError> {
        let actor = self.store.get_profile(actor_id).await?;
        if !actor.role.is_admin() {
            return Err(CoreError::PermissionDenied);
        }
        Ok(actor)
    }

    pub async fn update_user_password(
        &self,
        actor_id: Uuid,
        target_id: Uuid,
        new_password: &str,
    ) -> Result<(), CoreError> {
        let actor = self.require_admin(actor_id).await?;
        if new_password.len() < 6 {
            return Err(CoreError::PolicyViolation(
                "a senha deve ter no mínimo 6 caracteres".into(),
            ));
        }

        self.gateway.set_secret(target_id, new_password).await?;

        let entry = NewSystemLog {
            action: "UPDATE".into(),
            table_name: "auth_credentials".into(),
            record_id: Some(target_id.to_string()),
            old_data: None,
            // Nunca gravamos a senha, nem o hash, na auditoria.
            new_data: Some(serde_json::json!({ "password": "<redefinida>" })),
            user_name: actor.username.clone(),
        };
        if let Err(err) = self.store.append_log(&entry).await {
            tracing::warn!("falha ao auditar troca de senha: {}", err);
        }
        tracing::info!("🔑 senha de {} redefinida por {}", target_id, actor.username);
        Ok(())
    }

    pub async fn update_user_data(
        &self,
        actor_id: Uuid,
        target_id: Uuid,
        full_name: Option<&str>,
        username: Option<&str>,
    ) -> Result<Profile, CoreError> {
        let actor = self.require_admin(actor_id).await?;

        // Username duplicado volta como Conflict, classificado pela
        // camada de store.
        let updated = self
            .store
            .update_profile_data(target_id, full_name, username)
            .await?;

        let entry = NewSystemLog {
            action: "UPDATE".into(),
            table_name: Table::Profiles.as_str().into(),
            record_id: Some(target_id.to_string()),
            old_data: None,
            new_data: serde_json::to_value(&updated).ok(),
            user_name: actor.username,
        };
        if let Err(err) = self.store.append_log(&entry).await {
            tracing::warn!("falha ao auditar edição de usuário: {}", err);
        }
        self.cache.mark_table_stale(Table::Profiles).await;
        Ok(updated)
    }
}

// src/store/memory.rs

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    common::error::CoreError,
    models::log::NewSystemLog,
    models::{Budget, BudgetItem, Checklist, ChecklistItem, InviteToken, Profile, Service, SystemLog},
    store::RemoteStore,
};

// Dublê de teste do armazenamento remoto. Guarda tudo em memória,
// conta leituras por operação (para provar coalescência de cache) e
// aceita injeção de falha e de latência.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    checklists: HashMap<Uuid, Checklist>,
    checklist_items: HashMap<Uuid, Vec<ChecklistItem>>,
    budgets: HashMap<Uuid, Budget>,
    budget_items: HashMap<Uuid, Vec<BudgetItem>>,
    services: HashMap<Uuid, Service>,
    profiles: HashMap<Uuid, Profile>,
    invites: HashMap<Uuid, InviteToken>,
    logs: Vec<SystemLog>,
    budget_seq: u32,
    reads: HashMap<&'static str, usize>,
    fail_next: Option<CoreError>,
    read_delay: Option<Duration>,
    write_delay: Option<Duration>,
}

impl Inner {
    fn note(&mut self, op: &'static str) {
        *self.reads.entry(op).or_insert(0) += 1;
    }

    fn take_failure(&mut self) -> Result<(), CoreError> {
        match self.fail_next.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // Quantas vezes a operação de leitura `op` chegou até aqui.
    pub async fn read_count(&self, op: &str) -> usize {
        self.inner.lock().await.reads.get(op).copied().unwrap_or(0)
    }

    // A próxima operação (qualquer uma) falha com `err`.
    pub async fn fail_next_with(&self, err: CoreError) {
        self.inner.lock().await.fail_next = Some(err);
    }

    // Latência artificial antes de cada leitura de lista.
    pub async fn set_read_delay(&self, delay: Duration) {
        self.inner.lock().await.read_delay = Some(delay);
    }

    // Latência artificial antes de cada insert, para segurar uma
    // escrita em voo enquanto o chamador é cancelado.
    pub async fn set_write_delay(&self, delay: Duration) {
        self.inner.lock().await.write_delay = Some(delay);
    }

    pub async fn seed_profile(&self, profile: Profile) {
        self.inner.lock().await.profiles.insert(profile.id, profile);
    }

    pub async fn seed_invite(&self, invite: InviteToken) {
        self.inner.lock().await.invites.insert(invite.id, invite);
    }

    async fn maybe_delay(&self) {
        let delay = self.inner.lock().await.read_delay;
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
    }

    async fn maybe_write_delay(&self) {
        let delay = self.inner.lock().await.write_delay;
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn list_checklists(&self, mechanic: Option<Uuid>) -> Result<Vec<Checklist>, CoreError> {
        self.maybe_delay().await;
        let mut g = self.inner.lock().await;
        g.note("list_checklists");
        g.take_failure()?;
        let mut rows: Vec<Checklist> = g
            .checklists
            .values()
            .filter(|c| mechanic.is_none_or(|m| c.mechanic_id == m))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn get_checklist(&self, id: Uuid) -> Result<Checklist, CoreError> {
        let mut g = self.inner.lock().await;
        g.note("get_checklist");
        g.take_failure()?;
        g.checklists.get(&id).cloned().ok_or(CoreError::NotFound)
    }

    async fn insert_checklist(&self, checklist: &Checklist) -> Result<(), CoreError> {
        self.maybe_write_delay().await;
        let mut g = self.inner.lock().await;
        g.take_failure()?;
        g.checklists.insert(checklist.id, checklist.clone());
        Ok(())
    }

    async fn update_checklist(&self, checklist: &Checklist) -> Result<(), CoreError> {
        let mut g = self.inner.lock().await;
        g.take_failure()?;
        if !g.checklists.contains_key(&checklist.id) {
            return Err(CoreError::NotFound);
        }
        g.checklists.insert(checklist.id, checklist.clone());
        Ok(())
    }

    async fn delete_checklist(&self, id: Uuid) -> Result<(), CoreError> {
        let mut g = self.inner.lock().await;
        g.take_failure()?;
        g.checklists.remove(&id).ok_or(CoreError::NotFound)?;
        g.checklist_items.remove(&id);
        Ok(())
    }

    async fn list_checklist_items(&self, checklist_id: Uuid) -> Result<Vec<ChecklistItem>, CoreError> {
        self.maybe_delay().await;
        let mut g = self.inner.lock().await;
        g.note("list_checklist_items");
        g.take_failure()?;
        Ok(g.checklist_items.get(&checklist_id).cloned().unwrap_or_default())
    }

    async fn save_checklist_items(
        &self,
        checklist_id: Uuid,
        items: &[ChecklistItem],
    ) -> Result<(), CoreError> {
        let mut g = self.inner.lock().await;
        g.take_failure()?;
        if !g.checklists.contains_key(&checklist_id) {
            return Err(CoreError::NotFound);
        }
        // Troca atômica: o conjunto anterior some por inteiro.
        g.checklist_items.insert(checklist_id, items.to_vec());
        Ok(())
    }

    async fn list_budgets(&self, mechanic: Option<Uuid>) -> Result<Vec<Budget>, CoreError> {
        self.maybe_delay().await;
        let mut g = self.inner.lock().await;
        g.note("list_budgets");
        g.take_failure()?;
        let mut rows: Vec<Budget> = g
            .budgets
            .values()
            .filter(|b| mechanic.is_none_or(|m| b.mechanic_id == m))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn get_budget(&self, id: Uuid) -> Result<Budget, CoreError> {
        let mut g = self.inner.lock().await;
        g.note("get_budget");
        g.take_failure()?;
        g.budgets.get(&id).cloned().ok_or(CoreError::NotFound)
    }

    async fn insert_budget(&self, budget: &Budget) -> Result<(), CoreError> {
        self.maybe_write_delay().await;
        let mut g = self.inner.lock().await;
        g.take_failure()?;
        g.budgets.insert(budget.id, budget.clone());
        Ok(())
    }

    async fn update_budget(&self, budget: &Budget) -> Result<(), CoreError> {
        let mut g = self.inner.lock().await;
        g.take_failure()?;
        if !g.budgets.contains_key(&budget.id) {
            return Err(CoreError::NotFound);
        }
        g.budgets.insert(budget.id, budget.clone());
        Ok(())
    }

    async fn delete_budget(&self, id: Uuid) -> Result<(), CoreError> {
        let mut g = self.inner.lock().await;
        g.take_failure()?;
        g.budgets.remove(&id).ok_or(CoreError::NotFound)?;
        g.budget_items.remove(&id);
        Ok(())
    }

    async fn generate_budget_number(&self) -> Result<String, CoreError> {
        let mut g = self.inner.lock().await;
        g.take_failure()?;
        g.budget_seq += 1;
        Ok(format!("ORC-{:04}", g.budget_seq))
    }

    async fn list_budget_items(&self, budget_id: Uuid) -> Result<Vec<BudgetItem>, CoreError> {
        self.maybe_delay().await;
        let mut g = self.inner.lock().await;
        g.note("list_budget_items");
        g.take_failure()?;
        Ok(g.budget_items.get(&budget_id).cloned().unwrap_or_default())
    }

    async fn replace_budget_items(&self, budget_id: Uuid, items: &[BudgetItem]) -> Result<(), CoreError> {
        let mut g = self.inner.lock().await;
        g.take_failure()?;
        if !g.budgets.contains_key(&budget_id) {
            return Err(CoreError::NotFound);
        }
        g.budget_items.insert(budget_id, items.to_vec());
        Ok(())
    }

    async fn list_services(&self, only_active: bool) -> Result<Vec<Service>, CoreError> {
        self.maybe_delay().await;
        let mut g = self.inner.lock().await;
        g.note("list_services");
        g.take_failure()?;
        let mut rows: Vec<Service> = g
            .services
            .values()
            .filter(|s| !only_active || s.is_active)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }

    async fn insert_service(&self, service: &Service) -> Result<(), CoreError> {
        let mut g = self.inner.lock().await;
        g.take_failure()?;
        g.services.insert(service.id, service.clone());
        Ok(())
    }

    async fn update_service(&self, service: &Service) -> Result<(), CoreError> {
        let mut g = self.inner.lock().await;
        g.take_failure()?;
        if !g.services.contains_key(&service.id) {
            return Err(CoreError::NotFound);
        }
        g.services.insert(service.id, service.clone());
        Ok(())
    }

    async fn get_profile(&self, id: Uuid) -> Result<Profile, CoreError> {
        let mut g = self.inner.lock().await;
        g.note("get_profile");
        g.take_failure()?;
        g.profiles.get(&id).cloned().ok_or(CoreError::NotFound)
    }

    async fn find_profile_by_username(&self, username: &str) -> Result<Option<Profile>, CoreError> {
        let mut g = self.inner.lock().await;
        g.note("find_profile_by_username");
        g.take_failure()?;
        Ok(g.profiles.values().find(|p| p.username == username).cloned())
    }

    async fn list_profiles(&self) -> Result<Vec<Profile>, CoreError> {
        self.maybe_delay().await;
        let mut g = self.inner.lock().await;
        g.note("list_profiles");
        g.take_failure()?;
        let mut rows: Vec<Profile> = g.profiles.values().cloned().collect();
        rows.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(rows)
    }

    async fn insert_profile(&self, profile: &Profile) -> Result<(), CoreError> {
        let mut g = self.inner.lock().await;
        g.take_failure()?;
        if g.profiles.values().any(|p| p.username == profile.username) {
            return Err(CoreError::Conflict("profiles_username_key".into()));
        }
        g.profiles.insert(profile.id, profile.clone());
        Ok(())
    }

    async fn update_profile_data(
        &self,
        user_id: Uuid,
        full_name: Option<&str>,
        username: Option<&str>,
    ) -> Result<Profile, CoreError> {
        let mut g = self.inner.lock().await;
        g.take_failure()?;
        if let Some(new_username) = username {
            let taken = g
                .profiles
                .values()
                .any(|p| p.id != user_id && p.username == new_username);
            if taken {
                return Err(CoreError::Conflict("profiles_username_key".into()));
            }
        }
        let profile = g.profiles.get_mut(&user_id).ok_or(CoreError::NotFound)?;
        if let Some(name) = full_name {
            profile.full_name = name.to_string();
        }
        if let Some(u) = username {
            profile.username = u.to_string();
        }
        profile.updated_at = Utc::now();
        Ok(profile.clone())
    }

    async fn insert_invite(&self, invite: &InviteToken) -> Result<(), CoreError> {
        let mut g = self.inner.lock().await;
        g.take_failure()?;
        g.invites.insert(invite.id, invite.clone());
        Ok(())
    }

    async fn find_invite_by_token(&self, token: &str) -> Result<Option<InviteToken>, CoreError> {
        let mut g = self.inner.lock().await;
        g.note("find_invite_by_token");
        g.take_failure()?;
        Ok(g.invites.values().find(|i| i.token == token).cloned())
    }

    async fn mark_invite_used(
        &self,
        id: Uuid,
        used_at: DateTime<Utc>,
        used_by: Uuid,
    ) -> Result<(), CoreError> {
        let mut g = self.inner.lock().await;
        g.take_failure()?;
        let invite = g.invites.get_mut(&id).ok_or(CoreError::NotFound)?;
        invite.used_at = Some(used_at);
        invite.used_by = Some(used_by);
        Ok(())
    }

    async fn append_log(&self, entry: &NewSystemLog) -> Result<(), CoreError> {
        let mut g = self.inner.lock().await;
        g.take_failure()?;
        let log = SystemLog {
            id: Uuid::new_v4(),
            action: entry.action.clone(),
            table_name: entry.table_name.clone(),
            record_id: entry.record_id.clone(),
            old_data: entry.old_data.clone(),
            new_data: entry.new_data.clone(),
            user_name: entry.user_name.clone(),
            created_at: Utc::now(),
        };
        g.logs.push(log);
        Ok(())
    }

    async fn list_logs(&self) -> Result<Vec<SystemLog>, CoreError> {
        let mut g = self.inner.lock().await;
        g.note("list_logs");
        g.take_failure()?;
        Ok(g.logs.clone())
    }
}

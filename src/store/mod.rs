// src/store/mod.rs

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    common::error::CoreError,
    models::{
        Budget, BudgetItem, Checklist, ChecklistItem, InviteToken, Profile, Service, SystemLog,
    },
    models::log::NewSystemLog,
};

// As coleções nomeadas do armazenamento remoto. O feed de mudanças e o
// mapa de invalidação falam em termos destas tabelas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Checklists,
    ChecklistItems,
    Budgets,
    BudgetItems,
    Services,
    Profiles,
    InviteTokens,
    SystemLogs,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Checklists => "checklists",
            Table::ChecklistItems => "checklist_items",
            Table::Budgets => "budgets",
            Table::BudgetItems => "budget_items",
            Table::Services => "services",
            Table::Profiles => "profiles",
            Table::InviteTokens => "invite_tokens",
            Table::SystemLogs => "system_logs",
        }
    }

    pub fn parse(name: &str) -> Option<Table> {
        match name {
            "checklists" => Some(Table::Checklists),
            "checklist_items" => Some(Table::ChecklistItems),
            "budgets" => Some(Table::Budgets),
            "budget_items" => Some(Table::BudgetItems),
            "services" => Some(Table::Services),
            "profiles" => Some(Table::Profiles),
            "invite_tokens" => Some(Table::InviteTokens),
            "system_logs" => Some(Table::SystemLogs),
            _ => None,
        }
    }

    pub const ALL: [Table; 8] = [
        Table::Checklists,
        Table::ChecklistItems,
        Table::Budgets,
        Table::BudgetItems,
        Table::Services,
        Table::Profiles,
        Table::InviteTokens,
        Table::SystemLogs,
    ];
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// Operações de leitura/escrita contra o armazenamento remoto,
// atrás de um trait para que o pipeline e o cache recebam a
// implementação por injeção (produção = Postgres, testes = memória).
#[async_trait]
pub trait RemoteStore: Send + Sync {
    // --- Checklists ---
    async fn list_checklists(&self, mechanic: Option<Uuid>) -> Result<Vec<Checklist>, CoreError>;
    async fn get_checklist(&self, id: Uuid) -> Result<Checklist, CoreError>;
    async fn insert_checklist(&self, checklist: &Checklist) -> Result<(), CoreError>;
    async fn update_checklist(&self, checklist: &Checklist) -> Result<(), CoreError>;
    async fn delete_checklist(&self, id: Uuid) -> Result<(), CoreError>;

    async fn list_checklist_items(&self, checklist_id: Uuid) -> Result<Vec<ChecklistItem>, CoreError>;

    // Troca atômica da coleção de itens (procedimento remoto
    // `save_checklist_items`): apaga e reinsere num passo só.
    async fn save_checklist_items(
        &self,
        checklist_id: Uuid,
        items: &[ChecklistItem],
    ) -> Result<(), CoreError>;

    // --- Orçamentos ---
    async fn list_budgets(&self, mechanic: Option<Uuid>) -> Result<Vec<Budget>, CoreError>;
    async fn get_budget(&self, id: Uuid) -> Result<Budget, CoreError>;
    async fn insert_budget(&self, budget: &Budget) -> Result<(), CoreError>;
    async fn update_budget(&self, budget: &Budget) -> Result<(), CoreError>;
    async fn delete_budget(&self, id: Uuid) -> Result<(), CoreError>;

    // Procedimento remoto: o número é cunhado pelo servidor ANTES do
    // insert; o cliente nunca fabrica esse valor.
    async fn generate_budget_number(&self) -> Result<String, CoreError>;

    async fn list_budget_items(&self, budget_id: Uuid) -> Result<Vec<BudgetItem>, CoreError>;
    async fn replace_budget_items(
        &self,
        budget_id: Uuid,
        items: &[BudgetItem],
    ) -> Result<(), CoreError>;

    // --- Catálogo de serviços ---
    async fn list_services(&self, only_active: bool) -> Result<Vec<Service>, CoreError>;
    async fn insert_service(&self, service: &Service) -> Result<(), CoreError>;
    async fn update_service(&self, service: &Service) -> Result<(), CoreError>;

    // --- Perfis ---
    async fn get_profile(&self, id: Uuid) -> Result<Profile, CoreError>;
    async fn find_profile_by_username(&self, username: &str) -> Result<Option<Profile>, CoreError>;
    async fn list_profiles(&self) -> Result<Vec<Profile>, CoreError>;
    async fn insert_profile(&self, profile: &Profile) -> Result<(), CoreError>;
    async fn update_profile_data(
        &self,
        user_id: Uuid,
        full_name: Option<&str>,
        username: Option<&str>,
    ) -> Result<Profile, CoreError>;

    // --- Convites ---
    async fn insert_invite(&self, invite: &InviteToken) -> Result<(), CoreError>;
    async fn find_invite_by_token(&self, token: &str) -> Result<Option<InviteToken>, CoreError>;
    async fn mark_invite_used(
        &self,
        id: Uuid,
        used_at: chrono::DateTime<chrono::Utc>,
        used_by: Uuid,
    ) -> Result<(), CoreError>;

    // --- Auditoria (append-only) ---
    async fn append_log(&self, entry: &NewSystemLog) -> Result<(), CoreError>;
    async fn list_logs(&self) -> Result<Vec<SystemLog>, CoreError>;
}

// src/cache/mod.rs

pub mod coordinator;

pub use coordinator::InvalidationCoordinator;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::{common::error::CoreError, store::RemoteStore, store::Table};

// Identidade lógica de uma consulta cacheada: entidade + parâmetros.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryKey {
    Checklists { mechanic: Option<Uuid> },
    ChecklistItems { checklist_id: Uuid },
    Budgets { mechanic: Option<Uuid> },
    BudgetItems { budget_id: Uuid },
    Services { only_active: bool },
    Profiles,
    SystemLogs,
}

impl QueryKey {
    // Mapa declarativo de dependências: quais tabelas remotas tornam
    // esta consulta obsoleta. Inclui entidades RELACIONADAS: a lista
    // de orçamentos exibe totais derivados dos itens, então mudança em
    // budget_items também a invalida.
    pub fn depends_on(&self, table: Table) -> bool {
        match self {
            QueryKey::Checklists { .. } => {
                matches!(table, Table::Checklists | Table::ChecklistItems)
            }
            QueryKey::ChecklistItems { .. } => {
                matches!(table, Table::ChecklistItems | Table::Checklists)
            }
            QueryKey::Budgets { .. } => matches!(table, Table::Budgets | Table::BudgetItems),
            QueryKey::BudgetItems { .. } => matches!(table, Table::BudgetItems | Table::Budgets),
            QueryKey::Services { .. } => matches!(table, Table::Services),
            QueryKey::Profiles => matches!(table, Table::Profiles),
            QueryKey::SystemLogs => matches!(table, Table::SystemLogs),
        }
    }
}

// Estado observável de uma entrada. TimedOut é distinto de Loading de
// propósito: a UI precisa saber a diferença entre "esperando" e
// "desisti de esperar".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Fresh,
    Stale,
    Loading,
    TimedOut,
}

struct Entry {
    value: Option<serde_json::Value>,
    state: EntryState,
}

// Cache de leitura com invalidação por staleness e coalescência de
// re-buscas: no máximo UMA busca em voo por identidade de consulta.
pub struct QueryCache {
    store: Arc<dyn RemoteStore>,
    entries: Mutex<HashMap<QueryKey, Entry>>,
    inflight: Mutex<HashMap<QueryKey, Arc<Mutex<()>>>>,
    fetch_timeout: Duration,
}

impl QueryCache {
    pub fn new(store: Arc<dyn RemoteStore>, fetch_timeout: Duration) -> Self {
        Self {
            store,
            entries: Mutex::new(HashMap::new()),
            inflight: Mutex::new(HashMap::new()),
            fetch_timeout,
        }
    }

    // Leitura com re-busca sob demanda. Leitores concorrentes da mesma
    // consulta obsoleta aguardam a mesma busca em vez de duplicá-la.
    pub async fn read(&self, key: &QueryKey) -> Result<serde_json::Value, CoreError> {
        if let Some(value) = self.fresh_value(key).await {
            return Ok(value);
        }

        // Trava por chave: enquanto seguramos o guard, somos a única
        // busca em voo para esta identidade.
        let _guard = self.acquire_inflight(key).await;

        // Outra tarefa pode ter resolvido enquanto esperávamos o lock.
        if let Some(value) = self.fresh_value(key).await {
            return Ok(value);
        }

        self.set_state(key, EntryState::Loading).await;
        match tokio::time::timeout(self.fetch_timeout, self.fetch(key)).await {
            Err(_) => {
                self.set_state(key, EntryState::TimedOut).await;
                Err(CoreError::TimedOut)
            }
            Ok(Err(err)) => {
                // Busca falhou: a entrada volta a Stale e mantém o
                // último valor conhecido, se houver.
                self.set_state(key, EntryState::Stale).await;
                Err(err)
            }
            Ok(Ok(value)) => {
                let mut entries = self.entries.lock().await;
                let entry = entries
                    .entry(key.clone())
                    .or_insert(Entry { value: None, state: EntryState::Loading });
                entry.value = Some(value.clone());
                // Uma marca de staleness que chegou DURANTE a busca
                // vence: o snapshot pode ser anterior à escrita que a
                // emitiu, então só promove a Fresh se ninguém marcou.
                if entry.state == EntryState::Loading {
                    entry.state = EntryState::Fresh;
                }
                Ok(value)
            }
        }
    }

    pub async fn read_as<T: DeserializeOwned>(&self, key: &QueryKey) -> Result<T, CoreError> {
        let value = self.read(key).await?;
        serde_json::from_value(value)
            .map_err(|e| CoreError::Internal(anyhow::anyhow!("cache com formato inesperado: {e}")))
    }

    // Marca obsoletas todas as consultas que dependem da tabela.
    // Idempotente: união de conjuntos, comutativa entre a marca
    // otimista do pipeline e a marca vinda do feed. Entradas Loading
    // também são marcadas: a busca em voo pode devolver um snapshot
    // anterior à escrita, e quem completa a busca respeita a marca.
    pub async fn mark_table_stale(&self, table: Table) {
        let mut entries = self.entries.lock().await;
        for (key, entry) in entries.iter_mut() {
            if key.depends_on(table) {
                entry.state = EntryState::Stale;
            }
        }
    }

    // Reconexão do feed: não se sabe o que mudou, então tudo fica
    // obsoleto.
    pub async fn mark_all_stale(&self) {
        let mut entries = self.entries.lock().await;
        for entry in entries.values_mut() {
            entry.state = EntryState::Stale;
        }
    }

    pub async fn state_of(&self, key: &QueryKey) -> Option<EntryState> {
        self.entries.lock().await.get(key).map(|e| e.state)
    }

    // Política de foreground: ao recuperar o foco, re-busca o que está
    // obsoleto; em segundo plano nada é buscado avidamente.
    pub async fn on_focus_regained(&self) {
        let stale_keys: Vec<QueryKey> = {
            let entries = self.entries.lock().await;
            entries
                .iter()
                .filter(|(_, e)| matches!(e.state, EntryState::Stale | EntryState::TimedOut))
                .map(|(k, _)| k.clone())
                .collect()
        };
        for key in stale_keys {
            if let Err(err) = self.read(&key).await {
                tracing::warn!("re-busca pós-foco falhou para {:?}: {}", key, err);
            }
        }
    }

    async fn fresh_value(&self, key: &QueryKey) -> Option<serde_json::Value> {
        let entries = self.entries.lock().await;
        match entries.get(key) {
            Some(Entry { value: Some(v), state: EntryState::Fresh }) => Some(v.clone()),
            _ => None,
        }
    }

    async fn set_state(&self, key: &QueryKey, state: EntryState) {
        let mut entries = self.entries.lock().await;
        let entry = entries
            .entry(key.clone())
            .or_insert(Entry { value: None, state: EntryState::Stale });
        entry.state = state;
    }

    async fn acquire_inflight(&self, key: &QueryKey) -> OwnedMutexGuard<()> {
        let lock = {
            let mut inflight = self.inflight.lock().await;
            Arc::clone(
                inflight
                    .entry(key.clone())
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };
        lock.lock_owned().await
    }

    // Execução autoritativa da consulta contra o armazenamento remoto.
    async fn fetch(&self, key: &QueryKey) -> Result<serde_json::Value, CoreError> {
        let value = match key {
            QueryKey::Checklists { mechanic } => {
                serde_json::to_value(self.store.list_checklists(*mechanic).await?)
            }
            QueryKey::ChecklistItems { checklist_id } => {
                serde_json::to_value(self.store.list_checklist_items(*checklist_id).await?)
            }
            QueryKey::Budgets { mechanic } => {
                serde_json::to_value(self.store.list_budgets(*mechanic).await?)
            }
            QueryKey::BudgetItems { budget_id } => {
                serde_json::to_value(self.store.list_budget_items(*budget_id).await?)
            }
            QueryKey::Services { only_active } => {
                serde_json::to_value(self.store.list_services(*only_active).await?)
            }
            QueryKey::Profiles => serde_json::to_value(self.store.list_profiles().await?),
            QueryKey::SystemLogs => serde_json::to_value(self.store.list_logs().await?),
        };
        value.map_err(|e| CoreError::Internal(anyhow::anyhow!("resultado não serializável: {e}")))
    }
}

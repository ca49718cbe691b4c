// src/mutations/mod.rs

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;
use validator::Validate;

use crate::{
    cache::QueryCache,
    common::error::CoreError,
    models::budget::{NewBudget, NewBudgetItem},
    models::checklist::{NewChecklist, NewChecklistItem},
    models::log::NewSystemLog,
    models::service::NewService,
    models::{Budget, BudgetItem, BudgetStatus, Checklist, ChecklistItem, ChecklistStatus, Profile, Service},
    store::{RemoteStore, Table},
    workflow,
};

// Executa comandos de escrita contra o armazenamento remoto e
// sincroniza o cache local. Ordem fixa: valida política ANTES da rede;
// depois da escrita, marca staleness otimista sem esperar o eco do
// feed: a própria aba precisa ver o efeito do próprio write já.
#[derive(Clone)]
pub struct MutationPipeline {
    store: Arc<dyn RemoteStore>,
    cache: Arc<QueryCache>,
}

impl MutationPipeline {
    pub fn new(store: Arc<dyn RemoteStore>, cache: Arc<QueryCache>) -> Self {
        Self { store, cache }
    }

    // Escritas rodam numa tarefa desanexada: se a view que originou o
    // comando for desmontada (e o future do chamador cancelado), a
    // escrita em voo COMPLETA e o cache é reconciliado mesmo assim.
    async fn detached<T, F>(&self, work: F) -> Result<T, CoreError>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, CoreError>> + Send + 'static,
    {
        tokio::spawn(work)
            .await
            .map_err(|e| CoreError::Internal(anyhow::anyhow!("tarefa de escrita abortada: {e}")))?
    }

    // --- Checklists ---

    pub async fn create_checklist(
        &self,
        actor: &Profile,
        payload: NewChecklist,
        items: Vec<NewChecklistItem>,
    ) -> Result<Checklist, CoreError> {
        payload.validate()?;
        for item in &items {
            item.validate()?;
        }

        let now = Utc::now();
        let checklist = Checklist {
            id: Uuid::new_v4(),
            mechanic_id: actor.id,
            vehicle_name: payload.vehicle_name,
            plate: payload.plate,
            customer_name: payload.customer_name,
            priority: payload.priority,
            status: ChecklistStatus::Pendente,
            general_observations: payload.general_observations,
            video_url: payload.video_url,
            completed_at: None,
            created_at: now,
            updated_at: now,
        };
        let rows = item_rows(checklist.id, &items);

        let store = Arc::clone(&self.store);
        let cache = Arc::clone(&self.cache);
        let audit = audit_entry(actor, "INSERT", Table::Checklists, Some(checklist.id), None, serde_json::to_value(&checklist).ok());
        let result = checklist.clone();
        self.detached(async move {
            store.insert_checklist(&checklist).await?;
            store.save_checklist_items(checklist.id, &rows).await?;
            append_audit(&*store, &audit).await;
            cache.mark_table_stale(Table::Checklists).await;
            cache.mark_table_stale(Table::ChecklistItems).await;
            Ok(())
        })
        .await?;
        Ok(result)
    }

    pub async fn update_checklist_details(
        &self,
        actor: &Profile,
        checklist_id: Uuid,
        payload: NewChecklist,
    ) -> Result<Checklist, CoreError> {
        payload.validate()?;
        let current = self.store.get_checklist(checklist_id).await?;
        ensure_checklist_access(actor, &current)?;

        let updated = Checklist {
            vehicle_name: payload.vehicle_name,
            plate: payload.plate,
            customer_name: payload.customer_name,
            priority: payload.priority,
            general_observations: payload.general_observations,
            video_url: payload.video_url,
            updated_at: Utc::now(),
            ..current.clone()
        };

        let store = Arc::clone(&self.store);
        let cache = Arc::clone(&self.cache);
        let audit = audit_entry(actor, "UPDATE", Table::Checklists, Some(checklist_id), serde_json::to_value(&current).ok(), serde_json::to_value(&updated).ok());
        let result = updated.clone();
        self.detached(async move {
            store.update_checklist(&updated).await?;
            append_audit(&*store, &audit).await;
            cache.mark_table_stale(Table::Checklists).await;
            Ok(())
        })
        .await?;
        Ok(result)
    }

    // Transição de status validada pela tabela de workflow ANTES de
    // qualquer chamada de rede; pedido ilegal nunca sai daqui.
    pub async fn transition_checklist(
        &self,
        actor: &Profile,
        checklist_id: Uuid,
        requested: ChecklistStatus,
    ) -> Result<Checklist, CoreError> {
        let current = self.store.get_checklist(checklist_id).await?;
        let is_owner = current.mechanic_id == actor.id;
        let applied =
            workflow::checklist::apply(current.status, requested, actor.role, is_owner, Utc::now())?;

        let updated = Checklist {
            status: applied.next,
            completed_at: applied.completed_at.or(current.completed_at),
            updated_at: Utc::now(),
            ..current.clone()
        };

        let store = Arc::clone(&self.store);
        let cache = Arc::clone(&self.cache);
        let audit = audit_entry(actor, "UPDATE", Table::Checklists, Some(checklist_id), serde_json::to_value(&current).ok(), serde_json::to_value(&updated).ok());
        let result = updated.clone();
        self.detached(async move {
            store.update_checklist(&updated).await?;
            append_audit(&*store, &audit).await;
            cache.mark_table_stale(Table::Checklists).await;
            Ok(())
        })
        .await?;
        Ok(result)
    }

    // Troca integral da coleção de itens (delete + reinsert no
    // servidor). Dois editores simultâneos do mesmo pai podem se
    // atropelar em silêncio: limitação aceita e documentada, não
    // corrida resolvida.
    pub async fn replace_checklist_items(
        &self,
        actor: &Profile,
        checklist_id: Uuid,
        items: Vec<NewChecklistItem>,
    ) -> Result<Vec<ChecklistItem>, CoreError> {
        for item in &items {
            item.validate()?;
        }
        let parent = self.store.get_checklist(checklist_id).await?;
        ensure_checklist_access(actor, &parent)?;

        let rows = item_rows(checklist_id, &items);
        let store = Arc::clone(&self.store);
        let cache = Arc::clone(&self.cache);
        let audit = audit_entry(actor, "UPDATE", Table::ChecklistItems, Some(checklist_id), None, serde_json::to_value(&rows).ok());
        let result = rows.clone();
        self.detached(async move {
            store.save_checklist_items(checklist_id, &rows).await?;
            append_audit(&*store, &audit).await;
            cache.mark_table_stale(Table::ChecklistItems).await;
            cache.mark_table_stale(Table::Checklists).await;
            Ok(())
        })
        .await?;
        Ok(result)
    }

    pub async fn delete_checklist(&self, actor: &Profile, checklist_id: Uuid) -> Result<(), CoreError> {
        let current = self.store.get_checklist(checklist_id).await?;
        ensure_checklist_access(actor, &current)?;

        let store = Arc::clone(&self.store);
        let cache = Arc::clone(&self.cache);
        let audit = audit_entry(actor, "DELETE", Table::Checklists, Some(checklist_id), serde_json::to_value(&current).ok(), None);
        self.detached(async move {
            store.delete_checklist(checklist_id).await?;
            append_audit(&*store, &audit).await;
            cache.mark_table_stale(Table::Checklists).await;
            cache.mark_table_stale(Table::ChecklistItems).await;
            Ok(())
        })
        .await
    }

    // --- Orçamentos ---

    pub async fn create_budget(
        &self,
        actor: &Profile,
        payload: NewBudget,
        items: Vec<NewBudgetItem>,
    ) -> Result<Budget, CoreError> {
        payload.validate()?;
        validate_budget_items(&items)?;
        ensure_budget_arithmetic(payload.total_amount, payload.discount_amount, payload.final_amount)?;

        let store = Arc::clone(&self.store);
        let cache = Arc::clone(&self.cache);
        let actor_clone = actor.clone();
        let budget = self
            .detached(async move {
                // O número vem do servidor antes do insert; o cliente
                // nunca fabrica esse valor.
                let budget_number = store.generate_budget_number().await?;
                let now = Utc::now();
                let budget = Budget {
                    id: Uuid::new_v4(),
                    mechanic_id: actor_clone.id,
                    budget_number,
                    customer_name: payload.customer_name,
                    vehicle_name: payload.vehicle_name,
                    vehicle_plate: payload.vehicle_plate,
                    total_amount: payload.total_amount,
                    discount_amount: payload.discount_amount,
                    final_amount: payload.final_amount,
                    status: BudgetStatus::Pendente,
                    created_at: now,
                    updated_at: now,
                };
                store.insert_budget(&budget).await?;
                let rows = budget_item_rows(budget.id, &items);
                store.replace_budget_items(budget.id, &rows).await?;
                let audit = audit_entry(&actor_clone, "INSERT", Table::Budgets, Some(budget.id), None, serde_json::to_value(&budget).ok());
                append_audit(&*store, &audit).await;
                cache.mark_table_stale(Table::Budgets).await;
                cache.mark_table_stale(Table::BudgetItems).await;
                Ok(budget)
            })
            .await?;
        Ok(budget)
    }

    pub async fn update_budget(
        &self,
        actor: &Profile,
        budget_id: Uuid,
        payload: NewBudget,
        items: Vec<NewBudgetItem>,
    ) -> Result<Budget, CoreError> {
        payload.validate()?;
        validate_budget_items(&items)?;
        ensure_budget_arithmetic(payload.total_amount, payload.discount_amount, payload.final_amount)?;

        let current = self.store.get_budget(budget_id).await?;
        workflow::budget::ensure_editable(current.status, actor.role, current.mechanic_id == actor.id)?;

        let updated = Budget {
            customer_name: payload.customer_name,
            vehicle_name: payload.vehicle_name,
            vehicle_plate: payload.vehicle_plate,
            total_amount: payload.total_amount,
            discount_amount: payload.discount_amount,
            final_amount: payload.final_amount,
            updated_at: Utc::now(),
            ..current.clone()
        };
        let rows = budget_item_rows(budget_id, &items);

        let store = Arc::clone(&self.store);
        let cache = Arc::clone(&self.cache);
        let audit = audit_entry(actor, "UPDATE", Table::Budgets, Some(budget_id), serde_json::to_value(&current).ok(), serde_json::to_value(&updated).ok());
        let result = updated.clone();
        self.detached(async move {
            store.update_budget(&updated).await?;
            store.replace_budget_items(budget_id, &rows).await?;
            append_audit(&*store, &audit).await;
            cache.mark_table_stale(Table::Budgets).await;
            cache.mark_table_stale(Table::BudgetItems).await;
            Ok(())
        })
        .await?;
        Ok(result)
    }

    pub async fn transition_budget(
        &self,
        actor: &Profile,
        budget_id: Uuid,
        requested: BudgetStatus,
    ) -> Result<Budget, CoreError> {
        let current = self.store.get_budget(budget_id).await?;
        let next = workflow::budget::apply(current.status, requested, actor.role)?;

        let updated = Budget { status: next, updated_at: Utc::now(), ..current.clone() };

        let store = Arc::clone(&self.store);
        let cache = Arc::clone(&self.cache);
        let audit = audit_entry(actor, "UPDATE", Table::Budgets, Some(budget_id), serde_json::to_value(&current).ok(), serde_json::to_value(&updated).ok());
        let result = updated.clone();
        self.detached(async move {
            store.update_budget(&updated).await?;
            append_audit(&*store, &audit).await;
            cache.mark_table_stale(Table::Budgets).await;
            Ok(())
        })
        .await?;
        Ok(result)
    }

    pub async fn delete_budget(&self, actor: &Profile, budget_id: Uuid) -> Result<(), CoreError> {
        let current = self.store.get_budget(budget_id).await?;
        workflow::budget::ensure_editable(current.status, actor.role, current.mechanic_id == actor.id)?;

        let store = Arc::clone(&self.store);
        let cache = Arc::clone(&self.cache);
        let audit = audit_entry(actor, "DELETE", Table::Budgets, Some(budget_id), serde_json::to_value(&current).ok(), None);
        self.detached(async move {
            store.delete_budget(budget_id).await?;
            append_audit(&*store, &audit).await;
            cache.mark_table_stale(Table::Budgets).await;
            cache.mark_table_stale(Table::BudgetItems).await;
            Ok(())
        })
        .await
    }

    // --- Catálogo de serviços (escrita restrita a admin) ---

    pub async fn create_service(&self, actor: &Profile, payload: NewService) -> Result<Service, CoreError> {
        if !actor.role.is_admin() {
            return Err(CoreError::PermissionDenied);
        }
        payload.validate()?;
        if payload.unit_price < Decimal::ZERO {
            return Err(CoreError::PolicyViolation("preço unitário não pode ser negativo".into()));
        }

        let now = Utc::now();
        let service = Service {
            id: Uuid::new_v4(),
            name: payload.name,
            category: payload.category,
            unit_price: payload.unit_price,
            is_active: true,
            description: payload.description,
            created_at: now,
            updated_at: now,
        };

        let store = Arc::clone(&self.store);
        let cache = Arc::clone(&self.cache);
        let audit = audit_entry(actor, "INSERT", Table::Services, Some(service.id), None, serde_json::to_value(&service).ok());
        let result = service.clone();
        self.detached(async move {
            store.insert_service(&service).await?;
            append_audit(&*store, &audit).await;
            cache.mark_table_stale(Table::Services).await;
            Ok(())
        })
        .await?;
        Ok(result)
    }

    pub async fn update_service(&self, actor: &Profile, service: Service) -> Result<Service, CoreError> {
        if !actor.role.is_admin() {
            return Err(CoreError::PermissionDenied);
        }
        if service.unit_price < Decimal::ZERO {
            return Err(CoreError::PolicyViolation("preço unitário não pode ser negativo".into()));
        }

        let updated = Service { updated_at: Utc::now(), ..service };
        let store = Arc::clone(&self.store);
        let cache = Arc::clone(&self.cache);
        let audit = audit_entry(actor, "UPDATE", Table::Services, Some(updated.id), None, serde_json::to_value(&updated).ok());
        let result = updated.clone();
        self.detached(async move {
            store.update_service(&updated).await?;
            append_audit(&*store, &audit).await;
            cache.mark_table_stale(Table::Services).await;
            Ok(())
        })
        .await?;
        Ok(result)
    }
}

// Dono ou admin; mais ninguém mexe num checklist.
fn ensure_checklist_access(actor: &Profile, checklist: &Checklist) -> Result<(), CoreError> {
    if actor.role.is_admin() || checklist.mechanic_id == actor.id {
        Ok(())
    } else {
        Err(CoreError::PermissionDenied)
    }
}

// Invariante aritmética do orçamento, verificada aqui porque o
// servidor não recalcula: final == total - desconto (tolerância 0.01).
fn ensure_budget_arithmetic(
    total: Decimal,
    discount: Option<Decimal>,
    final_amount: Decimal,
) -> Result<(), CoreError> {
    let expected = total - discount.unwrap_or(Decimal::ZERO);
    if (expected - final_amount).abs() > Decimal::new(1, 2) {
        return Err(CoreError::PolicyViolation(format!(
            "valor final {} não corresponde a total {} menos desconto {}",
            final_amount,
            total,
            discount.unwrap_or(Decimal::ZERO)
        )));
    }
    Ok(())
}

fn validate_budget_items(items: &[NewBudgetItem]) -> Result<(), CoreError> {
    for item in items {
        item.validate()?;
        if item.unit_price < Decimal::ZERO {
            return Err(CoreError::PolicyViolation("preço unitário não pode ser negativo".into()));
        }
    }
    Ok(())
}

fn item_rows(checklist_id: Uuid, items: &[NewChecklistItem]) -> Vec<ChecklistItem> {
    items
        .iter()
        .map(|item| ChecklistItem {
            id: Uuid::new_v4(),
            checklist_id,
            category: item.category.clone(),
            item_name: item.item_name.clone(),
            checked: item.checked,
            observation: item.observation.clone(),
        })
        .collect()
}

fn budget_item_rows(budget_id: Uuid, items: &[NewBudgetItem]) -> Vec<BudgetItem> {
    items
        .iter()
        .map(|item| BudgetItem {
            id: Uuid::new_v4(),
            budget_id,
            service_id: item.service_id,
            service_name: item.service_name.clone(),
            service_category: item.service_category.clone(),
            quantity: item.quantity,
            unit_price: item.unit_price,
            total_price: item.total_price(),
        })
        .collect()
}

fn audit_entry(
    actor: &Profile,
    action: &str,
    table: Table,
    record_id: Option<Uuid>,
    old_data: Option<serde_json::Value>,
    new_data: Option<serde_json::Value>,
) -> NewSystemLog {
    NewSystemLog {
        action: action.to_string(),
        table_name: table.as_str().to_string(),
        record_id: record_id.map(|id| id.to_string()),
        old_data,
        new_data,
        user_name: actor.username.clone(),
    }
}

// A trilha de auditoria não derruba uma mutação que já foi gravada;
// falha aqui vira aviso, não erro do chamador.
async fn append_audit(store: &dyn RemoteStore, entry: &NewSystemLog) {
    if let Err(err) = store.append_log(entry).await {
        tracing::warn!("falha ao gravar auditoria de {} em {}: {}", entry.action, entry.table_name, err);
    }
}

// src/store/postgres.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::error::CoreError,
    models::log::NewSystemLog,
    models::{Budget, BudgetItem, Checklist, ChecklistItem, InviteToken, Profile, Service, SystemLog},
    store::RemoteStore,
};

// Implementação de produção do RemoteStore sobre Postgres.
// Queries em tempo de execução (sem macros), erros classificados
// pelo From<sqlx::Error> em common::error.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RemoteStore for PgStore {
    async fn list_checklists(&self, mechanic: Option<Uuid>) -> Result<Vec<Checklist>, CoreError> {
        let rows = sqlx::query_as::<_, Checklist>(
            r#"
            SELECT id, mechanic_id, vehicle_name, plate, customer_name, priority,
                   status, general_observations, video_url, completed_at,
                   created_at, updated_at
            FROM checklists
            WHERE ($1::uuid IS NULL OR mechanic_id = $1)
            ORDER BY created_at DESC
            "#,
        )
        .bind(mechanic)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn get_checklist(&self, id: Uuid) -> Result<Checklist, CoreError> {
        let row = sqlx::query_as::<_, Checklist>(
            r#"
            SELECT id, mechanic_id, vehicle_name, plate, customer_name, priority,
                   status, general_observations, video_url, completed_at,
                   created_at, updated_at
            FROM checklists
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.ok_or(CoreError::NotFound)
    }

    async fn insert_checklist(&self, c: &Checklist) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            INSERT INTO checklists (
                id, mechanic_id, vehicle_name, plate, customer_name, priority,
                status, general_observations, video_url, completed_at,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(c.id)
        .bind(c.mechanic_id)
        .bind(&c.vehicle_name)
        .bind(&c.plate)
        .bind(&c.customer_name)
        .bind(c.priority)
        .bind(c.status)
        .bind(&c.general_observations)
        .bind(&c.video_url)
        .bind(c.completed_at)
        .bind(c.created_at)
        .bind(c.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_checklist(&self, c: &Checklist) -> Result<(), CoreError> {
        let result = sqlx::query(
            r#"
            UPDATE checklists
            SET vehicle_name = $2, plate = $3, customer_name = $4, priority = $5,
                status = $6, general_observations = $7, video_url = $8,
                completed_at = $9, updated_at = $10
            WHERE id = $1
            "#,
        )
        .bind(c.id)
        .bind(&c.vehicle_name)
        .bind(&c.plate)
        .bind(&c.customer_name)
        .bind(c.priority)
        .bind(c.status)
        .bind(&c.general_observations)
        .bind(&c.video_url)
        .bind(c.completed_at)
        .bind(c.updated_at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound);
        }
        Ok(())
    }

    async fn delete_checklist(&self, id: Uuid) -> Result<(), CoreError> {
        let result = sqlx::query("DELETE FROM checklists WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound);
        }
        Ok(())
    }

    async fn list_checklist_items(&self, checklist_id: Uuid) -> Result<Vec<ChecklistItem>, CoreError> {
        let rows = sqlx::query_as::<_, ChecklistItem>(
            r#"
            SELECT id, checklist_id, category, item_name, checked, observation
            FROM checklist_items
            WHERE checklist_id = $1
            ORDER BY category, item_name
            "#,
        )
        .bind(checklist_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn save_checklist_items(
        &self,
        checklist_id: Uuid,
        items: &[ChecklistItem],
    ) -> Result<(), CoreError> {
        // Procedimento do servidor: apaga e reinsere a coleção num
        // único passo atômico.
        let payload = serde_json::to_value(items)
            .map_err(|e| CoreError::Internal(anyhow::anyhow!("itens não serializáveis: {e}")))?;
        sqlx::query("SELECT save_checklist_items($1, $2::jsonb)")
            .bind(checklist_id)
            .bind(payload)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_budgets(&self, mechanic: Option<Uuid>) -> Result<Vec<Budget>, CoreError> {
        let rows = sqlx::query_as::<_, Budget>(
            r#"
            SELECT id, mechanic_id, budget_number, customer_name, vehicle_name,
                   vehicle_plate, total_amount, discount_amount, final_amount,
                   status, created_at, updated_at
            FROM budgets
            WHERE ($1::uuid IS NULL OR mechanic_id = $1)
            ORDER BY created_at DESC
            "#,
        )
        .bind(mechanic)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn get_budget(&self, id: Uuid) -> Result<Budget, CoreError> {
        let row = sqlx::query_as::<_, Budget>(
            r#"
            SELECT id, mechanic_id, budget_number, customer_name, vehicle_name,
                   vehicle_plate, total_amount, discount_amount, final_amount,
                   status, created_at, updated_at
            FROM budgets
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.ok_or(CoreError::NotFound)
    }

    async fn insert_budget(&self, b: &Budget) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            INSERT INTO budgets (
                id, mechanic_id, budget_number, customer_name, vehicle_name,
                vehicle_plate, total_amount, discount_amount, final_amount,
                status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(b.id)
        .bind(b.mechanic_id)
        .bind(&b.budget_number)
        .bind(&b.customer_name)
        .bind(&b.vehicle_name)
        .bind(&b.vehicle_plate)
        .bind(b.total_amount)
        .bind(b.discount_amount)
        .bind(b.final_amount)
        .bind(b.status)
        .bind(b.created_at)
        .bind(b.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_budget(&self, b: &Budget) -> Result<(), CoreError> {
        let result = sqlx::query(
            r#"
            UPDATE budgets
            SET customer_name = $2, vehicle_name = $3, vehicle_plate = $4,
                total_amount = $5, discount_amount = $6, final_amount = $7,
                status = $8, updated_at = $9
            WHERE id = $1
            "#,
        )
        .bind(b.id)
        .bind(&b.customer_name)
        .bind(&b.vehicle_name)
        .bind(&b.vehicle_plate)
        .bind(b.total_amount)
        .bind(b.discount_amount)
        .bind(b.final_amount)
        .bind(b.status)
        .bind(b.updated_at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound);
        }
        Ok(())
    }

    async fn delete_budget(&self, id: Uuid) -> Result<(), CoreError> {
        let result = sqlx::query("DELETE FROM budgets WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound);
        }
        Ok(())
    }

    async fn generate_budget_number(&self) -> Result<String, CoreError> {
        // Cunhado pelo servidor; o cliente nunca inventa este valor.
        let number: String = sqlx::query_scalar("SELECT generate_budget_number()")
            .fetch_one(&self.pool)
            .await?;
        Ok(number)
    }

    async fn list_budget_items(&self, budget_id: Uuid) -> Result<Vec<BudgetItem>, CoreError> {
        let rows = sqlx::query_as::<_, BudgetItem>(
            r#"
            SELECT id, budget_id, service_id, service_name, service_category,
                   quantity, unit_price, total_price
            FROM budget_items
            WHERE budget_id = $1
            ORDER BY service_category, service_name
            "#,
        )
        .bind(budget_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn replace_budget_items(&self, budget_id: Uuid, items: &[BudgetItem]) -> Result<(), CoreError> {
        // Mesma semântica de troca atômica dos itens de checklist,
        // aqui via transação delete + reinsert.
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM budget_items WHERE budget_id = $1")
            .bind(budget_id)
            .execute(&mut *tx)
            .await?;
        for item in items {
            sqlx::query(
                r#"
                INSERT INTO budget_items (
                    id, budget_id, service_id, service_name, service_category,
                    quantity, unit_price, total_price
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(item.id)
            .bind(item.budget_id)
            .bind(item.service_id)
            .bind(&item.service_name)
            .bind(&item.service_category)
            .bind(item.quantity)
            .bind(item.unit_price)
            .bind(item.total_price)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn list_services(&self, only_active: bool) -> Result<Vec<Service>, CoreError> {
        let rows = sqlx::query_as::<_, Service>(
            r#"
            SELECT id, name, category, unit_price, is_active, description,
                   created_at, updated_at
            FROM services
            WHERE (NOT $1 OR is_active)
            ORDER BY name
            "#,
        )
        .bind(only_active)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn insert_service(&self, s: &Service) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            INSERT INTO services (id, name, category, unit_price, is_active,
                                  description, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(s.id)
        .bind(&s.name)
        .bind(&s.category)
        .bind(s.unit_price)
        .bind(s.is_active)
        .bind(&s.description)
        .bind(s.created_at)
        .bind(s.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_service(&self, s: &Service) -> Result<(), CoreError> {
        let result = sqlx::query(
            r#"
            UPDATE services
            SET name = $2, category = $3, unit_price = $4, is_active = $5,
                description = $6, updated_at = $7
            WHERE id = $1
            "#,
        )
        .bind(s.id)
        .bind(&s.name)
        .bind(&s.category)
        .bind(s.unit_price)
        .bind(s.is_active)
        .bind(&s.description)
        .bind(s.updated_at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound);
        }
        Ok(())
    }

    async fn get_profile(&self, id: Uuid) -> Result<Profile, CoreError> {
        let row = sqlx::query_as::<_, Profile>(
            r#"
            SELECT id, username, full_name, role, created_at, updated_at
            FROM profiles
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.ok_or(CoreError::NotFound)
    }

    async fn find_profile_by_username(&self, username: &str) -> Result<Option<Profile>, CoreError> {
        let row = sqlx::query_as::<_, Profile>(
            r#"
            SELECT id, username, full_name, role, created_at, updated_at
            FROM profiles
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_profiles(&self) -> Result<Vec<Profile>, CoreError> {
        let rows = sqlx::query_as::<_, Profile>(
            r#"
            SELECT id, username, full_name, role, created_at, updated_at
            FROM profiles
            ORDER BY username
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn insert_profile(&self, p: &Profile) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            INSERT INTO profiles (id, username, full_name, role, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(p.id)
        .bind(&p.username)
        .bind(&p.full_name)
        .bind(p.role)
        .bind(p.created_at)
        .bind(p.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_profile_data(
        &self,
        user_id: Uuid,
        full_name: Option<&str>,
        username: Option<&str>,
    ) -> Result<Profile, CoreError> {
        let row = sqlx::query_as::<_, Profile>(
            r#"
            UPDATE profiles
            SET full_name = COALESCE($2, full_name),
                username = COALESCE($3, username),
                updated_at = now()
            WHERE id = $1
            RETURNING id, username, full_name, role, created_at, updated_at
            "#,
        )
        .bind(user_id)
        .bind(full_name)
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        row.ok_or(CoreError::NotFound)
    }

    async fn insert_invite(&self, i: &InviteToken) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            INSERT INTO invite_tokens (id, token, created_by, expires_at, used_at, used_by)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(i.id)
        .bind(&i.token)
        .bind(i.created_by)
        .bind(i.expires_at)
        .bind(i.used_at)
        .bind(i.used_by)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_invite_by_token(&self, token: &str) -> Result<Option<InviteToken>, CoreError> {
        let row = sqlx::query_as::<_, InviteToken>(
            r#"
            SELECT id, token, created_by, expires_at, used_at, used_by
            FROM invite_tokens
            WHERE token = $1
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn mark_invite_used(
        &self,
        id: Uuid,
        used_at: DateTime<Utc>,
        used_by: Uuid,
    ) -> Result<(), CoreError> {
        let result = sqlx::query(
            r#"
            UPDATE invite_tokens
            SET used_at = $2, used_by = $3
            WHERE id = $1 AND used_at IS NULL
            "#,
        )
        .bind(id)
        .bind(used_at)
        .bind(used_by)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            // Ou não existe, ou outro registro consumiu primeiro.
            return Err(CoreError::Conflict("invite_tokens_used".into()));
        }
        Ok(())
    }

    async fn append_log(&self, entry: &NewSystemLog) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            INSERT INTO system_logs (id, action, table_name, record_id, old_data,
                                     new_data, user_name, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, now())
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&entry.action)
        .bind(&entry.table_name)
        .bind(&entry.record_id)
        .bind(&entry.old_data)
        .bind(&entry.new_data)
        .bind(&entry.user_name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_logs(&self) -> Result<Vec<SystemLog>, CoreError> {
        let rows = sqlx::query_as::<_, SystemLog>(
            r#"
            SELECT id, action, table_name, record_id, old_data, new_data,
                   user_name, created_at
            FROM system_logs
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

// src/models/budget.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "budget_status")]
pub enum BudgetStatus {
    #[serde(rename = "Pendente")]
    #[sqlx(rename = "Pendente")]
    Pendente,
    #[serde(rename = "Aprovado")]
    #[sqlx(rename = "Aprovado")]
    Aprovado,
    #[serde(rename = "Rejeitado")]
    #[sqlx(rename = "Rejeitado")]
    Rejeitado,
}

impl std::fmt::Display for BudgetStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            BudgetStatus::Pendente => "Pendente",
            BudgetStatus::Aprovado => "Aprovado",
            BudgetStatus::Rejeitado => "Rejeitado",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Budget {
    pub id: Uuid,
    pub mechanic_id: Uuid,

    // Gerado pelo servidor (generate_budget_number), nunca fabricado
    // pelo cliente.
    pub budget_number: String,

    pub customer_name: String,
    pub vehicle_name: Option<String>,
    pub vehicle_plate: Option<String>,

    // Invariante: final_amount == total_amount - discount_amount.
    // Verificado no pipeline de mutação, não no servidor.
    pub total_amount: Decimal,
    pub discount_amount: Option<Decimal>,
    pub final_amount: Decimal,

    pub status: BudgetStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Budget {
    pub fn arithmetic_holds(&self) -> bool {
        let discount = self.discount_amount.unwrap_or(Decimal::ZERO);
        (self.total_amount - discount - self.final_amount).abs() <= Decimal::new(1, 2)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct BudgetItem {
    pub id: Uuid,
    pub budget_id: Uuid,
    pub service_id: Option<Uuid>,
    pub service_name: String,
    pub service_category: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub total_price: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewBudgetItem {
    pub service_id: Option<Uuid>,
    #[validate(length(min = 1, message = "O nome do serviço é obrigatório."))]
    pub service_name: String,
    #[validate(length(min = 1, message = "A categoria do serviço é obrigatória."))]
    pub service_category: String,
    #[validate(range(min = 1, message = "A quantidade deve ser no mínimo 1."))]
    pub quantity: i32,
    pub unit_price: Decimal,
}

impl NewBudgetItem {
    // total_price = quantity × unit_price, sempre derivado, nunca
    // aceito de fora.
    pub fn total_price(&self) -> Decimal {
        Decimal::from(self.quantity) * self.unit_price
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewBudget {
    #[validate(length(min = 1, message = "O nome do cliente é obrigatório."))]
    pub customer_name: String,
    pub vehicle_name: Option<String>,
    pub vehicle_plate: Option<String>,
    pub total_amount: Decimal,
    pub discount_amount: Option<Decimal>,
    pub final_amount: Decimal,
}

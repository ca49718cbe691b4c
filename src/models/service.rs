// src/models/service.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

// Entrada do catálogo de serviços. Leitura frequente, escrita só
// por admin.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub id: Uuid,
    pub name: String,
    pub category: String,
    pub unit_price: Decimal,
    pub is_active: bool,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewService {
    #[validate(length(min = 1, message = "O nome do serviço é obrigatório."))]
    pub name: String,
    #[validate(length(min = 1, message = "A categoria é obrigatória."))]
    pub category: String,
    pub unit_price: Decimal,
    pub description: Option<String>,
}

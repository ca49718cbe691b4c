// src/models/checklist.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

// --- Enums (Mapeando o Postgres) ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "checklist_priority")]
pub enum Priority {
    #[serde(rename = "Baixa")]
    #[sqlx(rename = "Baixa")]
    Baixa,
    #[serde(rename = "Média")]
    #[sqlx(rename = "Média")]
    Media,
    #[serde(rename = "Alta")]
    #[sqlx(rename = "Alta")]
    Alta,
}

// Status do checklist. Apenas o módulo `workflow` tem permissão de
// construir um valor novo a partir de uma transição.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "checklist_status")]
pub enum ChecklistStatus {
    #[serde(rename = "Pendente")]
    #[sqlx(rename = "Pendente")]
    Pendente,
    #[serde(rename = "Em Andamento")]
    #[sqlx(rename = "Em Andamento")]
    EmAndamento,
    #[serde(rename = "Concluído")]
    #[sqlx(rename = "Concluído")]
    Concluido,
    #[serde(rename = "Cancelado")]
    #[sqlx(rename = "Cancelado")]
    Cancelado,
}

impl std::fmt::Display for ChecklistStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ChecklistStatus::Pendente => "Pendente",
            ChecklistStatus::EmAndamento => "Em Andamento",
            ChecklistStatus::Concluido => "Concluído",
            ChecklistStatus::Cancelado => "Cancelado",
        };
        f.write_str(label)
    }
}

// --- Structs ---

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Checklist {
    pub id: Uuid,
    pub mechanic_id: Uuid,
    pub vehicle_name: String,
    pub plate: String,
    pub customer_name: String,
    pub priority: Priority,
    pub status: ChecklistStatus,
    pub general_observations: Option<String>,

    // Uma URL única ou um array codificado em JSON; o core não
    // interpreta o conteúdo (upload de mídia é colaborador externo).
    pub video_url: Option<String>,

    // Preenchido exatamente na entrada em `Concluído`, nunca fora dela.
    pub completed_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistItem {
    pub id: Uuid,
    pub checklist_id: Uuid,
    pub category: String,
    pub item_name: String,
    pub checked: bool,
    pub observation: Option<String>,
}

// Item submetido num "replace children": a coleção inteira é trocada
// de uma vez (delete + reinsert), nunca remendada item a item.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewChecklistItem {
    #[validate(length(min = 1, message = "A categoria é obrigatória."))]
    pub category: String,
    #[validate(length(min = 1, message = "O nome do item é obrigatório."))]
    pub item_name: String,
    pub checked: bool,
    pub observation: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewChecklist {
    #[validate(length(min = 1, message = "O nome do veículo é obrigatório."))]
    pub vehicle_name: String,
    #[validate(length(min = 1, message = "A placa é obrigatória."))]
    pub plate: String,
    #[validate(length(min = 1, message = "O nome do cliente é obrigatório."))]
    pub customer_name: String,
    pub priority: Priority,
    pub general_observations: Option<String>,
    pub video_url: Option<String>,
}

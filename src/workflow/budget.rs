// src/workflow/budget.rs

use crate::{common::error::CoreError, models::auth::Role, models::budget::BudgetStatus};

fn allowed(current: BudgetStatus, requested: BudgetStatus) -> bool {
    use BudgetStatus::*;
    matches!((current, requested), (Pendente, Aprovado) | (Pendente, Rejeitado))
}

// Aprovar/rejeitar é decisão administrativa; mecânico nenhum
// transiciona orçamento, nem o próprio.
pub fn can_transition(current: BudgetStatus, requested: BudgetStatus, role: Role) -> bool {
    role.is_admin() && allowed(current, requested)
}

pub fn apply(current: BudgetStatus, requested: BudgetStatus, role: Role) -> Result<BudgetStatus, CoreError> {
    if !role.is_admin() {
        return Err(CoreError::PermissionDenied);
    }
    if !allowed(current, requested) {
        return Err(CoreError::PolicyViolation(format!(
            "orçamento não pode ir de '{}' para '{}'",
            current, requested
        )));
    }
    Ok(requested)
}

// Edição de conteúdo (valores, itens): só enquanto Pendente, e só pelo
// criador ou por um admin. Aprovado/Rejeitado são imutáveis.
pub fn ensure_editable(status: BudgetStatus, role: Role, is_creator: bool) -> Result<(), CoreError> {
    if !role.is_admin() && !is_creator {
        return Err(CoreError::PermissionDenied);
    }
    if status != BudgetStatus::Pendente {
        return Err(CoreError::PolicyViolation(format!(
            "orçamento '{}' não é mais editável",
            status
        )));
    }
    Ok(())
}

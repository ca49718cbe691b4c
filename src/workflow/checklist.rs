// src/workflow/checklist.rs

use chrono::{DateTime, Utc};

use crate::{common::error::CoreError, models::auth::Role, models::checklist::ChecklistStatus};

// Resultado de uma transição aceita. `completed_at` é preenchido
// exatamente na entrada em `Concluído` e em nenhum outro momento.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Applied {
    pub next: ChecklistStatus,
    pub completed_at: Option<DateTime<Utc>>,
}

// A tabela em si: Pendente → Em Andamento → Concluído, e qualquer
// estado → Cancelado. Só Cancelado é terminal.
fn allowed(current: ChecklistStatus, requested: ChecklistStatus) -> bool {
    use ChecklistStatus::*;
    matches!(
        (current, requested),
        (Pendente, EmAndamento)
            | (EmAndamento, Concluido)
            | (Pendente, Cancelado)
            | (EmAndamento, Cancelado)
            | (Concluido, Cancelado)
    )
}

pub fn can_transition(current: ChecklistStatus, requested: ChecklistStatus, role: Role, is_owner: bool) -> bool {
    (role.is_admin() || is_owner) && allowed(current, requested)
}

pub fn apply(
    current: ChecklistStatus,
    requested: ChecklistStatus,
    role: Role,
    is_owner: bool,
    now: DateTime<Utc>,
) -> Result<Applied, CoreError> {
    if !role.is_admin() && !is_owner {
        return Err(CoreError::PermissionDenied);
    }
    if !allowed(current, requested) {
        return Err(CoreError::PolicyViolation(format!(
            "checklist não pode ir de '{}' para '{}'",
            current, requested
        )));
    }
    let completed_at = match requested {
        ChecklistStatus::Concluido => Some(now),
        _ => None,
    };
    Ok(Applied { next: requested, completed_at })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ChecklistStatus::*;

    fn apply_owner(current: ChecklistStatus, requested: ChecklistStatus) -> Result<Applied, CoreError> {
        apply(current, requested, Role::Mechanic, true, Utc::now())
    }

    #[test]
    fn fluxo_feliz_ate_concluido() {
        let a = apply_owner(Pendente, EmAndamento).unwrap();
        assert_eq!(a.next, EmAndamento);
        assert!(a.completed_at.is_none());

        let b = apply_owner(EmAndamento, Concluido).unwrap();
        assert_eq!(b.next, Concluido);
        assert!(b.completed_at.is_some());
    }

    #[test]
    fn cancelamento_permitido_de_qualquer_estado_nao_cancelado() {
        assert!(apply_owner(Pendente, Cancelado).is_ok());
        assert!(apply_owner(EmAndamento, Cancelado).is_ok());
        // Um checklist já concluído ainda pode ser cancelado.
        assert!(apply_owner(Concluido, Cancelado).is_ok());
    }

    #[test]
    fn toda_transicao_fora_da_tabela_e_violacao() {
        let all = [Pendente, EmAndamento, Concluido, Cancelado];
        for current in all {
            for requested in all {
                if matches!(
                    (current, requested),
                    (Pendente, EmAndamento)
                        | (EmAndamento, Concluido)
                        | (Pendente, Cancelado)
                        | (EmAndamento, Cancelado)
                        | (Concluido, Cancelado)
                ) {
                    continue;
                }
                let result = apply_owner(current, requested);
                assert!(
                    matches!(result, Err(CoreError::PolicyViolation(_))),
                    "{:?} -> {:?} deveria ser violação",
                    current,
                    requested
                );
            }
        }
    }

    #[test]
    fn cancelado_e_o_unico_terminal() {
        assert!(apply_owner(Cancelado, Pendente).is_err());
        assert!(apply_owner(Cancelado, EmAndamento).is_err());
        assert!(apply_owner(Cancelado, Concluido).is_err());
        // Concluído não é terminal: ainda aceita cancelamento, e nada
        // além disso.
        assert!(apply_owner(Concluido, Cancelado).is_ok());
        assert!(apply_owner(Concluido, Pendente).is_err());
        assert!(apply_owner(Concluido, EmAndamento).is_err());
    }

    #[test]
    fn terceiro_sem_posse_e_sem_admin_nao_transiciona() {
        let result = apply(Pendente, EmAndamento, Role::Mechanic, false, Utc::now());
        assert!(matches!(result, Err(CoreError::PermissionDenied)));

        // Admin pode mesmo sem ser o dono.
        assert!(apply(Pendente, EmAndamento, Role::Admin, false, Utc::now()).is_ok());
    }

    #[test]
    fn completed_at_so_na_entrada_em_concluido() {
        assert!(apply_owner(Pendente, EmAndamento).unwrap().completed_at.is_none());
        assert!(apply_owner(Pendente, Cancelado).unwrap().completed_at.is_none());
        assert!(apply_owner(EmAndamento, Concluido).unwrap().completed_at.is_some());
    }
}

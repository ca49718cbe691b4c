// src/workflow/invite.rs

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{common::error::CoreError, models::invite::InviteToken};

// Estado derivado do token. "Expirado" nunca é persistido: é função
// pura de `expires_at` contra o relógio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InviteState {
    Active,
    Used,
    Expired,
}

pub fn evaluate(token: &InviteToken, now: DateTime<Utc>) -> InviteState {
    // Usado e expirado são ambos terminais; a ordem dos testes não
    // pode importar para o chamador (um token usado E vencido é
    // rejeitado de qualquer forma).
    if token.is_used() {
        InviteState::Used
    } else if token.is_expired_at(now) {
        InviteState::Expired
    } else {
        InviteState::Active
    }
}

// Campos gravados ao consumir um convite. O principal consumidor é
// conhecido no momento do registro e fica registrado em `used_by`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Consumed {
    pub used_at: DateTime<Utc>,
    pub used_by: Uuid,
}

pub fn consume(token: &InviteToken, now: DateTime<Utc>, used_by: Uuid) -> Result<Consumed, CoreError> {
    match evaluate(token, now) {
        InviteState::Active => Ok(Consumed { used_at: now, used_by }),
        InviteState::Used => Err(CoreError::PolicyViolation("convite já utilizado".into())),
        InviteState::Expired => Err(CoreError::PolicyViolation("convite expirado".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn token(used_at: Option<DateTime<Utc>>, expires_at: DateTime<Utc>) -> InviteToken {
        InviteToken {
            id: Uuid::new_v4(),
            token: "abc123".into(),
            created_by: Uuid::new_v4(),
            expires_at,
            used_at,
            used_by: None,
        }
    }

    #[test]
    fn token_ativo_e_consumido_uma_vez() {
        let now = Utc::now();
        let t = token(None, now + Duration::hours(1));
        let who = Uuid::new_v4();

        let consumed = consume(&t, now, who).unwrap();
        assert_eq!(consumed.used_by, who);
        assert_eq!(consumed.used_at, now);
    }

    #[test]
    fn expirado_e_rejeitado_mesmo_sem_uso() {
        let now = Utc::now();
        let t = token(None, now - Duration::minutes(1));
        assert_eq!(evaluate(&t, now), InviteState::Expired);
        assert!(matches!(consume(&t, now, Uuid::new_v4()), Err(CoreError::PolicyViolation(_))));
    }

    #[test]
    fn usado_e_rejeitado_mesmo_dentro_da_validade() {
        let now = Utc::now();
        let t = token(Some(now - Duration::hours(2)), now + Duration::hours(1));
        assert_eq!(evaluate(&t, now), InviteState::Used);
        assert!(matches!(consume(&t, now, Uuid::new_v4()), Err(CoreError::PolicyViolation(_))));
    }

    #[test]
    fn usado_e_expirado_ao_mesmo_tempo_continua_rejeitado() {
        let now = Utc::now();
        let t = token(Some(now - Duration::hours(2)), now - Duration::hours(1));
        assert!(consume(&t, now, Uuid::new_v4()).is_err());
    }
}

// tests/invite_registration.rs


use chrono::{Duration, Utc};
use oficina_core::common::error::CoreError;
use oficina_core::models::auth::{RegisterPayload, Role};
use oficina_core::models::InviteToken;
use oficina_core::store::RemoteStore;
use uuid::Uuid;

use test_support::new_core;

fn payload(username: &str, token: &str) -> RegisterPayload {
    RegisterPayload {
        username: username.to_string(),
        password: "senha123".to_string(),
        full_name: "Carlos Pereira".to_string(),
        invite_token: token.to_string(),
    }
}

#[tokio::test]
async fn registro_via_convite_grava_quem_consumiu() {
    let core = new_core().await;
    let invite = core
        .state
        .invites
        .create_invite(&core.admin, Duration::hours(24))
        .await
        .expect("emitir convite");

    let new_profile = core
        .state
        .invites
        .register(payload("carlos", &invite.token))
        .await
        .expect("registrar");
    assert_eq!(new_profile.role, Role::Mechanic);
    assert_eq!(new_profile.username, "carlos");

    let stored = core
        .store
        .find_invite_by_token(&invite.token)
        .await
        .expect("buscar convite")
        .expect("convite existe");
    assert!(stored.used_at.is_some());
    assert_eq!(stored.used_by, Some(new_profile.id));

    // A credencial criada funciona de ponta a ponta.
    let session = core
        .state
        .session
        .sign_in("carlos", "senha123")
        .await
        .expect("sign-in do recém-registrado");
    assert_eq!(session.user_id, new_profile.id);
}

#[tokio::test]
async fn convite_expirado_e_recusado_mesmo_sem_uso() {
    let core = new_core().await;
    let invite = InviteToken {
        id: Uuid::new_v4(),
        token: "vencido".into(),
        created_by: core.admin.id,
        expires_at: Utc::now() - Duration::hours(1),
        used_at: None,
        used_by: None,
    };
    core.store.seed_invite(invite).await;

    let err = core
        .state
        .invites
        .register(payload("carlos", "vencido"))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::PolicyViolation(_)));
}

#[tokio::test]
async fn convite_usado_e_recusado_mesmo_dentro_da_validade() {
    let core = new_core().await;
    let invite = InviteToken {
        id: Uuid::new_v4(),
        token: "usado".into(),
        created_by: core.admin.id,
        expires_at: Utc::now() + Duration::hours(24),
        used_at: Some(Utc::now() - Duration::hours(1)),
        used_by: Some(Uuid::new_v4()),
    };
    core.store.seed_invite(invite).await;

    let err = core
        .state
        .invites
        .register(payload("carlos", "usado"))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::PolicyViolation(_)));
}

#[tokio::test]
async fn segundo_registro_com_o_mesmo_convite_falha() {
    let core = new_core().await;
    let invite = core
        .state
        .invites
        .create_invite(&core.admin, Duration::hours(24))
        .await
        .expect("emitir convite");

    core.state
        .invites
        .register(payload("carlos", &invite.token))
        .await
        .expect("primeiro registro");
    let err = core
        .state
        .invites
        .register(payload("pedro", &invite.token))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::PolicyViolation(_)));
}

#[tokio::test]
async fn token_desconhecido_volta_not_found() {
    let core = new_core().await;

    let err = core
        .state
        .invites
        .register(payload("carlos", "nao-existe"))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NotFound));
}

#[tokio::test]
async fn so_admin_emite_convite() {
    let core = new_core().await;

    let err = core
        .state
        .invites
        .create_invite(&core.mechanic, Duration::hours(24))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::PermissionDenied));
}

#[tokio::test]
async fn username_duplicado_nao_queima_o_convite() {
    let core = new_core().await;
    let invite = core
        .state
        .invites
        .create_invite(&core.admin, Duration::hours(24))
        .await
        .expect("emitir convite");

    // "maria" já existe: o registro falha com Conflict ANTES de marcar
    // o convite, que segue consumível.
    let err = core
        .state
        .invites
        .register(payload("maria", &invite.token))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Conflict(_)));

    let stored = core
        .store
        .find_invite_by_token(&invite.token)
        .await
        .expect("buscar convite")
        .expect("convite existe");
    assert!(stored.used_at.is_none());

    core.state
        .invites
        .register(payload("carlos", &invite.token))
        .await
        .expect("registro com username livre");
}

#[tokio::test]
async fn payload_invalido_nem_consulta_o_convite() {
    let core = new_core().await;

    let err = core
        .state
        .invites
        .register(payload("ab", "qualquer"))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));
    assert_eq!(core.store.read_count("find_invite_by_token").await, 0);
}

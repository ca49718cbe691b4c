// tests/admin_service.rs


use oficina_core::common::error::CoreError;
use oficina_core::store::RemoteStore;

use test_support::{new_core, MECHANIC_PASSWORD};

#[tokio::test]
async fn papel_do_chamador_e_reverificado_no_servidor() {
    let core = new_core().await;

    // O mecânico chama a operação privilegiada com o próprio id; o
    // papel vem do armazenamento, não do que o chamador alega.
    let err = core
        .state
        .admin
        .update_user_password(core.mechanic.id, core.mechanic.id, "nova-senha")
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::PermissionDenied));
}

#[tokio::test]
async fn troca_de_senha_vale_na_proxima_autenticacao() {
    let core = new_core().await;

    core.state
        .admin
        .update_user_password(core.admin.id, core.mechanic.id, "senha-nova-123")
        .await
        .expect("redefinir senha");

    let err = core
        .state
        .session
        .sign_in("maria", MECHANIC_PASSWORD)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidCredentials));
    core.state
        .session
        .sign_in("maria", "senha-nova-123")
        .await
        .expect("sign-in com a nova senha");
}

#[tokio::test]
async fn senha_curta_e_recusada() {
    let core = new_core().await;

    let err = core
        .state
        .admin
        .update_user_password(core.admin.id, core.mechanic.id, "abc")
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::PolicyViolation(_)));
}

#[tokio::test]
async fn auditoria_da_troca_de_senha_nunca_grava_a_senha() {
    let core = new_core().await;

    core.state
        .admin
        .update_user_password(core.admin.id, core.mechanic.id, "senha-nova-123")
        .await
        .expect("redefinir senha");

    let logs = core.store.list_logs().await.expect("logs");
    let entry = logs
        .iter()
        .find(|l| l.table_name == "auth_credentials")
        .expect("entrada de auditoria");
    let dumped = serde_json::to_string(entry).expect("serializar");
    assert!(!dumped.contains("senha-nova-123"));
}

#[tokio::test]
async fn edicao_de_usuario_atualiza_o_perfil() {
    let core = new_core().await;

    let updated = core
        .state
        .admin
        .update_user_data(core.admin.id, core.mechanic.id, Some("Maria Souza"), None)
        .await
        .expect("editar usuário");
    assert_eq!(updated.full_name, "Maria Souza");
    assert_eq!(updated.username, core.mechanic.username);
}

#[tokio::test]
async fn username_duplicado_volta_como_conflict() {
    let core = new_core().await;

    let err = core
        .state
        .admin
        .update_user_data(core.admin.id, core.mechanic.id, None, Some("chefe"))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Conflict(_)));
}

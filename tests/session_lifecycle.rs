// tests/session_lifecycle.rs


use std::time::Duration;

use oficina_core::common::error::CoreError;
use oficina_core::realtime::ChannelSpec;
use oficina_core::session::{SessionState, SessionStore};
use oficina_core::store::Table;

use test_support::{new_core, new_core_with_session_ttl, profile, reassemble, MECHANIC_PASSWORD};

#[tokio::test]
async fn sign_in_resolve_o_username_e_autentica() {
    let core = new_core().await;

    let session = core
        .state
        .session
        .sign_in("maria", MECHANIC_PASSWORD)
        .await
        .expect("sign-in do mecânico");
    assert_eq!(session.user_id, core.mechanic.id);

    assert!(matches!(core.state.session.state().await, SessionState::Authenticated(_)));
    let resolved = core.state.session.profile().await.expect("perfil em cache");
    assert_eq!(resolved.id, core.mechanic.id);
}

#[tokio::test]
async fn senha_errada_volta_como_credencial_invalida() {
    let core = new_core().await;

    let err = core
        .state
        .session
        .sign_in("maria", "senha-errada")
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidCredentials));
    assert!(matches!(core.state.session.state().await, SessionState::Unknown));
}

#[tokio::test]
async fn usuario_inexistente_volta_como_not_found() {
    let core = new_core().await;

    let err = core
        .state
        .session
        .sign_in("ninguem", MECHANIC_PASSWORD)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NotFound));
}

#[tokio::test]
async fn sign_out_e_idempotente_e_fecha_todos_os_canais() {
    let core = new_core().await;
    core.state
        .session
        .sign_in("maria", MECHANIC_PASSWORD)
        .await
        .expect("sign-in");

    let _sub_a = core.state.subscriber.subscribe(ChannelSpec::table(Table::Budgets));
    let _sub_b = core.state.subscriber.subscribe(ChannelSpec::table(Table::Checklists));
    assert_eq!(core.state.subscriber.open_channel_count(), 2);

    core.state.session.sign_out().await;
    assert!(matches!(core.state.session.state().await, SessionState::Unknown));
    assert!(core.state.session.profile().await.is_none());
    assert_eq!(core.state.subscriber.open_channel_count(), 0);
    assert!(core.session_store.load().await.expect("load").is_none());

    // Segundo sign-out: mesmo estado final, nenhum pânico, nenhum
    // efeito extra.
    core.state.session.sign_out().await;
    assert!(matches!(core.state.session.state().await, SessionState::Unknown));
    assert_eq!(core.state.subscriber.open_channel_count(), 0);
}

#[tokio::test]
async fn sign_out_com_falha_remota_ainda_limpa_o_estado_local() {
    let core = new_core().await;
    core.state
        .session
        .sign_in("maria", MECHANIC_PASSWORD)
        .await
        .expect("sign-in");

    core.gateway.fail_invalidate();
    core.state.session.sign_out().await;

    assert!(matches!(core.state.session.state().await, SessionState::Unknown));
    assert!(core.session_store.load().await.expect("load").is_none());
}

#[tokio::test]
async fn restore_sem_credencial_persistida_fica_em_unknown() {
    let core = new_core().await;

    let state = core.state.session.restore().await.expect("restore");
    assert!(matches!(state, SessionState::Unknown));
}

#[tokio::test]
async fn restore_revalida_a_credencial_persistida_de_um_processo_anterior() {
    let core = new_core().await;
    core.state
        .session
        .sign_in("maria", MECHANIC_PASSWORD)
        .await
        .expect("sign-in");

    // "Novo processo": mesmo session store, grafo novo.
    let reborn = reassemble(&core);
    let state = reborn.session.restore().await.expect("restore");

    let SessionState::Authenticated(session) = state else {
        panic!("esperava sessão restaurada, veio {:?}", reborn.session.state().await);
    };
    assert_eq!(session.user_id, core.mechanic.id);
    let resolved = reborn.session.profile().await.expect("perfil resolvido");
    assert_eq!(resolved.id, core.mechanic.id);
}

#[tokio::test]
async fn restore_com_credencial_recusada_limpa_e_fica_em_unknown() {
    let core = new_core().await;
    core.state
        .session
        .sign_in("maria", MECHANIC_PASSWORD)
        .await
        .expect("sign-in");

    let reborn = reassemble(&core);
    core.gateway.fail_refresh();
    let state = reborn.session.restore().await.expect("restore");

    assert!(matches!(state, SessionState::Unknown));
    assert!(core.session_store.load().await.expect("load").is_none());
}

#[tokio::test]
async fn resolucao_de_perfil_tolera_chegada_atrasada() {
    let core = new_core().await;
    let late = profile("atrasado", oficina_core::models::auth::Role::Mechanic);
    let late_id = late.id;

    // O perfil só aparece no armazenamento depois da primeira
    // tentativa; o retry com backoff deve encontrá-lo.
    let store = core.store.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(120)).await;
        store.seed_profile(late).await;
    });

    let resolved = core
        .state
        .session
        .resolve_profile(late_id)
        .await
        .expect("perfil resolvido após retry");
    assert_eq!(resolved.id, late_id);
}

#[tokio::test]
async fn renovacao_silenciosa_estende_a_sessao_antes_de_expirar() {
    // TTL de 61s contra margem de 60s: a renovação dispara em ~1s.
    let core = new_core_with_session_ttl(chrono::Duration::seconds(61)).await;
    let first = core
        .state
        .session
        .sign_in("maria", MECHANIC_PASSWORD)
        .await
        .expect("sign-in");

    tokio::time::sleep(Duration::from_secs(2)).await;

    let state = core.state.session.state().await;
    let renewed = state.session().cloned().expect("sessão segue ativa");
    assert!(renewed.expires_at > first.expires_at);
    assert_ne!(renewed.access_token, first.access_token);

    // A credencial renovada também foi persistida.
    let persisted = core
        .session_store
        .load()
        .await
        .expect("load")
        .expect("sessão persistida");
    assert_eq!(persisted.access_token, renewed.access_token);
}

#[tokio::test]
async fn renovacao_recusada_expira_a_sessao_e_fecha_os_canais() {
    let core = new_core_with_session_ttl(chrono::Duration::seconds(61)).await;
    core.state
        .session
        .sign_in("maria", MECHANIC_PASSWORD)
        .await
        .expect("sign-in");
    let _sub = core.state.subscriber.subscribe(ChannelSpec::table(Table::Budgets));
    assert_eq!(core.state.subscriber.open_channel_count(), 1);

    core.gateway.fail_refresh();
    tokio::time::sleep(Duration::from_secs(2)).await;

    assert!(matches!(core.state.session.state().await, SessionState::Expired));
    assert_eq!(core.state.subscriber.open_channel_count(), 0);
    assert!(core.session_store.load().await.expect("load").is_none());
    assert!(core.state.session.profile().await.is_none());

    // A superfície reconhece a expiração e volta ao estado deslogado.
    core.state.session.acknowledge_expiry().await;
    assert!(matches!(core.state.session.state().await, SessionState::Unknown));
}

#[tokio::test]
async fn acknowledge_expiry_so_sai_de_expired() {
    let core = new_core().await;

    // Em Unknown o reconhecimento não muda nada.
    core.state.session.acknowledge_expiry().await;
    assert!(matches!(core.state.session.state().await, SessionState::Unknown));
}

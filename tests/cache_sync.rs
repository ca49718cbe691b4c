// tests/cache_sync.rs


use std::time::Duration;

use oficina_core::cache::{EntryState, QueryKey};
use oficina_core::common::error::CoreError;
use oficina_core::realtime::{ChannelSpec, FeedOp, FeedPayload};
use oficina_core::store::Table;
use rust_decimal::Decimal;
use uuid::Uuid;

use test_support::{budget_item, new_budget, new_core, new_core_with_timeout};

fn budgets_key() -> QueryKey {
    QueryKey::Budgets { mechanic: None }
}

#[tokio::test]
async fn leitores_concorrentes_compartilham_uma_unica_busca() {
    let core = new_core().await;
    core.store.set_read_delay(Duration::from_millis(100)).await;

    let mut handles = Vec::new();
    for _ in 0..5 {
        let cache = core.state.cache.clone();
        handles.push(tokio::spawn(async move { cache.read(&budgets_key()).await }));
    }
    for handle in handles {
        handle.await.expect("tarefa").expect("leitura");
    }

    // Cinco leitores, uma ida ao armazenamento.
    assert_eq!(core.store.read_count("list_budgets").await, 1);
    assert_eq!(core.state.cache.state_of(&budgets_key()).await, Some(EntryState::Fresh));
}

#[tokio::test]
async fn marca_otimista_durante_busca_em_voo_nao_se_perde() {
    let core = new_core().await;
    core.store.set_read_delay(Duration::from_millis(300)).await;

    let cache = core.state.cache.clone();
    let reader = tokio::spawn(async move { cache.read(&budgets_key()).await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Escrita no meio da busca: a marca otimista do pipeline chega
    // enquanto a entrada está Loading.
    let amount = Decimal::new(7_000, 2);
    core.state
        .mutations
        .create_budget(
            &core.mechanic,
            new_budget(amount, None, amount),
            vec![budget_item("Troca de óleo", 1, amount)],
        )
        .await
        .expect("criar orçamento");

    reader.await.expect("tarefa").expect("leitura");

    // O snapshot devolvido pode ser anterior à escrita: a entrada não
    // pode se passar por Fresh.
    assert_eq!(core.state.cache.state_of(&budgets_key()).await, Some(EntryState::Stale));
}

#[tokio::test]
async fn leitura_fresca_nao_volta_ao_armazenamento() {
    let core = new_core().await;

    core.state.cache.read(&budgets_key()).await.expect("primeira leitura");
    core.state.cache.read(&budgets_key()).await.expect("segunda leitura");

    assert_eq!(core.store.read_count("list_budgets").await, 1);
}

#[tokio::test]
async fn busca_lenta_termina_em_timed_out_e_nao_em_loading() {
    let core = new_core_with_timeout(Duration::from_millis(50)).await;
    core.store.set_read_delay(Duration::from_millis(200)).await;

    let err = core.state.cache.read(&budgets_key()).await.unwrap_err();
    assert!(matches!(err, CoreError::TimedOut));
    assert_eq!(core.state.cache.state_of(&budgets_key()).await, Some(EntryState::TimedOut));
}

#[tokio::test]
async fn busca_que_falha_deixa_a_entrada_obsoleta() {
    let core = new_core().await;
    core.store.fail_next_with(CoreError::Network).await;

    let err = core.state.cache.read(&budgets_key()).await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(core.state.cache.state_of(&budgets_key()).await, Some(EntryState::Stale));

    // A próxima leitura re-busca e recupera.
    core.state.cache.read(&budgets_key()).await.expect("retry");
    assert_eq!(core.state.cache.state_of(&budgets_key()).await, Some(EntryState::Fresh));
}

#[tokio::test]
async fn evento_do_feed_invalida_tambem_as_consultas_relacionadas() {
    let core = new_core().await;
    core.state.cache.read(&budgets_key()).await.expect("leitura");
    assert_eq!(core.state.cache.state_of(&budgets_key()).await, Some(EntryState::Fresh));

    let subscription = core
        .state
        .subscriber
        .subscribe(ChannelSpec::table(Table::BudgetItems));
    let _driver = core.state.coordinator.drive(subscription);
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Mudança num ITEM de orçamento: a lista de orçamentos exibe
    // totais derivados, então ela também fica obsoleta.
    core.transport
        .emit(FeedPayload {
            event: FeedOp::Insert,
            schema: "public".into(),
            table: "budget_items".into(),
            record: Some(serde_json::json!({ "id": Uuid::new_v4().to_string() })),
            old_record: None,
        })
        .await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(core.state.cache.state_of(&budgets_key()).await, Some(EntryState::Stale));
}

#[tokio::test]
async fn queda_do_transporte_vira_invalidacao_total_apos_reconectar() {
    let core = new_core().await;
    core.state.cache.read(&budgets_key()).await.expect("leitura");
    core.state
        .cache
        .read(&QueryKey::Services { only_active: true })
        .await
        .expect("leitura");

    let subscription = core
        .state
        .subscriber
        .subscribe(ChannelSpec::table(Table::Budgets));
    let _driver = core.state.coordinator.drive(subscription);
    tokio::time::sleep(Duration::from_millis(50)).await;

    core.transport.drop_channels();
    // Backoff base de 500ms até a reconexão anunciar Resync.
    tokio::time::sleep(Duration::from_millis(800)).await;

    assert_eq!(core.state.cache.state_of(&budgets_key()).await, Some(EntryState::Stale));
    assert_eq!(
        core.state
            .cache
            .state_of(&QueryKey::Services { only_active: true })
            .await,
        Some(EntryState::Stale)
    );
}

#[tokio::test]
async fn marcar_obsoleto_e_idempotente() {
    let core = new_core().await;
    core.state.cache.read(&budgets_key()).await.expect("leitura");

    core.state.cache.mark_table_stale(Table::Budgets).await;
    core.state.cache.mark_table_stale(Table::Budgets).await;
    assert_eq!(core.state.cache.state_of(&budgets_key()).await, Some(EntryState::Stale));

    // Uma única re-busca resolve a marca dupla.
    core.state.cache.read(&budgets_key()).await.expect("re-busca");
    assert_eq!(core.store.read_count("list_budgets").await, 2);
}

#[tokio::test]
async fn tabela_sem_dependentes_nao_invalida_nada() {
    let core = new_core().await;
    core.state.cache.read(&budgets_key()).await.expect("leitura");

    core.state.cache.mark_table_stale(Table::Checklists).await;
    assert_eq!(core.state.cache.state_of(&budgets_key()).await, Some(EntryState::Fresh));
}

#[tokio::test]
async fn foco_recuperado_rebusca_somente_o_obsoleto() {
    let core = new_core().await;
    core.state.cache.read(&budgets_key()).await.expect("orçamentos");
    core.state
        .cache
        .read(&QueryKey::Services { only_active: true })
        .await
        .expect("serviços");

    core.state.cache.mark_table_stale(Table::Services).await;
    core.state.cache.on_focus_regained().await;

    assert_eq!(
        core.state
            .cache
            .state_of(&QueryKey::Services { only_active: true })
            .await,
        Some(EntryState::Fresh)
    );
    // Serviços re-buscado; orçamentos continuou fresco e intocado.
    assert_eq!(core.store.read_count("list_services").await, 2);
    assert_eq!(core.store.read_count("list_budgets").await, 1);
}

// tests/realtime_channels.rs


use std::time::Duration;

use oficina_core::realtime::{ChannelSpec, FeedMessage, FeedOp, FeedPayload};
use oficina_core::store::Table;
use uuid::Uuid;

use test_support::new_core;

fn insert_payload(table: &str, id: Uuid) -> FeedPayload {
    FeedPayload {
        event: FeedOp::Insert,
        schema: "public".into(),
        table: table.into(),
        record: Some(serde_json::json!({ "id": id.to_string() })),
        old_record: None,
    }
}

#[tokio::test]
async fn assinaturas_identicas_compartilham_um_unico_canal() {
    let core = new_core().await;
    let spec = ChannelSpec::table(Table::Budgets);

    let sub_a = core.state.subscriber.subscribe(spec.clone());
    let sub_b = core.state.subscriber.subscribe(spec.clone());
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(core.state.subscriber.open_channel_count(), 1);
    assert_eq!(core.transport.connect_count(&spec), 1);

    // O canal sobrevive enquanto restar um consumidor.
    drop(sub_a);
    assert_eq!(core.state.subscriber.open_channel_count(), 1);
    drop(sub_b);
    assert_eq!(core.state.subscriber.open_channel_count(), 0);
}

#[tokio::test]
async fn filtros_diferentes_abrem_canais_diferentes() {
    let core = new_core().await;
    let unfiltered = ChannelSpec::table(Table::Checklists);
    let filtered = ChannelSpec {
        table: Table::Checklists,
        filter: Some(format!("mechanic_id={}", Uuid::new_v4())),
    };

    let _sub_a = core.state.subscriber.subscribe(unfiltered.clone());
    let _sub_b = core.state.subscriber.subscribe(filtered.clone());
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(core.state.subscriber.open_channel_count(), 2);
    assert_eq!(core.transport.connect_count(&unfiltered), 1);
    assert_eq!(core.transport.connect_count(&filtered), 1);
}

#[tokio::test]
async fn todos_os_consumidores_recebem_o_evento_normalizado() {
    let core = new_core().await;
    let spec = ChannelSpec::table(Table::Budgets);
    let mut sub_a = core.state.subscriber.subscribe(spec.clone());
    let mut sub_b = core.state.subscriber.subscribe(spec);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let id = Uuid::new_v4();
    core.transport.emit(insert_payload("budgets", id)).await;

    for sub in [&mut sub_a, &mut sub_b] {
        let msg = tokio::time::timeout(Duration::from_secs(1), sub.recv())
            .await
            .expect("evento dentro do prazo")
            .expect("canal aberto");
        let FeedMessage::Change(event) = msg else {
            panic!("esperava Change, veio {msg:?}");
        };
        assert_eq!(event.op, FeedOp::Insert);
        assert_eq!(event.table, Table::Budgets);
        assert_eq!(event.key, Some(id));
    }
}

#[tokio::test]
async fn payload_sem_registro_normaliza_sem_chave() {
    let core = new_core().await;
    let mut sub = core.state.subscriber.subscribe(ChannelSpec::table(Table::Budgets));
    tokio::time::sleep(Duration::from_millis(50)).await;

    core.transport
        .emit(FeedPayload {
            event: FeedOp::Update,
            schema: "public".into(),
            table: "budgets".into(),
            record: None,
            old_record: None,
        })
        .await;

    let msg = tokio::time::timeout(Duration::from_secs(1), sub.recv())
        .await
        .expect("prazo")
        .expect("canal aberto");
    assert!(matches!(msg, FeedMessage::Change(e) if e.key.is_none()));
}

#[tokio::test]
async fn fechar_tudo_encerra_os_consumidores() {
    let core = new_core().await;
    let mut sub = core.state.subscriber.subscribe(ChannelSpec::table(Table::Budgets));
    tokio::time::sleep(Duration::from_millis(50)).await;

    core.state.subscriber.close_all();
    assert_eq!(core.state.subscriber.open_channel_count(), 0);

    let msg = tokio::time::timeout(Duration::from_secs(1), sub.recv())
        .await
        .expect("prazo");
    assert!(msg.is_none());
}

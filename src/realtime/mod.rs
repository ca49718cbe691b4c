// src/realtime/mod.rs

pub mod memory;
pub mod pg;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::{common::error::CoreError, store::Table};

const BROADCAST_CAPACITY: usize = 256;
const RECONNECT_BASE: Duration = Duration::from_millis(500);
const RECONNECT_MAX: Duration = Duration::from_secs(30);

// --- Formato de fio do feed (§ protocolo consumido) ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedOp {
    Insert,
    Update,
    Delete,
}

// Payload bruto empurrado pelo servidor. O core só usa `table` e a
// presença da chave; `record` nunca é confiado para campos derivados.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedPayload {
    pub event: FeedOp,
    pub schema: String,
    pub table: String,
    pub record: Option<serde_json::Value>,
    pub old_record: Option<serde_json::Value>,
}

// --- Forma única de evento entregue aos consumidores ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeEvent {
    pub op: FeedOp,
    pub table: Table,
    pub key: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedMessage {
    Change(ChangeEvent),
    // O transporte caiu e foi reaberto (ou o consumidor perdeu
    // eventos): mudanças desconhecidas ocorreram, invalide tudo.
    Resync,
}

// Normaliza o payload heterogêneo no formato único. Só extrai a chave;
// o conteúdo do registro é deliberadamente ignorado.
fn normalize(payload: &FeedPayload) -> Option<ChangeEvent> {
    let table = Table::parse(&payload.table)?;
    let key = payload
        .record
        .as_ref()
        .or(payload.old_record.as_ref())
        .and_then(|r| r.get("id"))
        .and_then(|v| v.as_str())
        .and_then(|s| Uuid::parse_str(s).ok());
    Some(ChangeEvent { op: payload.event, table, key })
}

// Identidade de um canal: tabela + filtro opcional. Assinaturas com a
// mesma identidade compartilham um único canal de rede.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelSpec {
    pub table: Table,
    pub filter: Option<String>,
}

impl ChannelSpec {
    pub fn table(table: Table) -> Self {
        Self { table, filter: None }
    }
}

// Transporte subjacente (produção: LISTEN/NOTIFY; testes: memória).
#[async_trait]
pub trait ChangeFeedTransport: Send + Sync {
    async fn connect(&self, spec: &ChannelSpec) -> Result<mpsc::Receiver<FeedPayload>, CoreError>;
}

struct ChannelEntry {
    consumers: usize,
    tx: broadcast::Sender<FeedMessage>,
    task: JoinHandle<()>,
}

struct Inner {
    transport: Arc<dyn ChangeFeedTransport>,
    channels: Mutex<HashMap<ChannelSpec, ChannelEntry>>,
}

impl Inner {
    fn release(&self, spec: &ChannelSpec) {
        let mut channels = self.channels.lock().expect("mapa de canais envenenado");
        if let Some(entry) = channels.get_mut(spec) {
            entry.consumers -= 1;
            if entry.consumers == 0 {
                // Último consumidor saiu: o canal de rede fecha junto.
                // Canal vazado é defeito, não detalhe.
                let entry = channels.remove(spec).expect("canal sumiu sob o lock");
                entry.task.abort();
                tracing::debug!("📡 canal {} fechado (sem consumidores)", spec.table);
            }
        }
    }
}

// Assinante central do feed de mudanças: deduplica canais por
// identidade, reconecta com backoff limitado e transforma reconexão
// em invalidação total.
#[derive(Clone)]
pub struct ChangeFeedSubscriber {
    inner: Arc<Inner>,
}

impl ChangeFeedSubscriber {
    pub fn new(transport: Arc<dyn ChangeFeedTransport>) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                channels: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn subscribe(&self, spec: ChannelSpec) -> Subscription {
        let mut channels = self.inner.channels.lock().expect("mapa de canais envenenado");
        if let Some(entry) = channels.get_mut(&spec) {
            entry.consumers += 1;
            return Subscription {
                spec,
                rx: entry.tx.subscribe(),
                inner: Arc::clone(&self.inner),
            };
        }

        let (tx, rx) = broadcast::channel(BROADCAST_CAPACITY);
        let task = tokio::spawn(run_channel(
            Arc::clone(&self.inner.transport),
            spec.clone(),
            tx.clone(),
        ));
        channels.insert(spec.clone(), ChannelEntry { consumers: 1, tx, task });
        Subscription { spec, rx, inner: Arc::clone(&self.inner) }
    }

    // Derruba todos os canais abertos. Usado no sign-out: nenhuma
    // assinatura pode sobreviver à sessão.
    pub fn close_all(&self) {
        let mut channels = self.inner.channels.lock().expect("mapa de canais envenenado");
        for (_, entry) in channels.drain() {
            entry.task.abort();
        }
    }

    pub fn open_channel_count(&self) -> usize {
        self.inner.channels.lock().expect("mapa de canais envenenado").len()
    }
}

// Laço de vida de um canal: conecta, encaminha eventos normalizados,
// e ao cair reconecta com backoff, anunciando Resync porque não se
// sabe o que mudou enquanto estivemos fora.
async fn run_channel(
    transport: Arc<dyn ChangeFeedTransport>,
    spec: ChannelSpec,
    tx: broadcast::Sender<FeedMessage>,
) {
    let mut first_connect = true;
    let mut delay = RECONNECT_BASE;
    loop {
        match transport.connect(&spec).await {
            Ok(mut payloads) => {
                if !first_connect {
                    let _ = tx.send(FeedMessage::Resync);
                }
                first_connect = false;
                delay = RECONNECT_BASE;
                while let Some(payload) = payloads.recv().await {
                    if let Some(event) = normalize(&payload) {
                        let _ = tx.send(FeedMessage::Change(event));
                    }
                }
                tracing::warn!("📡 canal {} caiu; tentando reabrir", spec.table);
            }
            Err(err) => {
                tracing::warn!("📡 falha ao abrir canal {}: {}", spec.table, err);
            }
        }
        tokio::time::sleep(delay).await;
        delay = (delay * 2).min(RECONNECT_MAX);
    }
}

// Uma assinatura viva. Soltá-la devolve o consumidor ao contador do
// canal; o último a sair apaga a luz.
pub struct Subscription {
    spec: ChannelSpec,
    rx: broadcast::Receiver<FeedMessage>,
    inner: Arc<Inner>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<FeedMessage> {
        match self.rx.recv().await {
            Ok(msg) => Some(msg),
            // Consumidor lento perdeu eventos: equivalente a uma
            // desconexão, trate como mudanças desconhecidas.
            Err(broadcast::error::RecvError::Lagged(_)) => Some(FeedMessage::Resync),
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }

    pub fn spec(&self) -> &ChannelSpec {
        &self.spec
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.inner.release(&self.spec);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normaliza_payload_de_insert() {
        let id = Uuid::new_v4();
        let payload = FeedPayload {
            event: FeedOp::Insert,
            schema: "public".into(),
            table: "budgets".into(),
            record: Some(serde_json::json!({ "id": id.to_string(), "final_amount": "150.00" })),
            old_record: None,
        };
        let event = normalize(&payload).unwrap();
        assert_eq!(event.op, FeedOp::Insert);
        assert_eq!(event.table, Table::Budgets);
        assert_eq!(event.key, Some(id));
    }

    #[test]
    fn delete_usa_old_record_para_a_chave() {
        let id = Uuid::new_v4();
        let payload = FeedPayload {
            event: FeedOp::Delete,
            schema: "public".into(),
            table: "checklists".into(),
            record: None,
            old_record: Some(serde_json::json!({ "id": id.to_string() })),
        };
        let event = normalize(&payload).unwrap();
        assert_eq!(event.key, Some(id));
    }

    #[test]
    fn tabela_desconhecida_e_descartada() {
        let payload = FeedPayload {
            event: FeedOp::Update,
            schema: "public".into(),
            table: "tabela_misteriosa".into(),
            record: None,
            old_record: None,
        };
        assert!(normalize(&payload).is_none());
    }
}

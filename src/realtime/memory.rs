// src/realtime/memory.rs

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{
    common::error::CoreError,
    realtime::{ChangeFeedTransport, ChannelSpec, FeedPayload},
};

// Transporte de feed em memória para testes: o teste publica payloads
// e pode derrubar os canais para simular queda do transporte.
#[derive(Default)]
pub struct MemoryTransport {
    senders: Mutex<HashMap<ChannelSpec, Vec<mpsc::Sender<FeedPayload>>>>,
    connects: Mutex<HashMap<ChannelSpec, usize>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    // Quantas conexões de rede o canal abriu de fato (para provar a
    // deduplicação de assinaturas idênticas).
    pub fn connect_count(&self, spec: &ChannelSpec) -> usize {
        self.connects
            .lock()
            .expect("mapa de conexões envenenado")
            .get(spec)
            .copied()
            .unwrap_or(0)
    }

    // Publica um payload em todos os canais da tabela correspondente.
    pub async fn emit(&self, payload: FeedPayload) {
        let targets: Vec<mpsc::Sender<FeedPayload>> = {
            let senders = self.senders.lock().expect("mapa de senders envenenado");
            senders
                .iter()
                .filter(|(spec, _)| spec.table.as_str() == payload.table)
                .flat_map(|(_, list)| list.iter().cloned())
                .collect()
        };
        for tx in targets {
            let _ = tx.send(payload.clone()).await;
        }
    }

    // Simula a queda do transporte: todos os receptores veem o fim do
    // stream e o assinante parte para a reconexão.
    pub fn drop_channels(&self) {
        self.senders
            .lock()
            .expect("mapa de senders envenenado")
            .clear();
    }
}

#[async_trait]
impl ChangeFeedTransport for MemoryTransport {
    async fn connect(&self, spec: &ChannelSpec) -> Result<mpsc::Receiver<FeedPayload>, CoreError> {
        let (tx, rx) = mpsc::channel(64);
        self.senders
            .lock()
            .expect("mapa de senders envenenado")
            .entry(spec.clone())
            .or_default()
            .push(tx);
        *self
            .connects
            .lock()
            .expect("mapa de conexões envenenado")
            .entry(spec.clone())
            .or_insert(0) += 1;
        Ok(rx)
    }
}

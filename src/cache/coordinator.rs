// src/cache/coordinator.rs

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::{
    cache::QueryCache,
    realtime::{FeedMessage, Subscription},
};

// Liga o feed de mudanças ao cache: cada evento vira uma marca de
// staleness nas consultas dependentes; uma reconexão vira invalidação
// total. Nenhum call site espalha invalidações manuais: tudo passa
// pelo mapa declarativo de QueryKey::depends_on.
#[derive(Clone)]
pub struct InvalidationCoordinator {
    cache: Arc<QueryCache>,
}

impl InvalidationCoordinator {
    pub fn new(cache: Arc<QueryCache>) -> Self {
        Self { cache }
    }

    pub async fn handle(&self, message: FeedMessage) {
        match message {
            FeedMessage::Change(event) => {
                tracing::debug!("🔄 mudança em {} (chave {:?})", event.table, event.key);
                self.cache.mark_table_stale(event.table).await;
            }
            FeedMessage::Resync => {
                tracing::info!("🔄 reconexão do feed: invalidando tudo que está em cache");
                self.cache.mark_all_stale().await;
            }
        }
    }

    // Consome uma assinatura até ela fechar. A tarefa termina sozinha
    // quando o canal morre (sign-out derruba todos os canais).
    pub fn drive(&self, mut subscription: Subscription) -> JoinHandle<()> {
        let coordinator = self.clone();
        tokio::spawn(async move {
            while let Some(message) = subscription.recv().await {
                coordinator.handle(message).await;
            }
        })
    }
}

// src/realtime/pg.rs

use async_trait::async_trait;
use sqlx::postgres::PgListener;
use sqlx::PgPool;
use tokio::sync::mpsc;

use crate::{
    common::error::CoreError,
    realtime::{ChangeFeedTransport, ChannelSpec, FeedPayload},
};

// Transporte de produção: LISTEN/NOTIFY do Postgres. Cada tabela tem
// um canal `feed_<tabela>` alimentado por triggers que serializam o
// payload no formato de fio do feed.
#[derive(Clone)]
pub struct PgFeedTransport {
    pool: PgPool,
}

impl PgFeedTransport {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// Filtro no formato `coluna=valor`, aplicado do lado do cliente sobre
// o registro novo ou antigo do payload.
fn matches_filter(payload: &FeedPayload, filter: &str) -> bool {
    let Some((column, expected)) = filter.split_once('=') else {
        return true;
    };
    let record = payload.record.as_ref().or(payload.old_record.as_ref());
    match record.and_then(|r| r.get(column)) {
        Some(serde_json::Value::String(s)) => s == expected,
        Some(other) => other.to_string() == expected,
        None => false,
    }
}

#[async_trait]
impl ChangeFeedTransport for PgFeedTransport {
    async fn connect(&self, spec: &ChannelSpec) -> Result<mpsc::Receiver<FeedPayload>, CoreError> {
        let mut listener = PgListener::connect_with(&self.pool).await?;
        listener.listen(&format!("feed_{}", spec.table)).await?;

        let (tx, rx) = mpsc::channel(64);
        let filter = spec.filter.clone();
        tokio::spawn(async move {
            loop {
                match listener.recv().await {
                    Ok(notification) => {
                        let payload: FeedPayload =
                            match serde_json::from_str(notification.payload()) {
                                Ok(p) => p,
                                Err(err) => {
                                    tracing::warn!("payload de NOTIFY ilegível: {}", err);
                                    continue;
                                }
                            };
                        if let Some(f) = &filter {
                            if !matches_filter(&payload, f) {
                                continue;
                            }
                        }
                        if tx.send(payload).await.is_err() {
                            // Assinante fechou o canal; encerra o laço.
                            break;
                        }
                    }
                    Err(err) => {
                        // Conexão perdida: o fim do stream sinaliza ao
                        // assinante que é hora de reconectar.
                        tracing::warn!("LISTEN interrompido: {}", err);
                        break;
                    }
                }
            }
        });
        Ok(rx)
    }
}

// src/config.rs

use std::env;
use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;

use crate::{
    cache::{InvalidationCoordinator, QueryCache},
    mutations::MutationPipeline,
    realtime::{ChangeFeedSubscriber, ChangeFeedTransport},
    realtime::pg::PgFeedTransport,
    services::{AdminService, InviteService},
    session::jwt::JwtAuthGateway,
    session::memory::MemorySessionStore,
    session::{AuthGateway, SessionManager, SessionStore},
    store::{PgStore, RemoteStore},
};

const DEFAULT_FETCH_TIMEOUT_MS: u64 = 10_000;

// Estado montado da aplicação: o grafo de dependências inteiro é
// construído aqui, explicitamente: nenhum componente alcança um
// cliente global por conta própria.
#[derive(Clone)]
pub struct CoreState {
    pub store: Arc<dyn RemoteStore>,
    pub subscriber: ChangeFeedSubscriber,
    pub cache: Arc<QueryCache>,
    pub coordinator: InvalidationCoordinator,
    pub session: SessionManager,
    pub mutations: MutationPipeline,
    pub admin: AdminService,
    pub invites: InviteService,
}

impl CoreState {
    // Montagem de produção: Postgres para dados e feed, JWT para
    // sessão. A assinatura retorna um Result!
    pub async fn new() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL").expect("DATABASE_URL deve ser definida");
        let jwt_secret = env::var("JWT_SECRET").expect("JWT_SECRET deve ser definido");
        let fetch_timeout = env::var("CACHE_FETCH_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_FETCH_TIMEOUT_MS);

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(&database_url)
            .await?;

        tracing::info!("✅ Conexão com o banco de dados estabelecida com sucesso!");

        let store: Arc<dyn RemoteStore> = Arc::new(PgStore::new(pool.clone()));
        let transport: Arc<dyn ChangeFeedTransport> = Arc::new(PgFeedTransport::new(pool.clone()));
        let gateway: Arc<dyn AuthGateway> = Arc::new(JwtAuthGateway::new(pool, jwt_secret));
        let session_store: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());

        Ok(Self::assemble(
            store,
            transport,
            gateway,
            session_store,
            Duration::from_millis(fetch_timeout),
        ))
    }

    // Monta o grafo a partir das dependências injetadas. Os testes
    // passam dublês em memória por aqui.
    pub fn assemble(
        store: Arc<dyn RemoteStore>,
        transport: Arc<dyn ChangeFeedTransport>,
        gateway: Arc<dyn AuthGateway>,
        session_store: Arc<dyn SessionStore>,
        fetch_timeout: Duration,
    ) -> Self {
        let subscriber = ChangeFeedSubscriber::new(transport);
        let cache = Arc::new(QueryCache::new(Arc::clone(&store), fetch_timeout));
        let coordinator = InvalidationCoordinator::new(Arc::clone(&cache));
        let session = SessionManager::new(
            Arc::clone(&gateway),
            Arc::clone(&store),
            session_store,
            subscriber.clone(),
        );
        let mutations = MutationPipeline::new(Arc::clone(&store), Arc::clone(&cache));
        let admin = AdminService::new(Arc::clone(&store), Arc::clone(&gateway), Arc::clone(&cache));
        let invites = InviteService::new(Arc::clone(&store), gateway, Arc::clone(&cache));

        Self { store, subscriber, cache, coordinator, session, mutations, admin, invites }
    }
}

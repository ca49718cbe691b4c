// src/main.rs

use oficina_core::realtime::ChannelSpec;
use oficina_core::session::SessionState;
use oficina_core::store::Table;
use oficina_core::CoreState;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_target(false).compact().init();

    // .expect() é bom aqui: se a configuração falhar, a aplicação não
    // deve iniciar.
    let state = CoreState::new()
        .await
        .expect("Falha ao inicializar o estado da aplicação.");

    // Tenta restaurar uma sessão persistida; sem sessão ativa não há
    // canal de feed para abrir.
    match state.session.restore().await {
        Ok(SessionState::Authenticated(session)) => {
            tracing::info!("✅ Sessão restaurada para {}", session.user_id);
            let mut drivers = Vec::new();
            for table in Table::ALL {
                let subscription = state.subscriber.subscribe(ChannelSpec::table(table));
                drivers.push(state.coordinator.drive(subscription));
            }
            tracing::info!("🚀 Feed de mudanças ativo em {} canais", drivers.len());
        }
        Ok(_) => tracing::info!("Nenhuma sessão persistida; aguardando sign-in."),
        Err(err) => tracing::warn!("Falha ao restaurar sessão: {}", err),
    }

    tokio::signal::ctrl_c()
        .await
        .expect("Falha ao aguardar o sinal de encerramento");
    state.session.sign_out().await;
    tracing::info!("Encerrado.");
}

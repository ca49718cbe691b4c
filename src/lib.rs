//! Núcleo reativo de sincronização e workflow da oficina: sessão
//! autenticada, feed de mudanças, invalidação de cache e pipeline de
//! mutações sobre checklists, orçamentos e convites. A apresentação
//! (formulários, tabelas, impressão) vive fora daqui e só consome as
//! entidades destes módulos.

pub mod cache;
pub mod common;
pub mod config;
pub mod models;
pub mod mutations;
pub mod realtime;
pub mod services;
pub mod session;
pub mod store;
pub mod workflow;

pub use common::error::CoreError;
pub use config::CoreState;

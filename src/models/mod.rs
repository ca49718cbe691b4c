pub mod auth;
pub mod budget;
pub mod checklist;
pub mod invite;
pub mod log;
pub mod service;

pub use auth::{Claims, Profile, Role, Session};
pub use budget::{Budget, BudgetItem, BudgetStatus, NewBudgetItem};
pub use checklist::{Checklist, ChecklistItem, ChecklistStatus, NewChecklistItem, Priority};
pub use invite::InviteToken;
pub use log::SystemLog;
pub use service::Service;

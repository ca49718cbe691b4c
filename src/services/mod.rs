pub mod admin;
pub mod invite;

pub use admin::AdminService;
pub use invite::InviteService;

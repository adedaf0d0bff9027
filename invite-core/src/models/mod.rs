pub mod common;
pub mod invitation_keys;
pub mod invitation_users;
pub mod migrations;
pub mod users;

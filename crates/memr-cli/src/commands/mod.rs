pub mod add;
pub mod common;
pub mod delete;
pub mod import;
pub mod list;
pub mod move_cmd;
pub mod status;
pub mod sync;
pub mod update;
pub mod user;
pub mod view;
pub mod write;

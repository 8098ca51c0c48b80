// clipnote-daemon library entry point (shared by `clipnoted` and the CLI).

pub mod attachments;
pub mod background;
pub mod bus;
pub mod capture_agent;
pub mod collab;
pub mod config;
pub mod coordinator;
pub mod menu;
pub mod quick_note;
pub mod review;
pub mod runtime;
pub mod security;
pub mod settings_store;
pub mod startup;
pub mod store;

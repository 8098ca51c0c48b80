// Cross-context message protocol and persisted storage keys.

pub mod actions;
pub mod keys;
pub mod messages;

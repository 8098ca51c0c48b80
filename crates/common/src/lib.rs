// clipnote-common: wire types shared by the background, review and capture contexts.

pub mod backlink;
pub mod error;
pub mod protocol;
pub mod settings;
pub mod types;

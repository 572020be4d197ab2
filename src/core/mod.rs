//! Core business logic modules.

pub mod artifact;
pub mod audit;
pub mod credstore;
pub mod host_keys;
pub mod identity;
pub mod keypair;
pub mod lifecycle;
pub mod redis_store;
pub mod settings;
pub mod template;

//! Client provisioning for ssh-server.
//!
//! Generates per-client ed25519 keypairs, registers the public half in a
//! Redis-backed credential store, and renders a JSON configuration artifact
//! that clients fetch by UUID. Also reports and resets per-client data usage.
//!
//! ## Modules
//! - `cli`: command-line handlers
//! - `core`: lifecycle logic (store, keys, templates, artifacts, audit)
//! - `models`: records and report types
//! - `util`: filesystem helpers

pub mod cli;
pub mod constants;
pub mod core;
pub mod error;
pub mod models;
pub mod util;

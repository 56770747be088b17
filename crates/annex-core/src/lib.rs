//! Core library for annex: content digests, pointer files, local and remote
//! object stores, directory materialization and backups.
//! Used by the `annex` CLI; other tools can drive a store through it directly.

pub mod annex;
pub mod backend;
pub mod config;
pub mod digest;
pub mod error;
pub mod http_client;
pub mod materialize;
pub mod metadata;
pub mod utils;

#[cfg(test)]
mod testserver;

pub use annex::Annex;
pub use backend::{AnnexBackend, LocalStore, ObjectEntry, Progress, PushOutcome, RemoteStore};
pub use config::{load_config, AnnexConfig, StoreSpec};
pub use digest::{digest, digest_with, is_binary, is_pointer, read_pointer, HashKind, ObjectId};
pub use error::{AnnexError, AnnexResult};
pub use materialize::{materialize, Workspace};
pub use metadata::{InsertionTime, ObjectMetadata};

//! Filesystem Snapshot Adapter
//!
//! Canonical token files under `<output>/<chain_id>/<address>.json`, logo
//! images under `<output>/<chain_id>/pngs/<address>.png`.
//! The `<output>/native/` subtree belongs to someone else and is never
//! read or written here.

mod store;

pub use store::{render_record, FsSnapshotStore, LOGO_DIR, NATIVE_DIR};

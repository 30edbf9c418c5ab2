//! Filesystem adapters for Voltura.
//!
//! Per-session transport credentials live as JSON files under the
//! credentials directory (`{data_dir}/sessions/` by default).

pub mod credentials;

pub use credentials::FileCredentialStore;

//! File-backed `CredentialStore`.
//!
//! One file per session: `{dir}/{session_id}.json`. Writes go to a sibling
//! temp file first and are renamed into place, so a crash mid-write never
//! leaves a truncated credential file behind.

use std::path::{Path, PathBuf};

use voltura_core::transport::CredentialStore;
use voltura_types::error::CredentialError;
use voltura_types::session::Credentials;

#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    dir: PathBuf,
}

impl FileCredentialStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the credential file for `session_id`.
    ///
    /// Session ids become file names, so anything that could escape the
    /// directory is rejected.
    fn path_for(&self, session_id: &str) -> Result<PathBuf, CredentialError> {
        let valid = !session_id.is_empty()
            && session_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && !session_id.starts_with('.');
        if !valid {
            return Err(CredentialError::Format(format!(
                "invalid session id for credential file: '{session_id}'"
            )));
        }
        Ok(self.dir.join(format!("{session_id}.json")))
    }
}

impl CredentialStore for FileCredentialStore {
    async fn load(&self, session_id: &str) -> Result<Option<Credentials>, CredentialError> {
        let path = self.path_for(session_id)?;
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(CredentialError::Io(format!("{}: {err}", path.display()))),
        };

        let value = serde_json::from_str(&content)
            .map_err(|e| CredentialError::Format(format!("{}: {e}", path.display())))?;
        Ok(Some(Credentials(value)))
    }

    async fn save(&self, session_id: &str, credentials: &Credentials) -> Result<(), CredentialError> {
        let path = self.path_for(session_id)?;
        let json = serde_json::to_vec_pretty(&credentials.0)
            .map_err(|e| CredentialError::Format(e.to_string()))?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| CredentialError::Io(format!("{}: {e}", self.dir.display())))?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| CredentialError::Io(format!("{}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| CredentialError::Io(format!("{}: {e}", path.display())))?;

        tracing::debug!(session_id, "credentials saved");
        Ok(())
    }

    async fn invalidate(&self, session_id: &str) -> Result<(), CredentialError> {
        let path = self.path_for(session_id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::info!(session_id, "credentials invalidated");
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(CredentialError::Io(format!("{}: {err}", path.display()))),
        }
    }
}

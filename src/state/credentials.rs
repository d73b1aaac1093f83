//! Capability credentials persisted on the device between restarts.

use std::{io::ErrorKind, path::PathBuf, sync::Arc};

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

/// Result alias for credential persistence.
pub type CredentialResult<T> = Result<T, CredentialError>;

/// Failures reading or writing the credential file.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("failed to access credentials at {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode credentials at {path}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// On-disk shape: the four keys a device may hold.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCredentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_db_id: Option<Uuid>,
}

impl StoredCredentials {
    /// Credential set of a session creator.
    pub fn host(host_id: String, session_id: Uuid) -> Self {
        Self {
            host_id: Some(host_id),
            session_id: Some(session_id),
            ..Default::default()
        }
    }

    /// Credential set of a joined player.
    pub fn player(player_id: String, session_id: Uuid, player_db_id: Uuid) -> Self {
        Self {
            player_id: Some(player_id),
            session_id: Some(session_id),
            player_db_id: Some(player_db_id),
            ..Default::default()
        }
    }

    /// Interpret the stored keys. Host credentials win over player ones.
    pub fn resolve(&self) -> DeviceCredentials {
        match self {
            Self {
                host_id: Some(host_id),
                session_id: Some(session_id),
                ..
            } => DeviceCredentials::Host {
                host_id: host_id.clone(),
                session_id: *session_id,
            },
            Self {
                session_id: Some(session_id),
                player_db_id: Some(player_db_id),
                player_id,
                ..
            } => DeviceCredentials::Player {
                player_id: player_id.clone(),
                session_id: *session_id,
                player_db_id: *player_db_id,
            },
            _ => DeviceCredentials::None,
        }
    }
}

/// What this device is entitled to, as resolved from its stored credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceCredentials {
    /// Nothing usable stored.
    None,
    /// The device created `session_id`.
    Host { host_id: String, session_id: Uuid },
    /// The device joined `session_id` as row `player_db_id`.
    Player {
        player_id: Option<String>,
        session_id: Uuid,
        player_db_id: Uuid,
    },
}

impl DeviceCredentials {
    /// Session the credentials point at.
    pub fn session_id(&self) -> Option<Uuid> {
        match self {
            DeviceCredentials::None => None,
            DeviceCredentials::Host { session_id, .. }
            | DeviceCredentials::Player { session_id, .. } => Some(*session_id),
        }
    }
}

/// Persistence of the device credentials.
pub trait CredentialStore: Send + Sync {
    fn load(&self) -> BoxFuture<'static, CredentialResult<StoredCredentials>>;
    /// Replace the whole credential set.
    fn save(&self, credentials: StoredCredentials) -> BoxFuture<'static, CredentialResult<()>>;
    fn clear(&self) -> BoxFuture<'static, CredentialResult<()>>;
}

/// JSON file on the local disk. A missing file reads as empty.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: Arc<PathBuf>,
}

impl FileCredentialStore {
    /// Store backed by `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Arc::new(path.into()),
        }
    }

    fn io_error(&self, source: std::io::Error) -> CredentialError {
        CredentialError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> BoxFuture<'static, CredentialResult<StoredCredentials>> {
        let store = self.clone();
        Box::pin(async move {
            let contents = match tokio::fs::read_to_string(store.path.as_ref()).await {
                Ok(contents) => contents,
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    debug!(path = %store.path.display(), "no stored credentials");
                    return Ok(StoredCredentials::default());
                }
                Err(err) => return Err(store.io_error(err)),
            };

            serde_json::from_str(&contents).map_err(|source| CredentialError::Decode {
                path: store.path.display().to_string(),
                source,
            })
        })
    }

    fn save(&self, credentials: StoredCredentials) -> BoxFuture<'static, CredentialResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let contents = serde_json::to_vec_pretty(&credentials).map_err(|source| {
                CredentialError::Decode {
                    path: store.path.display().to_string(),
                    source,
                }
            })?;
            if let Some(parent) = store.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|err| store.io_error(err))?;
            }
            tokio::fs::write(store.path.as_ref(), contents)
                .await
                .map_err(|err| store.io_error(err))
        })
    }

    fn clear(&self) -> BoxFuture<'static, CredentialResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            match tokio::fs::remove_file(store.path.as_ref()).await {
                Ok(()) => Ok(()),
                Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
                Err(err) => Err(store.io_error(err)),
            }
        })
    }
}

/// Credentials kept in memory only, for tests and ephemeral devices.
#[derive(Debug, Clone, Default)]
pub struct MemoryCredentialStore {
    inner: Arc<Mutex<StoredCredentials>>,
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> BoxFuture<'static, CredentialResult<StoredCredentials>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.lock().await.clone()) })
    }

    fn save(&self, credentials: StoredCredentials) -> BoxFuture<'static, CredentialResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            *inner.lock().await = credentials;
            Ok(())
        })
    }

    fn clear(&self) -> BoxFuture<'static, CredentialResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            *inner.lock().await = StoredCredentials::default();
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_credentials_take_priority() {
        let session_id = Uuid::new_v4();
        let stored = StoredCredentials {
            host_id: Some("host_1_a".into()),
            session_id: Some(session_id),
            player_id: Some("player_1_b".into()),
            player_db_id: Some(Uuid::new_v4()),
        };

        assert_eq!(
            stored.resolve(),
            DeviceCredentials::Host {
                host_id: "host_1_a".into(),
                session_id
            }
        );
    }

    #[test]
    fn player_needs_session_and_row() {
        let partial = StoredCredentials {
            player_id: Some("player_1_b".into()),
            session_id: Some(Uuid::new_v4()),
            ..Default::default()
        };
        assert_eq!(partial.resolve(), DeviceCredentials::None);
        assert_eq!(StoredCredentials::default().resolve(), DeviceCredentials::None);
    }

    #[tokio::test]
    async fn file_store_round_trips_and_clears() {
        let path = std::env::temp_dir().join(format!("party-lobby-creds-{}.json", Uuid::new_v4()));
        let store = FileCredentialStore::new(&path);

        assert_eq!(store.load().await.unwrap(), StoredCredentials::default());

        let saved = StoredCredentials::host("host_1_a".into(), Uuid::new_v4());
        store.save(saved.clone()).await.unwrap();
        assert_eq!(store.load().await.unwrap(), saved);

        store.clear().await.unwrap();
        assert_eq!(store.load().await.unwrap(), StoredCredentials::default());
    }
}

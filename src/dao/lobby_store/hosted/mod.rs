mod config;
mod error;
mod store;

use crate::dao::storage::StorageError;

pub use config::HostedConfig;
pub use error::{HostedDaoError, HostedResult};
pub use store::HostedLobbyStore;

impl From<HostedDaoError> for StorageError {
    fn from(err: HostedDaoError) -> Self {
        if let HostedDaoError::RequestStatus { status, .. } = &err {
            if status.is_client_error() {
                return StorageError::rejected(err.to_string());
            }
        }
        StorageError::unavailable(err.to_string(), err)
    }
}

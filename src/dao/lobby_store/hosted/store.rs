use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::{Client, Method, header::HeaderValue};
use serde::{
    Serialize,
    de::{DeserializeOwned, IgnoredAny},
};
use uuid::Uuid;

use crate::dao::{
    lobby_store::LobbyStore,
    models::{
        GameStateRow, NewGameState, NewPlayer, NewSession, NewTelemetry, PlayerPatch, PlayerRow,
        SessionPatch, SessionRow,
    },
    storage::StorageResult,
};

use super::{
    config::HostedConfig,
    error::{HostedDaoError, HostedResult},
};

const SESSIONS: &str = "sessions";
const PLAYERS: &str = "players";
const GAME_STATE: &str = "game_state";
const TELEMETRY: &str = "telemetry";

const RETURN_REPRESENTATION: &str = "return=representation";
const RETURN_MINIMAL: &str = "return=minimal";

type Query = Vec<(&'static str, String)>;

/// Row CRUD against the hosted datastore's REST interface.
#[derive(Clone)]
pub struct HostedLobbyStore {
    client: Client,
    rest_url: Arc<str>,
    api_key: Arc<str>,
    schema: Arc<str>,
}

impl HostedLobbyStore {
    /// Build the HTTP client without touching the network.
    pub fn new(config: HostedConfig) -> HostedResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| HostedDaoError::ClientBuilder { source })?;

        Ok(Self {
            client,
            rest_url: Arc::from(config.rest_url()),
            api_key: Arc::from(config.api_key),
            schema: Arc::from(config.schema),
        })
    }

    fn request(&self, method: Method, table: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}", self.rest_url, table);
        let profile_header = if method == Method::GET {
            "Accept-Profile"
        } else {
            "Content-Profile"
        };
        self.client
            .request(method, url)
            .header("apikey", self.api_key.as_ref())
            .bearer_auth(self.api_key.as_ref())
            .header(profile_header, self.schema.as_ref())
    }

    async fn select<T>(&self, table: &str, query: &Query) -> HostedResult<Vec<T>>
    where
        T: DeserializeOwned,
    {
        let response = self
            .request(Method::GET, table)
            .query(query)
            .send()
            .await
            .map_err(|source| HostedDaoError::RequestSend {
                path: table.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(HostedDaoError::RequestStatus {
                path: table.to_string(),
                status: response.status(),
            });
        }

        response
            .json::<Vec<T>>()
            .await
            .map_err(|source| HostedDaoError::DecodeResponse {
                path: table.to_string(),
                source,
            })
    }

    async fn select_one<T>(&self, table: &str, mut query: Query) -> HostedResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        query.push(("limit", "1".to_string()));
        let rows = self.select::<T>(table, &query).await?;
        Ok(rows.into_iter().next())
    }

    async fn insert<B, T>(&self, table: &str, body: &B) -> HostedResult<T>
    where
        B: ?Sized + Serialize,
        T: DeserializeOwned,
    {
        let response = self
            .request(Method::POST, table)
            .header("Prefer", HeaderValue::from_static(RETURN_REPRESENTATION))
            .json(body)
            .send()
            .await
            .map_err(|source| HostedDaoError::RequestSend {
                path: table.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(HostedDaoError::RequestStatus {
                path: table.to_string(),
                status: response.status(),
            });
        }

        let rows = response.json::<Vec<T>>().await.map_err(|source| {
            HostedDaoError::DecodeResponse {
                path: table.to_string(),
                source,
            }
        })?;

        rows.into_iter()
            .next()
            .ok_or_else(|| HostedDaoError::MissingRepresentation {
                path: table.to_string(),
            })
    }

    async fn write<B>(&self, method: Method, table: &str, query: &Query, body: &B) -> HostedResult<()>
    where
        B: ?Sized + Serialize,
    {
        let response = self
            .request(method, table)
            .header("Prefer", HeaderValue::from_static(RETURN_MINIMAL))
            .query(query)
            .json(body)
            .send()
            .await
            .map_err(|source| HostedDaoError::RequestSend {
                path: table.to_string(),
                source,
            })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(HostedDaoError::RequestStatus {
                path: table.to_string(),
                status: response.status(),
            })
        }
    }

    async fn ping(&self) -> HostedResult<()> {
        let query = vec![("select", "id".to_string()), ("limit", "1".to_string())];
        self.select::<IgnoredAny>(SESSIONS, &query).await.map(|_| ())
    }
}

fn eq(value: impl ToString) -> String {
    format!("eq.{}", value.to_string())
}

impl LobbyStore for HostedLobbyStore {
    fn insert_session(&self, session: NewSession) -> BoxFuture<'static, StorageResult<SessionRow>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.insert(SESSIONS, &session).await?) })
    }

    fn find_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionRow>>> {
        let store = self.clone();
        Box::pin(async move {
            let query = vec![("select", "*".to_string()), ("id", eq(id))];
            Ok(store.select_one(SESSIONS, query).await?)
        })
    }

    fn find_session_by_code(
        &self,
        room_code: String,
    ) -> BoxFuture<'static, StorageResult<Option<SessionRow>>> {
        let store = self.clone();
        Box::pin(async move {
            let query = vec![
                ("select", "*".to_string()),
                ("room_code", eq(room_code)),
                ("order", "created_at.desc".to_string()),
            ];
            Ok(store.select_one(SESSIONS, query).await?)
        })
    }

    fn update_session(
        &self,
        id: Uuid,
        patch: SessionPatch,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let query = vec![("id", eq(id))];
            Ok(store.write(Method::PATCH, SESSIONS, &query, &patch).await?)
        })
    }

    fn insert_player(&self, player: NewPlayer) -> BoxFuture<'static, StorageResult<PlayerRow>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.insert(PLAYERS, &player).await?) })
    }

    fn find_player(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<PlayerRow>>> {
        let store = self.clone();
        Box::pin(async move {
            let query = vec![("select", "*".to_string()), ("id", eq(id))];
            Ok(store.select_one(PLAYERS, query).await?)
        })
    }

    fn list_players(&self, session_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<PlayerRow>>> {
        let store = self.clone();
        Box::pin(async move {
            let query = vec![
                ("select", "*".to_string()),
                ("session_id", eq(session_id)),
                ("order", "joined_at.asc".to_string()),
            ];
            Ok(store.select(PLAYERS, &query).await?)
        })
    }

    fn count_connected_players(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<usize>> {
        let store = self.clone();
        Box::pin(async move {
            let query = vec![
                ("select", "id".to_string()),
                ("session_id", eq(session_id)),
                ("status", eq("connected")),
            ];
            let rows = store.select::<IgnoredAny>(PLAYERS, &query).await?;
            Ok(rows.len())
        })
    }

    fn update_player(&self, id: Uuid, patch: PlayerPatch) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let query = vec![("id", eq(id))];
            Ok(store.write(Method::PATCH, PLAYERS, &query, &patch).await?)
        })
    }

    fn insert_game_state(
        &self,
        state: NewGameState,
    ) -> BoxFuture<'static, StorageResult<GameStateRow>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.insert(GAME_STATE, &state).await?) })
    }

    fn latest_game_state(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<GameStateRow>>> {
        let store = self.clone();
        Box::pin(async move {
            let query = vec![
                ("select", "*".to_string()),
                ("session_id", eq(session_id)),
                ("order", "updated_at.desc".to_string()),
            ];
            Ok(store.select_one(GAME_STATE, query).await?)
        })
    }

    fn insert_telemetry(&self, event: NewTelemetry) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store
                .write(Method::POST, TELEMETRY, &Vec::new(), &event)
                .await?)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.ping().await?) })
    }
}

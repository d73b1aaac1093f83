use indexmap::IndexMap;
use uuid::Uuid;

use crate::{
    dao::models::{PlayerRow, PlayerStatus, SessionRow},
    realtime::{ChangeEvent, ChangeKind},
};

/// In-memory copy of the attached session and its roster, fed by the change feed.
#[derive(Debug, Clone, Default)]
pub struct LobbyProjection {
    session: Option<SessionRow>,
    players: IndexMap<Uuid, PlayerRow>,
}

impl LobbyProjection {
    /// Empty projection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace everything with a fresh read of the datastore.
    pub fn reset(&mut self, session: SessionRow, players: Vec<PlayerRow>) {
        self.session = Some(session);
        self.players = players.into_iter().map(|row| (row.id, row)).collect();
        self.sort_roster();
    }

    /// Forget the session.
    pub fn clear(&mut self) {
        self.session = None;
        self.players.clear();
    }

    /// Attached session row, if any.
    pub fn session(&self) -> Option<&SessionRow> {
        self.session.as_ref()
    }

    /// Roster in join order.
    pub fn players(&self) -> impl Iterator<Item = &PlayerRow> {
        self.players.values()
    }

    /// Player by datastore id.
    pub fn player(&self, id: Uuid) -> Option<&PlayerRow> {
        self.players.get(&id)
    }

    /// Players currently holding a seat.
    pub fn connected_count(&self) -> usize {
        self.players().filter(|player| player.is_connected()).count()
    }

    /// Fold a session change in. Returns whether the projection changed.
    pub fn apply_session(&mut self, event: ChangeEvent<SessionRow>) -> bool {
        match (event.kind, event.row) {
            (ChangeKind::Delete, _) => {
                let matches = match (&self.session, event.old_id) {
                    (Some(current), Some(old_id)) => current.id == old_id,
                    (Some(_), None) => true,
                    (None, _) => false,
                };
                if matches {
                    self.clear();
                }
                matches
            }
            (_, Some(row)) => {
                if self.session.as_ref() == Some(&row) {
                    return false;
                }
                if self.session.as_ref().is_some_and(|current| current.id != row.id) {
                    return false;
                }
                self.session = Some(row);
                true
            }
            (_, None) => false,
        }
    }

    /// Fold a player change in. Returns whether the projection changed.
    pub fn apply_player(&mut self, event: ChangeEvent<PlayerRow>) -> bool {
        match (event.kind, event.row) {
            (ChangeKind::Delete, _) => event
                .old_id
                .and_then(|id| self.players.shift_remove(&id))
                .is_some(),
            (_, Some(mut row)) => {
                if self.session.as_ref().is_some_and(|session| session.id != row.session_id) {
                    return false;
                }
                // Kicked is terminal: a late image written before the kick keeps it.
                if self.players.get(&row.id).is_some_and(PlayerRow::is_kicked) {
                    row.status = PlayerStatus::Kicked;
                }
                if self.players.get(&row.id) == Some(&row) {
                    return false;
                }
                let is_new = !self.players.contains_key(&row.id);
                self.players.insert(row.id, row);
                if is_new {
                    self.sort_roster();
                }
                true
            }
            (_, None) => false,
        }
    }

    fn sort_roster(&mut self) {
        self.players
            .sort_by(|_, a, _, b| a.joined_at.cmp(&b.joined_at));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::models::{Language, SessionSettings, SessionStatus};
    use time::{Duration, OffsetDateTime};

    fn session() -> SessionRow {
        SessionRow {
            id: Uuid::new_v4(),
            room_code: "AB3X7K".into(),
            host_id: "host_1_a".into(),
            status: SessionStatus::Lobby,
            language: Language::Fa,
            max_players: 12,
            current_game: None,
            settings: SessionSettings::default(),
            created_at: OffsetDateTime::UNIX_EPOCH,
            expires_at: OffsetDateTime::UNIX_EPOCH,
            last_activity: OffsetDateTime::UNIX_EPOCH,
        }
    }

    fn player(session_id: Uuid, nickname: &str, joined_offset: i64) -> PlayerRow {
        PlayerRow {
            id: Uuid::new_v4(),
            session_id,
            nickname: nickname.into(),
            avatar_emoji: "🦋".into(),
            player_id: format!("player_1_{nickname}"),
            status: PlayerStatus::Connected,
            team: None,
            score: 0,
            joined_at: OffsetDateTime::UNIX_EPOCH + Duration::seconds(joined_offset),
            last_seen: OffsetDateTime::UNIX_EPOCH,
            reconnect_token: None,
        }
    }

    fn upsert<T>(kind: ChangeKind, row: T) -> ChangeEvent<T> {
        ChangeEvent {
            kind,
            row: Some(row),
            old_id: None,
        }
    }

    #[test]
    fn roster_stays_in_join_order() {
        let session = session();
        let mut projection = LobbyProjection::new();
        projection.reset(session.clone(), vec![player(session.id, "B", 2)]);

        assert!(projection.apply_player(upsert(ChangeKind::Insert, player(session.id, "A", 1))));
        assert!(projection.apply_player(upsert(ChangeKind::Insert, player(session.id, "C", 3))));

        let names: Vec<_> = projection.players().map(|p| p.nickname.as_str()).collect();
        assert_eq!(names, ["A", "B", "C"]);
    }

    #[test]
    fn kick_update_reduces_connected_count() {
        let session = session();
        let sam = player(session.id, "Sam", 1);
        let mut projection = LobbyProjection::new();
        projection.reset(session, vec![sam.clone()]);
        assert_eq!(projection.connected_count(), 1);

        let kicked = PlayerRow {
            status: PlayerStatus::Kicked,
            ..sam
        };
        assert!(projection.apply_player(upsert(ChangeKind::Update, kicked.clone())));
        assert!(!projection.apply_player(upsert(ChangeKind::Update, kicked)));
        assert_eq!(projection.connected_count(), 0);
    }

    #[test]
    fn late_heartbeat_image_does_not_revive_a_kicked_player() {
        let session = session();
        let sam = player(session.id, "Sam", 1);
        let mut projection = LobbyProjection::new();
        projection.reset(session, vec![sam.clone()]);

        let kicked = PlayerRow {
            status: PlayerStatus::Kicked,
            ..sam.clone()
        };
        assert!(projection.apply_player(upsert(ChangeKind::Update, kicked)));

        let heartbeat = PlayerRow {
            last_seen: OffsetDateTime::UNIX_EPOCH + Duration::seconds(5),
            ..sam
        };
        assert!(projection.apply_player(upsert(ChangeKind::Update, heartbeat.clone())));

        let row = projection.player(heartbeat.id).unwrap();
        assert!(row.is_kicked());
        assert_eq!(row.last_seen, heartbeat.last_seen);
        assert_eq!(projection.connected_count(), 0);
    }

    #[test]
    fn ignores_rows_of_other_sessions() {
        let mut projection = LobbyProjection::new();
        projection.reset(session(), Vec::new());

        assert!(!projection.apply_player(upsert(ChangeKind::Insert, player(Uuid::new_v4(), "X", 1))));
        assert!(!projection.apply_session(upsert(ChangeKind::Update, session())));
    }

    #[test]
    fn session_update_is_adopted() {
        let current = session();
        let mut projection = LobbyProjection::new();
        projection.reset(current.clone(), Vec::new());

        let started = SessionRow {
            status: SessionStatus::Tutorial,
            ..current
        };
        assert!(projection.apply_session(upsert(ChangeKind::Update, started)));
        assert_eq!(projection.session().unwrap().status, SessionStatus::Tutorial);
    }
}

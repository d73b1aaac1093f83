//! Pure mapping from the synchronized session to the screen the device shows.

use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    dao::models::{GameKind, PlayerRow, SessionRow, SessionStatus},
    games::GameRegistry,
};

/// Which side of the session this device is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The device that created the session.
    Host,
    /// A device that joined by room code.
    Player,
}

/// Screen the presentation layer must render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "screen", rename_all = "snake_case")]
pub enum Screen {
    /// Create a session or enter a code.
    Home,
    /// Nickname form for a known room code.
    PlayerJoin { room_code: String },
    /// Host roster, code and QR.
    HostLobby,
    /// Player waiting room.
    PlayerLobby,
    /// Host picks the game.
    GameSelect,
    /// Player waits for the host to pick (or for an unimplemented game).
    AwaitingGame,
    /// A registered game module is running.
    Playing { game: GameKind },
    /// The local player was kicked. Terminal.
    Removed,
    /// The host closed the session.
    Ended,
}

impl Screen {
    /// Whether the screen belongs to an attached session.
    fn in_session(&self) -> bool {
        !matches!(self, Screen::Home | Screen::PlayerJoin { .. })
    }
}

/// Resolved view: the screen plus the orthogonal tutorial overlay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ViewState {
    #[serde(flatten)]
    pub screen: Screen,
    pub tutorial_overlay: bool,
}

impl ViewState {
    /// Landing view of a device without a session.
    pub fn home() -> Self {
        Self {
            screen: Screen::Home,
            tutorial_overlay: false,
        }
    }

    /// Nickname form for `room_code`.
    pub fn join(room_code: impl Into<String>) -> Self {
        Self {
            screen: Screen::PlayerJoin {
                room_code: room_code.into(),
            },
            tutorial_overlay: false,
        }
    }
}

impl Default for ViewState {
    fn default() -> Self {
        Self::home()
    }
}

/// Everything the resolution rule looks at.
#[derive(Clone, Copy)]
pub struct ViewInput<'a> {
    pub role: Role,
    pub session: &'a SessionRow,
    /// The device's own player row, players only.
    pub local_player: Option<&'a PlayerRow>,
    /// Screen shown before this change.
    pub previous: &'a Screen,
    /// Set once this device closed the tutorial overlay.
    pub tutorial_dismissed: bool,
    pub registry: &'a GameRegistry,
}

/// Resolve the view for an attached session.
pub fn resolve(input: ViewInput<'_>) -> ViewState {
    if input.local_player.is_some_and(PlayerRow::is_kicked) {
        return ViewState {
            screen: Screen::Removed,
            tutorial_overlay: false,
        };
    }

    let lobby = match input.role {
        Role::Host => Screen::HostLobby,
        Role::Player => Screen::PlayerLobby,
    };

    let (screen, tutorial_overlay) = match input.session.status {
        SessionStatus::Lobby => (lobby, false),
        SessionStatus::Tutorial => {
            let screen = if input.previous.in_session() && *input.previous != Screen::Ended {
                input.previous.clone()
            } else {
                lobby
            };
            (screen, !input.tutorial_dismissed)
        }
        SessionStatus::Playing => {
            let screen = match (input.session.current_game, input.role) {
                (None, Role::Host) => Screen::GameSelect,
                (None, Role::Player) => Screen::AwaitingGame,
                (Some(game), _) if input.registry.is_registered(game) => Screen::Playing { game },
                (Some(_), _) => Screen::AwaitingGame,
            };
            (screen, false)
        }
        SessionStatus::Ended => (Screen::Ended, false),
    };

    ViewState {
        screen,
        tutorial_overlay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::models::{Language, PlayerStatus, SessionSettings};
    use time::OffsetDateTime;
    use uuid::Uuid;

    fn session(status: SessionStatus, current_game: Option<GameKind>) -> SessionRow {
        SessionRow {
            id: Uuid::new_v4(),
            room_code: "AB3X7K".into(),
            host_id: "host_1_a".into(),
            status,
            language: Language::En,
            max_players: 12,
            current_game,
            settings: SessionSettings::default(),
            created_at: OffsetDateTime::UNIX_EPOCH,
            expires_at: OffsetDateTime::UNIX_EPOCH,
            last_activity: OffsetDateTime::UNIX_EPOCH,
        }
    }

    fn player(status: PlayerStatus) -> PlayerRow {
        PlayerRow {
            id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            nickname: "Sam".into(),
            avatar_emoji: "🐼".into(),
            player_id: "player_1_a".into(),
            status,
            team: None,
            score: 0,
            joined_at: OffsetDateTime::UNIX_EPOCH,
            last_seen: OffsetDateTime::UNIX_EPOCH,
            reconnect_token: None,
        }
    }

    fn view(
        role: Role,
        session: &SessionRow,
        local_player: Option<&PlayerRow>,
        previous: &Screen,
    ) -> ViewState {
        resolve(ViewInput {
            role,
            session,
            local_player,
            previous,
            tutorial_dismissed: false,
            registry: &GameRegistry::builtin(),
        })
    }

    #[test]
    fn lobby_depends_on_role() {
        let row = session(SessionStatus::Lobby, None);
        let me = player(PlayerStatus::Connected);
        assert_eq!(view(Role::Host, &row, None, &Screen::Home).screen, Screen::HostLobby);
        assert_eq!(
            view(Role::Player, &row, Some(&me), &Screen::Home).screen,
            Screen::PlayerLobby
        );
    }

    #[test]
    fn tutorial_overlays_the_current_screen() {
        let row = session(SessionStatus::Tutorial, None);
        let resolved = view(Role::Host, &row, None, &Screen::HostLobby);
        assert_eq!(resolved.screen, Screen::HostLobby);
        assert!(resolved.tutorial_overlay);

        let dismissed = resolve(ViewInput {
            role: Role::Player,
            session: &row,
            local_player: None,
            previous: &Screen::PlayerLobby,
            tutorial_dismissed: true,
            registry: &GameRegistry::builtin(),
        });
        assert!(!dismissed.tutorial_overlay);
    }

    #[test]
    fn playing_without_game_is_asymmetric() {
        let row = session(SessionStatus::Playing, None);
        assert_eq!(view(Role::Host, &row, None, &Screen::HostLobby).screen, Screen::GameSelect);
        assert_eq!(
            view(Role::Player, &row, None, &Screen::PlayerLobby).screen,
            Screen::AwaitingGame
        );
    }

    #[test]
    fn unimplemented_game_waits() {
        let name = session(SessionStatus::Playing, Some(GameKind::NameGame));
        let spy = session(SessionStatus::Playing, Some(GameKind::Spy));
        assert_eq!(
            view(Role::Player, &name, None, &Screen::AwaitingGame).screen,
            Screen::Playing {
                game: GameKind::NameGame
            }
        );
        assert_eq!(view(Role::Host, &spy, None, &Screen::GameSelect).screen, Screen::AwaitingGame);
    }

    #[test]
    fn kicked_overrides_everything() {
        let row = session(SessionStatus::Playing, Some(GameKind::NameGame));
        let me = player(PlayerStatus::Kicked);
        assert_eq!(
            view(Role::Player, &row, Some(&me), &Screen::PlayerLobby).screen,
            Screen::Removed
        );
    }

    #[test]
    fn ended_session_shows_ended() {
        let row = session(SessionStatus::Ended, None);
        assert_eq!(view(Role::Player, &row, None, &Screen::PlayerLobby).screen, Screen::Ended);
    }

    #[test]
    fn screen_serializes_with_tag() {
        let state = ViewState {
            screen: Screen::Playing {
                game: GameKind::NameGame,
            },
            tutorial_overlay: false,
        };
        assert_eq!(
            serde_json::to_value(&state).unwrap(),
            serde_json::json!({"screen": "playing", "game": "name_game", "tutorial_overlay": false})
        );
    }
}

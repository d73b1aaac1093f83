use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::dao::models::{GameKind, Language, PlayerRow};

use super::{GameData, GameModule};

/// Round payload of the naming game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameGameData {
    /// Letter every word must start with.
    pub letter: String,
}

impl NameGameData {
    /// Starting letter used for `language`.
    pub fn for_language(language: Language) -> Self {
        let letter = match language {
            Language::En => "A",
            Language::Fa => "ک",
        };
        Self {
            letter: letter.to_string(),
        }
    }
}

/// Players find words starting with a given letter before the timer runs out.
pub struct NameGame;

impl GameModule for NameGame {
    fn kind(&self) -> GameKind {
        GameKind::NameGame
    }

    fn initial_data(&self, language: Language) -> GameData {
        GameData::NameGame(NameGameData::for_language(language))
    }
}

/// Local round countdown. Each device runs its own; nothing is synchronized.
#[derive(Debug, Clone, Copy)]
pub struct RoundTimer {
    started_at: Instant,
    duration: Duration,
}

impl RoundTimer {
    /// Start a countdown of `duration` now.
    pub fn start(duration: Duration) -> Self {
        Self::started_at(Instant::now(), duration)
    }

    /// Countdown that began at `started_at`.
    pub fn started_at(started_at: Instant, duration: Duration) -> Self {
        Self {
            started_at,
            duration,
        }
    }

    /// Time left at `now`, zero once elapsed.
    pub fn remaining_at(&self, now: Instant) -> Duration {
        self.duration
            .saturating_sub(now.saturating_duration_since(self.started_at))
    }

    /// Whole seconds left, rounded up so a fresh 60 s round shows 60.
    pub fn remaining_secs_at(&self, now: Instant) -> u64 {
        let remaining = self.remaining_at(now);
        let secs = remaining.as_secs();
        if remaining.subsec_nanos() > 0 {
            secs + 1
        } else {
            secs
        }
    }

    /// Whole seconds left right now.
    pub fn remaining_secs(&self) -> u64 {
        self.remaining_secs_at(Instant::now())
    }

    /// Whether the countdown reached zero at `now`.
    pub fn is_finished_at(&self, now: Instant) -> bool {
        self.remaining_at(now).is_zero()
    }
}

/// One line of the round scoreboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ScoreEntry {
    pub player_id: Uuid,
    pub nickname: String,
    pub avatar_emoji: String,
    pub score: u32,
    /// Set on the first entry only.
    pub leader: bool,
}

/// Connected players by descending score. Ties keep join order.
pub fn scoreboard<'a>(players: impl IntoIterator<Item = &'a PlayerRow>) -> Vec<ScoreEntry> {
    let mut connected: Vec<&PlayerRow> = players
        .into_iter()
        .filter(|player| player.is_connected())
        .collect();
    connected.sort_by(|a, b| b.score.cmp(&a.score));

    connected
        .into_iter()
        .enumerate()
        .map(|(index, player)| ScoreEntry {
            player_id: player.id,
            nickname: player.nickname.clone(),
            avatar_emoji: player.avatar_emoji.clone(),
            score: player.score,
            leader: index == 0,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::models::PlayerStatus;
    use time::OffsetDateTime;

    fn player(nickname: &str, score: u32, status: PlayerStatus) -> PlayerRow {
        PlayerRow {
            id: Uuid::new_v4(),
            session_id: Uuid::nil(),
            nickname: nickname.into(),
            avatar_emoji: "🦁".into(),
            player_id: format!("player_0_{nickname}"),
            status,
            team: None,
            score,
            joined_at: OffsetDateTime::UNIX_EPOCH,
            last_seen: OffsetDateTime::UNIX_EPOCH,
            reconnect_token: None,
        }
    }

    #[test]
    fn scoreboard_ranks_connected_players() {
        let players = vec![
            player("Ana", 3, PlayerStatus::Connected),
            player("Bob", 7, PlayerStatus::Connected),
            player("Cy", 9, PlayerStatus::Kicked),
            player("Dee", 3, PlayerStatus::Connected),
        ];

        let board = scoreboard(&players);
        let names: Vec<_> = board.iter().map(|entry| entry.nickname.as_str()).collect();
        assert_eq!(names, ["Bob", "Ana", "Dee"]);
        assert!(board[0].leader);
        assert!(!board[1].leader);
    }

    #[test]
    fn timer_counts_down_to_zero() {
        let start = Instant::now();
        let timer = RoundTimer::started_at(start, Duration::from_secs(60));

        assert_eq!(timer.remaining_secs_at(start), 60);
        assert_eq!(timer.remaining_secs_at(start + Duration::from_millis(1_500)), 59);
        assert_eq!(timer.remaining_secs_at(start + Duration::from_secs(75)), 0);
        assert!(timer.is_finished_at(start + Duration::from_secs(60)));
    }

    #[test]
    fn letter_depends_on_language() {
        assert_eq!(NameGameData::for_language(Language::En).letter, "A");
        assert_eq!(NameGameData::for_language(Language::Fa).letter, "ک");
    }
}

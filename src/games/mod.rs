//! Game modules a session can switch to once it reaches `playing`.

pub mod name_game;

use serde::{Deserialize, Serialize};

use crate::dao::models::{GameKind, Language};

pub use self::name_game::{NameGame, NameGameData, RoundTimer, ScoreEntry, scoreboard};

/// Game-specific payload stored in `game_state.data`, tagged by game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "game", rename_all = "snake_case")]
pub enum GameData {
    /// Word hunt on a single letter.
    NameGame(NameGameData),
    /// No payload yet, the game is not implemented.
    SongGuess,
    /// No payload yet, the game is not implemented.
    Spy,
}

impl GameData {
    /// Game this payload belongs to.
    pub fn kind(&self) -> GameKind {
        match self {
            GameData::NameGame(_) => GameKind::NameGame,
            GameData::SongGuess => GameKind::SongGuess,
            GameData::Spy => GameKind::Spy,
        }
    }

    /// Payload written for a game that has no registered module.
    pub fn placeholder(kind: GameKind, language: Language) -> Self {
        match kind {
            GameKind::NameGame => GameData::NameGame(NameGameData::for_language(language)),
            GameKind::SongGuess => GameData::SongGuess,
            GameKind::Spy => GameData::Spy,
        }
    }
}

/// A playable game plugged into the session once selected.
pub trait GameModule: Send + Sync {
    /// Game implemented by this module.
    fn kind(&self) -> GameKind;
    /// Payload of the first round's `game_state` row.
    fn initial_data(&self, language: Language) -> GameData;
}

/// Fixed set of game modules shipped with the crate.
pub struct GameRegistry {
    modules: Vec<Box<dyn GameModule>>,
}

impl GameRegistry {
    /// Registry holding every implemented game.
    pub fn builtin() -> Self {
        Self {
            modules: vec![Box::new(NameGame)],
        }
    }

    /// Module for `kind`, when one is implemented.
    pub fn get(&self, kind: GameKind) -> Option<&dyn GameModule> {
        self.modules
            .iter()
            .find(|module| module.kind() == kind)
            .map(|module| module.as_ref())
    }

    /// Whether selecting `kind` leads to a playable screen.
    pub fn is_registered(&self, kind: GameKind) -> bool {
        self.get(kind).is_some()
    }

    /// Initial payload for `kind`, falling back to the bare tag for unimplemented games.
    pub fn initial_data(&self, kind: GameKind, language: Language) -> GameData {
        match self.get(kind) {
            Some(module) => module.initial_data(language),
            None => GameData::placeholder(kind, language),
        }
    }
}

impl Default for GameRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn only_name_game_is_registered() {
        let registry = GameRegistry::builtin();
        assert!(registry.is_registered(GameKind::NameGame));
        assert!(!registry.is_registered(GameKind::SongGuess));
        assert!(!registry.is_registered(GameKind::Spy));
    }

    #[test]
    fn game_data_is_tagged_by_game() {
        let data = GameRegistry::builtin().initial_data(GameKind::NameGame, Language::En);
        assert_eq!(
            serde_json::to_value(&data).unwrap(),
            json!({"game": "name_game", "letter": "A"})
        );

        let spy = GameRegistry::builtin().initial_data(GameKind::Spy, Language::Fa);
        assert_eq!(serde_json::to_value(&spy).unwrap(), json!({"game": "spy"}));
        assert_eq!(spy.kind(), GameKind::Spy);
    }
}

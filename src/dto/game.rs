use serde::Serialize;
use utoipa::ToSchema;

use crate::games::ScoreEntry;

/// State of the naming round as shown on every device.
#[derive(Debug, Serialize, ToSchema)]
pub struct NameGameView {
    /// Letter every answer must start with.
    pub letter: String,
    pub round: u32,
    /// Seconds left on this device's countdown.
    pub remaining_secs: u64,
    /// Same, formatted `m:ss`.
    pub remaining_label: String,
    pub finished: bool,
    pub scoreboard: Vec<ScoreEntry>,
}

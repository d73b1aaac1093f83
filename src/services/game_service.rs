use crate::{
    dao::models::GameKind,
    dto::game::NameGameView,
    error::ServiceError,
    games::{GameData, NameGameData, scoreboard},
    links::format_time,
    state::{SharedState, view::Screen},
};

/// Naming round as seen from this device.
pub async fn name_game_view(state: &SharedState) -> Result<NameGameView, ServiceError> {
    let (session_id, language, players, remaining) = state
        .read_device(|device| {
            let playing = matches!(
                device.view.screen,
                Screen::Playing {
                    game: GameKind::NameGame
                }
            );
            let session = device.projection.session().filter(|_| playing)?;
            Some((
                session.id,
                session.language,
                scoreboard(device.projection.players()),
                device.round_timer.map(|timer| timer.remaining_secs()),
            ))
        })
        .await
        .ok_or_else(|| ServiceError::InvalidState("the naming round is not being played".into()))?;

    let latest = state
        .require_store()
        .await?
        .latest_game_state(session_id)
        .await?;
    let (round, letter) = match latest {
        Some(row) => match row.data {
            GameData::NameGame(data) => (row.round, data.letter),
            _ => (row.round, NameGameData::for_language(language).letter),
        },
        None => (1, NameGameData::for_language(language).letter),
    };

    let remaining_secs = remaining.unwrap_or(0);
    Ok(NameGameView {
        letter,
        round,
        remaining_secs,
        remaining_label: format_time(remaining_secs),
        finished: remaining_secs == 0,
        scoreboard: players,
    })
}

use std::{future::Future, sync::Arc, time::Duration};

use futures::future::BoxFuture;
use party_lobby::{
    config::AppConfig,
    dao::{
        lobby_store::{LobbyStore, memory::MemoryLobbyStore},
        models::{GameKind, PlayerStatus, RoundPhase, SessionStatus},
    },
    dto::host::{CreateSessionRequest, CreatedSession},
    error::{JoinRejection, ServiceError},
    games::GameData,
    realtime::{ChangeFeed, ChannelSpec, RawSubscription, RealtimeResult},
    services::{
        game_service, host_service, join_service, lobby_service, network_monitor, resume_service,
        view_service,
    },
    state::{
        AppState, SharedState,
        credentials::{CredentialStore, MemoryCredentialStore, StoredCredentials},
        view::Screen,
    },
};
use tokio::{sync::mpsc, time::sleep};
use uuid::Uuid;

fn test_config() -> AppConfig {
    AppConfig {
        heartbeat_interval: Duration::from_millis(20),
        ..AppConfig::default()
    }
}

fn device_with(
    store: &MemoryLobbyStore,
    config: AppConfig,
    credentials: MemoryCredentialStore,
) -> SharedState {
    AppState::new(
        config,
        Arc::new(store.clone()),
        Arc::new(store.hub()),
        Arc::new(credentials),
    )
}

fn device(store: &MemoryLobbyStore) -> SharedState {
    device_with(store, test_config(), MemoryCredentialStore::default())
}

/// Feed whose channels close as soon as they are opened.
struct ClosingFeed;

impl ChangeFeed for ClosingFeed {
    fn subscribe(&self, spec: ChannelSpec) -> BoxFuture<'static, RealtimeResult<RawSubscription>> {
        let (_sender, receiver) = mpsc::channel(1);
        Box::pin(async move { Ok(RawSubscription::new(spec.topic, receiver)) })
    }
}

fn device_on_closing_feed(store: &MemoryLobbyStore, resync_attempts: u32) -> SharedState {
    let config = AppConfig {
        resync_backoff: Duration::from_millis(20),
        resync_attempts,
        ..test_config()
    };
    AppState::new(
        config,
        Arc::new(store.clone()),
        Arc::new(ClosingFeed),
        Arc::new(MemoryCredentialStore::default()),
    )
}

async fn session_status(store: &MemoryLobbyStore, id: Uuid) -> (SessionStatus, Option<GameKind>) {
    let row = store.find_session(id).await.unwrap().unwrap();
    (row.status, row.current_game)
}

async fn last_seen(store: &MemoryLobbyStore, id: Uuid) -> time::OffsetDateTime {
    store.find_player(id).await.unwrap().unwrap().last_seen
}

/// Several heartbeat intervals pass without `last_seen` moving.
async fn assert_heartbeat_quiet(store: &MemoryLobbyStore, id: Uuid) {
    sleep(Duration::from_millis(40)).await;
    let seen = last_seen(store, id).await;
    sleep(Duration::from_millis(120)).await;
    assert_eq!(last_seen(store, id).await, seen);
}

async fn eventually<F, Fut>(what: &str, state: &SharedState, check: F)
where
    F: Fn(SharedState) -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check(state.clone()).await {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

async fn screen(state: &SharedState) -> Screen {
    view_service::current_view(state).await.view.screen
}

async fn create(host: &SharedState, max_players: Option<u8>) -> CreatedSession {
    host_service::create_session(
        host,
        CreateSessionRequest {
            max_players,
            ..Default::default()
        },
    )
    .await
    .unwrap()
}

async fn wait_connected(host: &SharedState, expected: usize) {
    eventually("host roster", host, |host| async move {
        host.read_device(|d| d.projection.connected_count()).await == expected
    })
    .await;
}

#[tokio::test]
async fn host_and_players_reach_the_naming_round() {
    let store = MemoryLobbyStore::new();
    let host = device(&store);
    let created = create(&host, None).await;
    assert_eq!(created.room_code.len(), 6);
    assert_eq!(created.view.view.screen, Screen::HostLobby);
    assert!(created.join_url.ends_with(&format!("/join/{}", created.room_code)));

    let sam = device(&store);
    let joined = join_service::join(&sam, &created.room_code.to_lowercase(), "  Sam  ")
        .await
        .unwrap();
    assert_eq!(joined.nickname, "Sam");
    assert_eq!(joined.view.view.screen, Screen::PlayerLobby);

    let kim = device(&store);
    join_service::join(&kim, &created.room_code, "Kim").await.unwrap();
    wait_connected(&host, 2).await;

    let started = host_service::start_game(&host).await.unwrap();
    assert_eq!(started.view.screen, Screen::HostLobby);
    assert!(started.view.tutorial_overlay);
    assert_eq!(
        session_status(&store, created.session_id).await,
        (SessionStatus::Tutorial, None)
    );
    eventually("player tutorial overlay", &sam, |sam| async move {
        view_service::current_view(&sam).await.view.tutorial_overlay
    })
    .await;

    let done = view_service::tutorial_skip(&host).await.unwrap();
    assert_eq!(done.view.view.screen, Screen::GameSelect);
    assert_eq!(
        session_status(&store, created.session_id).await,
        (SessionStatus::Playing, None)
    );
    eventually("player awaiting game", &sam, |sam| async move {
        screen(&sam).await == Screen::AwaitingGame
    })
    .await;
    assert!(!view_service::current_view(&sam).await.view.tutorial_overlay);

    let playing = host_service::select_game(&host, GameKind::NameGame)
        .await
        .unwrap();
    let name_game = Screen::Playing {
        game: GameKind::NameGame,
    };
    assert_eq!(playing.view.screen, name_game);
    assert_eq!(
        session_status(&store, created.session_id).await,
        (SessionStatus::Playing, Some(GameKind::NameGame))
    );
    eventually("player playing", &kim, |kim| async move {
        screen(&kim).await
            == Screen::Playing {
                game: GameKind::NameGame,
            }
    })
    .await;

    let rounds = store.game_states().await;
    assert_eq!(rounds.len(), 1);
    assert_eq!(rounds[0].round, 1);
    assert_eq!(rounds[0].phase, RoundPhase::Waiting);
    assert!(matches!(&rounds[0].data, GameData::NameGame(data) if data.letter == "ک"));

    let round = game_service::name_game_view(&kim).await.unwrap();
    assert_eq!(round.letter, "ک");
    assert!(round.remaining_secs > 55 && round.remaining_secs <= 60);
    assert_eq!(round.scoreboard.len(), 2);
    assert!(round.scoreboard[0].leader);

    let events: Vec<String> = store
        .telemetry_events()
        .await
        .into_iter()
        .map(|event| event.event_type)
        .collect();
    for expected in [
        "session_created",
        "player_joined",
        "game_started",
        "tutorial_completed",
        "game_selected",
    ] {
        assert!(events.iter().any(|e| e == expected), "missing {expected}");
    }
}

#[tokio::test]
async fn start_needs_two_players() {
    let store = MemoryLobbyStore::new();
    let host = device(&store);
    let created = create(&host, None).await;

    let sam = device(&store);
    join_service::join(&sam, &created.room_code, "Sam").await.unwrap();
    wait_connected(&host, 1).await;

    let err = host_service::start_game(&host).await.unwrap_err();
    assert!(matches!(err, ServiceError::InvalidState(_)));
}

#[tokio::test]
async fn full_room_rejects_the_next_player() {
    let store = MemoryLobbyStore::new();
    let host = device(&store);
    let created = create(&host, Some(2)).await;

    for nickname in ["Sam", "Kim"] {
        join_service::join(&device(&store), &created.room_code, nickname)
            .await
            .unwrap();
    }

    let credentials = MemoryCredentialStore::default();
    let lou = device_with(&store, test_config(), credentials.clone());
    let err = join_service::join(&lou, &created.room_code, "Lou")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Join(JoinRejection::RoomFull)));

    let seated = store.list_players(created.session_id).await.unwrap();
    assert_eq!(seated.len(), 2);
    assert!(seated.iter().all(|player| player.nickname != "Lou"));
    assert_eq!(credentials.load().await.unwrap(), StoredCredentials::default());
    assert!(!lou.liveness_running().await);
}

#[tokio::test]
async fn started_session_rejects_joins() {
    let store = MemoryLobbyStore::new();
    let host = device(&store);
    let created = create(&host, None).await;
    for nickname in ["Sam", "Kim"] {
        join_service::join(&device(&store), &created.room_code, nickname)
            .await
            .unwrap();
    }
    wait_connected(&host, 2).await;
    host_service::start_game(&host).await.unwrap();

    let err = join_service::join(&device(&store), &created.room_code, "Lou")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Join(JoinRejection::AlreadyStarted)));
}

#[tokio::test]
async fn bad_code_and_blank_nickname_are_rejected() {
    let store = MemoryLobbyStore::new();
    let host = device(&store);
    let created = create(&host, None).await;
    let player = device(&store);

    let err = join_service::join(&player, "ZZZZZZ", "Sam").await.unwrap_err();
    assert!(matches!(err, ServiceError::Join(JoinRejection::InvalidCode)));

    let err = join_service::join(&player, "AB-3", "Sam").await.unwrap_err();
    assert!(matches!(err, ServiceError::Join(JoinRejection::InvalidCode)));

    let err = join_service::join(&player, &created.room_code, "   ")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Join(JoinRejection::EmptyNickname)));
}

#[tokio::test]
async fn kicked_player_is_removed_and_stops_heartbeat() {
    let store = MemoryLobbyStore::new();
    let host = device(&store);
    let created = create(&host, None).await;

    let sam = device(&store);
    let joined = join_service::join(&sam, &created.room_code, "Sam").await.unwrap();
    assert!(sam.liveness_running().await);
    wait_connected(&host, 1).await;

    let lobby = host_service::kick_player(&host, joined.id).await.unwrap();
    assert_eq!(lobby.connected, 0);
    assert_eq!(lobby.players[0].status, PlayerStatus::Kicked);

    eventually("player removed", &sam, |sam| async move {
        screen(&sam).await == Screen::Removed
    })
    .await;
    eventually("heartbeat stopped", &sam, |sam| async move {
        !sam.liveness_running().await
    })
    .await;

    let again = host_service::kick_player(&host, joined.id).await.unwrap_err();
    assert!(matches!(again, ServiceError::InvalidState(_)));
}

#[tokio::test]
async fn kick_reaches_a_player_whose_feed_keeps_closing() {
    let store = MemoryLobbyStore::new();
    let host = device(&store);
    let created = create(&host, None).await;

    let sam = device_on_closing_feed(&store, 6);
    let joined = join_service::join(&sam, &created.room_code, "Sam").await.unwrap();
    wait_connected(&host, 1).await;
    host_service::kick_player(&host, joined.id).await.unwrap();

    eventually("player removed", &sam, |sam| async move {
        screen(&sam).await == Screen::Removed
    })
    .await;
    eventually("heartbeat stopped", &sam, |sam| async move {
        !sam.liveness_running().await
    })
    .await;

    assert_heartbeat_quiet(&store, joined.id).await;
}

#[tokio::test]
async fn unreachable_feed_sends_the_player_home() {
    let store = MemoryLobbyStore::new();
    let host = device(&store);
    let created = create(&host, None).await;

    let sam = device_on_closing_feed(&store, 2);
    let joined = join_service::join(&sam, &created.room_code, "Sam").await.unwrap();
    assert_eq!(joined.view.view.screen, Screen::PlayerLobby);

    eventually("player sent home", &sam, |sam| async move {
        screen(&sam).await == Screen::Home
    })
    .await;
    assert!(!sam.liveness_running().await);

    assert_heartbeat_quiet(&store, joined.id).await;
}

#[tokio::test]
async fn ending_the_session_reaches_every_device() {
    let store = MemoryLobbyStore::new();
    let host_credentials = MemoryCredentialStore::default();
    let host = device_with(&store, test_config(), host_credentials.clone());
    let created = create(&host, None).await;

    let sam = device(&store);
    let joined = join_service::join(&sam, &created.room_code, "Sam").await.unwrap();
    let kim = device(&store);
    join_service::join(&kim, &created.room_code, "Kim").await.unwrap();
    wait_connected(&host, 2).await;
    host_service::start_game(&host).await.unwrap();

    let ended = host_service::end_session(&host).await.unwrap();
    assert_eq!(ended.view.screen, Screen::Ended);
    assert_eq!(
        session_status(&store, created.session_id).await,
        (SessionStatus::Ended, None)
    );
    assert_eq!(
        host_credentials.load().await.unwrap(),
        StoredCredentials::default()
    );

    for player in [&sam, &kim] {
        eventually("player sees the end", player, |player| async move {
            screen(&player).await == Screen::Ended
        })
        .await;
        eventually("heartbeat stopped", player, |player| async move {
            !player.liveness_running().await
        })
        .await;
    }

    assert_heartbeat_quiet(&store, joined.id).await;
}

#[tokio::test]
async fn host_resume_is_idempotent() {
    let store = MemoryLobbyStore::new();
    let credentials = MemoryCredentialStore::default();
    let host = device_with(&store, test_config(), credentials.clone());
    let created = create(&host, None).await;

    let restarted = device_with(&store, test_config(), credentials);
    let first = resume_service::resume(&restarted, None).await.unwrap();
    let second = resume_service::resume(&restarted, None).await.unwrap();

    assert_eq!(first.view.screen, Screen::HostLobby);
    assert_eq!(second.view.screen, Screen::HostLobby);
    assert_eq!(first.session_id, Some(created.session_id));
    assert_eq!(second.session_id, Some(created.session_id));
}

#[tokio::test]
async fn expired_hosted_session_resumes_home() {
    let store = MemoryLobbyStore::new();
    let credentials = MemoryCredentialStore::default();
    let config = AppConfig {
        session_ttl: Duration::ZERO,
        ..test_config()
    };
    let host = device_with(&store, config, credentials.clone());
    create(&host, None).await;
    sleep(Duration::from_millis(5)).await;

    let restarted = device_with(&store, test_config(), credentials);
    let view = resume_service::resume(&restarted, None).await.unwrap();
    assert_eq!(view.view.screen, Screen::Home);
}

#[tokio::test]
async fn player_resume_restores_lobby_and_heartbeat() {
    let store = MemoryLobbyStore::new();
    let host = device(&store);
    let created = create(&host, None).await;

    let credentials = MemoryCredentialStore::default();
    let sam = device_with(&store, test_config(), credentials.clone());
    join_service::join(&sam, &created.room_code, "Sam").await.unwrap();

    let restarted = device_with(&store, test_config(), credentials);
    let view = resume_service::resume(&restarted, None).await.unwrap();
    assert_eq!(view.view.screen, Screen::PlayerLobby);
    assert!(restarted.liveness_running().await);
}

#[tokio::test]
async fn join_link_wins_over_stored_credentials() {
    let store = MemoryLobbyStore::new();
    let credentials = MemoryCredentialStore::default();
    let host = device_with(&store, test_config(), credentials.clone());
    create(&host, None).await;

    let restarted = device_with(&store, test_config(), credentials);
    let view = resume_service::resume(&restarted, Some("/join/ab3x7k"))
        .await
        .unwrap();
    assert_eq!(
        view.view.screen,
        Screen::PlayerJoin {
            room_code: "AB3X7K".into()
        }
    );
}

#[tokio::test]
async fn leaving_frees_the_seat_and_forgets_credentials() {
    let store = MemoryLobbyStore::new();
    let host = device(&store);
    let created = create(&host, Some(2)).await;

    let credentials = MemoryCredentialStore::default();
    let sam = device_with(&store, test_config(), credentials.clone());
    join_service::join(&sam, &created.room_code, "Sam").await.unwrap();
    wait_connected(&host, 1).await;

    let view = lobby_service::leave(&sam).await.unwrap();
    assert_eq!(view.view.screen, Screen::Home);
    assert!(!sam.liveness_running().await);
    assert_eq!(credentials.load().await.unwrap(), StoredCredentials::default());
    wait_connected(&host, 0).await;
}

#[tokio::test]
async fn degraded_device_refuses_writes() {
    let store = MemoryLobbyStore::new();
    let host = device(&store);

    store.set_online(false);
    network_monitor::probe(&host).await;
    assert!(host.is_degraded());

    let err = host_service::create_session(&host, CreateSessionRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Degraded));

    store.set_online(true);
    network_monitor::probe(&host).await;
    assert!(!host.is_degraded());
    create(&host, None).await;
}

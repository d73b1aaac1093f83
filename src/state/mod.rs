pub mod credentials;
pub mod projection;
mod sse;
pub mod state_machine;
pub mod tutorial;
pub mod view;

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use tokio::sync::{Mutex, RwLock, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    codes::WordFilter,
    config::AppConfig,
    dao::{
        lobby_store::LobbyStore,
        models::{GameKind, PlayerPatch, PlayerRow, SessionPatch, SessionStatus},
    },
    error::ServiceError,
    games::{GameRegistry, RoundTimer},
    realtime::{ChangeEvent, ChangeFeed, ChangeKind},
    services::{liveness::LivenessHandle, network_monitor::NetworkReport},
};

pub use self::sse::SseHub;
pub use self::state_machine::{AbortError, ApplyError, Plan, PlanError, PlanId, Snapshot};
use self::{
    credentials::{CredentialStore, DeviceCredentials},
    projection::LobbyProjection,
    state_machine::{SessionEvent, SessionPhase, SessionStateMachine},
    tutorial::TutorialTour,
    view::{Role, Screen, ViewInput, ViewState, resolve},
};

pub type SharedState = Arc<AppState>;
pub const DEFAULT_TRANSITION_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything this device knows about the session it is attached to.
#[derive(Debug, Default)]
pub struct DeviceSession {
    /// Credentials resolved at resume, create or join.
    pub credentials: Option<DeviceCredentials>,
    /// Synchronized copy of the session and roster.
    pub projection: LobbyProjection,
    /// Screen currently published.
    pub view: ViewState,
    /// Onboarding overlay cursor.
    pub tutorial: TutorialTour,
    /// Set once this device closed the overlay for the current tutorial.
    pub tutorial_dismissed: bool,
    /// Countdown of the naming round, running while that game is on screen.
    pub round_timer: Option<RoundTimer>,
}

impl DeviceSession {
    /// Role derived from the held credentials.
    pub fn role(&self) -> Option<Role> {
        match self.credentials.as_ref()? {
            DeviceCredentials::Host { .. } => Some(Role::Host),
            DeviceCredentials::Player { .. } => Some(Role::Player),
            DeviceCredentials::None => None,
        }
    }

    /// Datastore id of the local player row, players only.
    pub fn player_db_id(&self) -> Option<Uuid> {
        match self.credentials.as_ref()? {
            DeviceCredentials::Player { player_db_id, .. } => Some(*player_db_id),
            _ => None,
        }
    }

    /// The local player's row as last synchronized.
    pub fn local_player(&self) -> Option<&PlayerRow> {
        self.projection.player(self.player_db_id()?)
    }

    /// Whether the local player was removed by the host.
    pub fn is_removed(&self) -> bool {
        self.local_player().is_some_and(PlayerRow::is_kicked)
    }

    /// Whether nothing is left to do in the attached session: the local
    /// player was removed or the session ended.
    pub fn is_finished(&self) -> bool {
        self.is_removed()
            || self
                .projection
                .session()
                .is_some_and(|session| session.status == SessionStatus::Ended)
    }

    /// Re-run view resolution against the projection. Returns whether the view changed.
    pub fn refresh_view(&mut self, registry: &GameRegistry, round_duration: Duration) -> bool {
        let (Some(role), Some(session)) = (self.role(), self.projection.session()) else {
            return false;
        };

        if session.status != SessionStatus::Tutorial {
            self.tutorial = TutorialTour::new();
            self.tutorial_dismissed = false;
        }

        let next = resolve(ViewInput {
            role,
            session,
            local_player: self.local_player(),
            previous: &self.view.screen,
            tutorial_dismissed: self.tutorial_dismissed,
            registry,
        });

        let playing_name_game = |screen: &Screen| {
            matches!(
                screen,
                Screen::Playing {
                    game: GameKind::NameGame
                }
            )
        };
        match (
            playing_name_game(&self.view.screen),
            playing_name_game(&next.screen),
        ) {
            (false, true) => self.round_timer = Some(RoundTimer::start(round_duration)),
            (_, false) => self.round_timer = None,
            (true, true) => {}
        }

        if next == self.view {
            return false;
        }
        self.view = next;
        true
    }

    /// Fold a write this device just made into the projection, ahead of its
    /// change-feed echo.
    pub fn patch_session(&mut self, patch: &SessionPatch) -> bool {
        let Some(mut row) = self.projection.session().cloned() else {
            return false;
        };
        patch.apply_to(&mut row);
        self.projection.apply_session(ChangeEvent {
            kind: ChangeKind::Update,
            row: Some(row),
            old_id: None,
        })
    }

    /// Same as [`DeviceSession::patch_session`] for a roster entry.
    pub fn patch_player(&mut self, id: Uuid, patch: &PlayerPatch) -> bool {
        let Some(mut row) = self.projection.player(id).cloned() else {
            return false;
        };
        patch.apply_to(&mut row);
        self.projection.apply_player(ChangeEvent {
            kind: ChangeKind::Update,
            row: Some(row),
            old_id: None,
        })
    }

    /// Drop the session and show `view`.
    pub fn detach(&mut self, view: ViewState) {
        self.credentials = None;
        self.projection.clear();
        self.tutorial = TutorialTour::new();
        self.tutorial_dismissed = false;
        self.round_timer = None;
        self.view = view;
    }
}

/// Central device state: datastore handles, the session projection and the
/// background tasks keeping it synchronized.
pub struct AppState {
    config: AppConfig,
    store: Arc<dyn LobbyStore>,
    feed: Arc<dyn ChangeFeed>,
    credential_store: Arc<dyn CredentialStore>,
    filter: WordFilter,
    registry: GameRegistry,
    device: RwLock<DeviceSession>,
    machine: RwLock<SessionStateMachine>,
    sse: SseHub,
    degraded: watch::Sender<bool>,
    network: RwLock<Option<NetworkReport>>,
    transition_gate: Mutex<()>,
    transition_timeout: Option<Duration>,
    sync_epoch: AtomicU64,
    sync_task: Mutex<Option<JoinHandle<()>>>,
    liveness: Mutex<Option<LivenessHandle>>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    pub fn new(
        config: AppConfig,
        store: Arc<dyn LobbyStore>,
        feed: Arc<dyn ChangeFeed>,
        credential_store: Arc<dyn CredentialStore>,
    ) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(false);
        let filter = WordFilter::new(&config.banned_words, config.mask.clone());
        Arc::new(Self {
            config,
            store,
            feed,
            credential_store,
            filter,
            registry: GameRegistry::builtin(),
            device: RwLock::new(DeviceSession::default()),
            machine: RwLock::new(SessionStateMachine::new()),
            sse: SseHub::new(32),
            degraded: degraded_tx,
            network: RwLock::new(None),
            transition_gate: Mutex::new(()),
            transition_timeout: Some(DEFAULT_TRANSITION_TIMEOUT),
            sync_epoch: AtomicU64::new(0),
            sync_task: Mutex::new(None),
            liveness: Mutex::new(None),
        })
    }

    /// Runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Datastore handle, regardless of connectivity.
    pub fn store(&self) -> Arc<dyn LobbyStore> {
        self.store.clone()
    }

    /// Datastore handle, refused while the device is degraded.
    pub async fn require_store(&self) -> Result<Arc<dyn LobbyStore>, ServiceError> {
        if self.is_degraded() {
            return Err(ServiceError::Degraded);
        }
        Ok(self.store.clone())
    }

    /// Change feed used by the reconciliation loop.
    pub fn feed(&self) -> Arc<dyn ChangeFeed> {
        self.feed.clone()
    }

    /// Local credential persistence.
    pub fn credential_store(&self) -> Arc<dyn CredentialStore> {
        self.credential_store.clone()
    }

    /// Nickname filter built from the configuration.
    pub fn word_filter(&self) -> &WordFilter {
        &self.filter
    }

    /// Registered game modules.
    pub fn registry(&self) -> &GameRegistry {
        &self.registry
    }

    /// Session data of this device.
    pub fn device(&self) -> &RwLock<DeviceSession> {
        &self.device
    }

    /// Run `f` against the device session under a read lock.
    pub async fn read_device<R>(&self, f: impl FnOnce(&DeviceSession) -> R) -> R {
        let guard = self.device.read().await;
        f(&guard)
    }

    /// Broadcast hub used for the view SSE stream.
    pub fn sse(&self) -> &SseHub {
        &self.sse
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update the degraded flag. Returns whether it changed.
    pub fn update_degraded(&self, value: bool) -> bool {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        })
    }

    /// Last network measurement.
    pub async fn network(&self) -> Option<NetworkReport> {
        *self.network.read().await
    }

    /// Record a network measurement.
    pub async fn set_network(&self, report: NetworkReport) {
        *self.network.write().await = Some(report);
    }

    /// Snapshot the session state machine.
    pub async fn snapshot(&self) -> Snapshot {
        self.machine.read().await.snapshot()
    }

    /// Adopt the phase observed on the datastore.
    pub async fn sync_phase(&self, phase: SessionPhase) -> bool {
        self.machine.write().await.sync(phase)
    }

    /// Detach the state machine from its session.
    pub async fn reset_phase(&self) {
        self.machine.write().await.reset();
    }

    /// Start a new synchronization epoch, stopping the loop of the previous one.
    pub async fn begin_sync_epoch(&self) -> u64 {
        let epoch = self.sync_epoch.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(task) = self.sync_task.lock().await.take() {
            task.abort();
        }
        debug!(epoch, "sync epoch started");
        epoch
    }

    /// Whether results started under `epoch` may still be applied.
    pub fn is_current_epoch(&self, epoch: u64) -> bool {
        self.sync_epoch.load(Ordering::SeqCst) == epoch
    }

    /// Move a running loop to the next epoch while keeping its task registered.
    /// Returns `None` once another attach or detach superseded `epoch`.
    pub fn renew_sync_epoch(&self, epoch: u64) -> Option<u64> {
        self.sync_epoch
            .compare_exchange(epoch, epoch + 1, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| epoch + 1)
    }

    /// Spawn the reconciliation loop of `epoch` and keep its handle so
    /// teardown can stop it. Nothing is spawned for a superseded epoch.
    pub async fn spawn_sync_task<F>(&self, epoch: u64, task: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let mut guard = self.sync_task.lock().await;
        if !self.is_current_epoch(epoch) {
            return;
        }
        if let Some(previous) = guard.replace(tokio::spawn(task)) {
            previous.abort();
        }
    }

    /// Register the heartbeat task, stopping any previous one.
    pub async fn install_liveness(&self, handle: LivenessHandle) {
        if let Some(previous) = self.liveness.lock().await.replace(handle) {
            previous.stop();
        }
    }

    /// Stop the heartbeat task, if running.
    pub async fn stop_liveness(&self) {
        if let Some(handle) = self.liveness.lock().await.take() {
            handle.stop();
        }
    }

    /// Whether a heartbeat task is currently registered and alive.
    pub async fn liveness_running(&self) -> bool {
        self.liveness
            .lock()
            .await
            .as_ref()
            .is_some_and(LivenessHandle::is_running)
    }

    /// Plan a transition on the session state machine, returning the plan.
    async fn plan_transition(&self, event: SessionEvent) -> Result<Plan, PlanError> {
        let mut sm = self.machine.write().await;
        sm.plan(event)
    }

    /// Apply the planned transition, returning the next phase.
    async fn apply_planned_transition(&self, plan_id: PlanId) -> Result<SessionPhase, ApplyError> {
        let mut sm = self.machine.write().await;
        sm.apply(plan_id)
    }

    /// Abort a planned transition of the session state machine.
    async fn abort_transition(&self, plan_id: PlanId) -> Result<(), AbortError> {
        let mut sm = self.machine.write().await;
        sm.abort(plan_id)
    }

    /// Plan `event`, run the remote write `work` under the transition timeout,
    /// then apply the plan on success or abort it on failure. Host writes are
    /// serialized by the transition gate.
    pub async fn run_transition<F, Fut, T>(
        &self,
        event: SessionEvent,
        work: F,
    ) -> Result<(T, SessionPhase), ServiceError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, ServiceError>>,
    {
        let gate = self.transition_gate.lock().await;
        let Plan { id: plan_id, .. } = self.plan_transition(event).await?;

        let work_future = work();
        let outcome = if let Some(limit) = self.transition_timeout {
            match timeout(limit, work_future).await {
                Ok(result) => result,
                Err(_) => {
                    if let Err(abort_err) = self.abort_transition(plan_id).await {
                        warn!(
                            event = ?event,
                            plan_id = %plan_id,
                            error = ?abort_err,
                            "failed to abort transition after timeout"
                        );
                    }
                    drop(gate);
                    return Err(ServiceError::Timeout);
                }
            }
        } else {
            work_future.await
        };

        match outcome {
            Ok(value) => {
                let next = self.apply_planned_transition(plan_id).await?;
                drop(gate);
                Ok((value, next))
            }
            Err(err) => {
                if let Err(abort_err) = self.abort_transition(plan_id).await {
                    warn!(
                        event = ?event,
                        plan_id = %plan_id,
                        error = ?abort_err,
                        "failed to abort transition after work error"
                    );
                }
                drop(gate);
                Err(err)
            }
        }
    }
}

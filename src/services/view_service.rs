use tracing::debug;

use crate::{
    dto::view::{TutorialResponse, ViewResponse},
    error::ServiceError,
    services::{host_service, network_monitor::NetworkReport, sse_events},
    state::{
        DeviceSession, SharedState,
        tutorial::{TutorialProgress, TutorialTour},
        view::Role,
    },
};

/// Current view with its device context.
pub async fn current_view(state: &SharedState) -> ViewResponse {
    let network = state.network().await;
    let degraded = state.is_degraded();
    state
        .read_device(|device| view_response(device, degraded, network))
        .await
}

pub(crate) fn view_response(
    device: &DeviceSession,
    degraded: bool,
    network: Option<NetworkReport>,
) -> ViewResponse {
    ViewResponse {
        view: device.view.clone(),
        role: device.role(),
        session_id: device.credentials.as_ref().and_then(|c| c.session_id()),
        room_code: device.projection.session().map(|s| s.room_code.clone()),
        tutorial: device
            .view
            .tutorial_overlay
            .then(|| device.tutorial.progress()),
        degraded,
        network,
    }
}

/// Advance the tutorial overlay by one step.
pub async fn tutorial_next(state: &SharedState) -> Result<TutorialResponse, ServiceError> {
    advance(state, TutorialTour::next).await
}

/// Close the tutorial overlay.
pub async fn tutorial_skip(state: &SharedState) -> Result<TutorialResponse, ServiceError> {
    advance(state, TutorialTour::skip).await
}

async fn advance(
    state: &SharedState,
    step: fn(&mut TutorialTour) -> TutorialProgress,
) -> Result<TutorialResponse, ServiceError> {
    let (progress, role) = {
        let mut device = state.device().write().await;
        if !device.view.tutorial_overlay {
            return Err(ServiceError::InvalidState(
                "no tutorial is being shown".into(),
            ));
        }
        let progress = step(&mut device.tutorial);
        (progress, device.role())
    };

    if progress == TutorialProgress::Completed {
        match role {
            Some(Role::Host) => host_service::complete_tutorial(state).await?,
            _ => {
                let changed = {
                    let mut device = state.device().write().await;
                    device.tutorial_dismissed = true;
                    device.refresh_view(state.registry(), state.config().round_duration)
                };
                debug!("tutorial dismissed on this device");
                if changed {
                    sse_events::broadcast_view(state).await;
                }
            }
        }
    }

    Ok(TutorialResponse {
        progress,
        view: current_view(state).await,
    })
}

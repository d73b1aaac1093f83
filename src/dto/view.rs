use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    services::network_monitor::NetworkReport,
    state::{
        tutorial::TutorialProgress,
        view::{Role, ViewState},
    },
};

/// What the presentation layer renders, plus the device context around it.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ViewResponse {
    /// Screen and overlay to render.
    pub view: ViewState,
    /// Side of the session this device is on, absent without a session.
    pub role: Option<Role>,
    /// Attached session.
    pub session_id: Option<Uuid>,
    /// Room code of the attached session.
    pub room_code: Option<String>,
    /// Tutorial cursor, only while the overlay is shown.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tutorial: Option<TutorialProgress>,
    /// Whether writes are currently refused.
    pub degraded: bool,
    /// Last link quality measurement.
    pub network: Option<NetworkReport>,
}

/// Result of a tutorial step.
#[derive(Debug, Serialize, ToSchema)]
pub struct TutorialResponse {
    pub progress: TutorialProgress,
    pub view: ViewResponse,
}

use serde::Serialize;
use utoipa::ToSchema;

/// Number of onboarding steps.
pub const TUTORIAL_STEPS: usize = 4;

/// Where the onboarding overlay stands after a user action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TutorialProgress {
    /// Showing step `step` (0-based) of `total`.
    Step { step: usize, total: usize },
    /// Finished or skipped.
    Completed,
}

/// Onboarding overlay cursor, local to the device.
#[derive(Debug, Clone, Default)]
pub struct TutorialTour {
    step: usize,
    completed: bool,
}

impl TutorialTour {
    /// Tour positioned on its first step.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current position.
    pub fn progress(&self) -> TutorialProgress {
        if self.completed {
            TutorialProgress::Completed
        } else {
            TutorialProgress::Step {
                step: self.step,
                total: TUTORIAL_STEPS,
            }
        }
    }

    /// Advance one step; moving past the last step completes the tour.
    pub fn next(&mut self) -> TutorialProgress {
        if !self.completed {
            if self.step + 1 < TUTORIAL_STEPS {
                self.step += 1;
            } else {
                self.completed = true;
            }
        }
        self.progress()
    }

    /// Complete the tour immediately.
    pub fn skip(&mut self) -> TutorialProgress {
        self.completed = true;
        self.progress()
    }
}

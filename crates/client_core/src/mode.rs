use dp_shared::domain::Mode;
use tracing::info;

/// Exclusive noise/ml switch. Switching never touches builders, the held
/// file or previous results.
#[derive(Debug, Default)]
pub struct ModeSelector {
    mode: Mode,
}

impl ModeSelector {
    pub fn set_mode(&mut self, mode: Mode) {
        if self.mode != mode {
            info!(from = %self.mode, to = %mode, "mode switched");
        }
        self.mode = mode;
    }

    pub fn current(&self) -> Mode {
        self.mode
    }
}

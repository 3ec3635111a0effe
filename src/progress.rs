use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Spinner on stderr while a command waits on the server. Hidden when
/// disabled, so callers never need to branch on it.
pub struct Activity {
    enabled: bool,
    bar: ProgressBar,
}

impl Activity {
    pub fn new(enabled: bool) -> Arc<Self> {
        if !enabled {
            return Arc::new(Self {
                enabled: false,
                bar: ProgressBar::hidden(),
            });
        }

        let bar = ProgressBar::with_draw_target(None, ProgressDrawTarget::stderr());
        if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}  [{elapsed}]") {
            bar.set_style(style);
        }
        bar.enable_steady_tick(Duration::from_millis(100));
        Arc::new(Self { enabled: true, bar })
    }

    pub fn set_stage(&self, msg: impl Into<String>) {
        if !self.enabled {
            return;
        }
        self.bar.set_message(msg.into());
    }

    pub fn finish(&self) {
        if !self.enabled {
            return;
        }
        self.bar.finish_and_clear();
    }
}

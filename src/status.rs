use std::time::{Duration, Instant};

pub const DEFAULT_CLEAR_DELAY: Duration = Duration::from_secs(3);

/// Upload feedback line shown above the input box.
///
/// A transient status schedules its own clear. Every update replaces the
/// schedule, so a clear left over from an older status never wipes a newer one.
#[derive(Debug, Clone)]
pub struct StatusBanner {
    text: String,
    clear_at: Option<Instant>,
    delay: Duration,
}

impl StatusBanner {
    pub fn new(delay: Duration) -> Self {
        Self {
            text: String::new(),
            clear_at: None,
            delay,
        }
    }

    pub fn text(&self) -> Option<&str> {
        if self.text.is_empty() {
            None
        } else {
            Some(&self.text)
        }
    }

    /// Show `text` until something replaces it.
    pub fn set(&mut self, text: impl Into<String>) {
        self.text = text.into();
        self.clear_at = None;
    }

    /// Show `text` and schedule it to clear after the configured delay.
    pub fn flash(&mut self, text: impl Into<String>, now: Instant) {
        self.text = text.into();
        self.clear_at = Some(now + self.delay);
    }

    /// Clear the status if its scheduled time has come. Returns true when cleared.
    pub fn expire(&mut self, now: Instant) -> bool {
        match self.clear_at {
            Some(deadline) if now >= deadline => {
                self.clear();
                true
            }
            _ => false,
        }
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.clear_at = None;
    }
}

impl Default for StatusBanner {
    fn default() -> Self {
        Self::new(DEFAULT_CLEAR_DELAY)
    }
}

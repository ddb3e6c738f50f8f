use std::time::Duration;

use tracing::debug;

use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealState {
    /// No content to show.
    Idle,
    Revealing,
    Complete,
    /// "Need more content" was raised; waiting for the next page.
    Generating,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealEvent {
    Completed,
    NeedMoreContent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevealTiming {
    pub tick: Duration,
    pub continuation_delay: Duration,
}

impl Default for RevealTiming {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(20),
            continuation_delay: Duration::from_secs(4),
        }
    }
}

impl From<&Config> for RevealTiming {
    fn from(config: &Config) -> Self {
        Self {
            tick: config.reveal_tick,
            continuation_delay: config.continuation_delay,
        }
    }
}

/// Typewriter reveal of the current page plus the "reader is done" timer.
///
/// Time only moves through [`advance`](Self::advance), so the caller owns the
/// clock: a frame loop passes real elapsed time, tests pass virtual time.
#[derive(Debug, Clone)]
pub struct RevealEngine {
    timing: RevealTiming,
    content: String,
    total: usize,
    revealed: usize,
    state: RevealState,
    tick_carry: Duration,
    /// Time spent in `Complete` while the continuation timer is armed.
    waited: Option<Duration>,
}

fn ticks(tick: Duration, n: usize) -> Duration {
    tick.saturating_mul(u32::try_from(n).unwrap_or(u32::MAX))
}

impl RevealEngine {
    pub fn new(timing: RevealTiming) -> Self {
        Self {
            timing,
            content: String::new(),
            total: 0,
            revealed: 0,
            state: RevealState::Idle,
            tick_carry: Duration::ZERO,
            waited: None,
        }
    }

    pub fn state(&self) -> RevealState {
        self.state
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Revealed length in characters.
    pub fn revealed_len(&self) -> usize {
        self.revealed
    }

    pub fn content_len(&self) -> usize {
        self.total
    }

    pub fn is_generating(&self) -> bool {
        self.state == RevealState::Generating
    }

    pub fn revealed_text(&self) -> &str {
        let end = self
            .content
            .char_indices()
            .nth(self.revealed)
            .map(|(i, _)| i)
            .unwrap_or(self.content.len());
        &self.content[..end]
    }

    /// Deliver page content. A different string restarts the reveal from
    /// zero; the same string only ends a pending generation. Returns whether
    /// the content changed.
    pub fn set_content(&mut self, content: impl Into<String>) -> bool {
        let content = content.into();

        if content == self.content {
            if self.state == RevealState::Generating {
                self.settle();
            }
            return false;
        }

        self.restart(content);
        true
    }

    /// Reveal `content` from the first character, even when it matches what
    /// is already shown (a new page can repeat the previous page's text).
    pub fn restart(&mut self, content: impl Into<String>) {
        let content = content.into();
        self.total = content.chars().count();
        self.content = content;
        self.revealed = 0;
        self.tick_carry = Duration::ZERO;
        self.waited = None;
        self.state = if self.total == 0 {
            RevealState::Idle
        } else {
            RevealState::Revealing
        };

        debug!(chars = self.total, "reveal restarted");
    }

    fn settle(&mut self) {
        if self.total == 0 {
            self.state = RevealState::Idle;
        } else if self.revealed < self.total {
            self.state = RevealState::Revealing;
        } else {
            self.enter_complete();
        }
    }

    fn enter_complete(&mut self) {
        self.state = RevealState::Complete;
        self.waited = Some(Duration::ZERO);
    }

    /// Skip the continuation wait (manual "next page"). Ignored while a
    /// generation is already pending.
    pub fn request_more(&mut self) -> bool {
        if self.state == RevealState::Generating {
            return false;
        }
        self.waited = None;
        self.state = RevealState::Generating;
        true
    }

    pub fn advance(&mut self, elapsed: Duration) -> Vec<RevealEvent> {
        let mut events = Vec::new();
        let mut elapsed = elapsed;

        if self.state == RevealState::Revealing {
            let budget = self.tick_carry + elapsed;
            let tick_nanos = self.timing.tick.as_nanos().max(1);
            let available = usize::try_from(budget.as_nanos() / tick_nanos).unwrap_or(usize::MAX);
            let remaining = self.total - self.revealed;

            if available < remaining {
                self.revealed += available;
                self.tick_carry = budget.saturating_sub(ticks(self.timing.tick, available));
                return events;
            }

            self.revealed = self.total;
            self.tick_carry = Duration::ZERO;
            // Time left over after the last character counts toward the wait.
            elapsed = budget.saturating_sub(ticks(self.timing.tick, remaining));
            self.enter_complete();
            events.push(RevealEvent::Completed);
        }

        if self.state == RevealState::Complete {
            if let Some(waited) = self.waited.as_mut() {
                *waited += elapsed;
                if *waited >= self.timing.continuation_delay {
                    self.waited = None;
                    self.state = RevealState::Generating;
                    debug!("reader finished page; requesting more content");
                    events.push(RevealEvent::NeedMoreContent);
                }
            }
        }

        events
    }
}

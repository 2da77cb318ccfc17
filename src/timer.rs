use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TimerMode {
    Focus,
    ShortBreak,
    LongBreak,
}

impl TimerMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "focus" => Some(Self::Focus),
            "shortBreak" => Some(Self::ShortBreak),
            "longBreak" => Some(Self::LongBreak),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Focus => "focus",
            Self::ShortBreak => "shortBreak",
            Self::LongBreak => "longBreak",
        }
    }

    /// Fixed preset lengths: 25 minutes of focus, 5 or 15 of break.
    pub fn duration_seconds(self) -> u32 {
        match self {
            Self::Focus => 25 * 60,
            Self::ShortBreak => 5 * 60,
            Self::LongBreak => 15 * 60,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerState {
    Idle,
    Running,
    Paused,
    Completed,
}

impl TimerState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
        }
    }
}

/// Emitted exactly once per cycle when the countdown reaches zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// A finished focus cycle; the caller records one study session.
    FocusFinished {
        minutes: i64,
        subject_id: Option<String>,
    },
    /// A finished break; nothing to persist, just tell the user.
    BreakFinished,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerError {
    pub message: &'static str,
}

impl TimerError {
    fn new(message: &'static str) -> Self {
        Self { message }
    }
}

/// Countdown state machine behind the focus page. The client owns the
/// one-second interval and forwards ticks; everything else (legal
/// transitions, the once-per-cycle completion effect) is enforced here,
/// so a stale interval firing after pause/reset cannot touch the state.
#[derive(Debug, Clone)]
pub struct FocusTimer {
    mode: TimerMode,
    state: TimerState,
    remaining: u32,
    session_saved: bool,
    subject_id: Option<String>,
}

impl Default for FocusTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl FocusTimer {
    pub fn new() -> Self {
        let mode = TimerMode::Focus;
        Self {
            mode,
            state: TimerState::Idle,
            remaining: mode.duration_seconds(),
            session_saved: false,
            subject_id: None,
        }
    }

    pub fn mode(&self) -> TimerMode {
        self.mode
    }

    pub fn state(&self) -> TimerState {
        self.state
    }

    pub fn remaining_seconds(&self) -> u32 {
        self.remaining
    }

    pub fn total_seconds(&self) -> u32 {
        self.mode.duration_seconds()
    }

    pub fn session_saved(&self) -> bool {
        self.session_saved
    }

    pub fn subject_id(&self) -> Option<&str> {
        self.subject_id.as_deref()
    }

    /// Elapsed fraction for the progress ring, clamped to [0, 1].
    pub fn progress(&self) -> f64 {
        let total = self.total_seconds();
        if total == 0 {
            return 0.0;
        }
        let elapsed = total.saturating_sub(self.remaining);
        (elapsed as f64 / total as f64).clamp(0.0, 1.0)
    }

    /// Idle -> running (binding a study subject when starting a fresh
    /// focus cycle) or paused -> running.
    pub fn start(&mut self, subject_id: Option<String>) -> Result<(), TimerError> {
        match self.state {
            TimerState::Idle => {
                if self.mode == TimerMode::Focus {
                    self.subject_id = subject_id;
                }
                self.state = TimerState::Running;
                Ok(())
            }
            TimerState::Paused => {
                self.state = TimerState::Running;
                Ok(())
            }
            TimerState::Running => Err(TimerError::new("timer is already running")),
            TimerState::Completed => Err(TimerError::new("reset the timer before starting again")),
        }
    }

    pub fn pause(&mut self) -> Result<(), TimerError> {
        match self.state {
            TimerState::Running => {
                self.state = TimerState::Paused;
                Ok(())
            }
            _ => Err(TimerError::new("timer is not running")),
        }
    }

    /// Back to idle with the current mode's full duration. Also re-arms the
    /// completion effect for the next cycle.
    pub fn reset(&mut self) {
        self.state = TimerState::Idle;
        self.remaining = self.mode.duration_seconds();
        self.session_saved = false;
    }

    /// Allowed from idle or paused only; discards any in-progress countdown.
    pub fn switch_mode(&mut self, mode: TimerMode) -> Result<(), TimerError> {
        match self.state {
            TimerState::Idle | TimerState::Paused => {
                self.mode = mode;
                self.reset();
                Ok(())
            }
            TimerState::Running => Err(TimerError::new("pause or reset before switching modes")),
            TimerState::Completed => Err(TimerError::new("reset the timer before switching modes")),
        }
    }

    /// One second elapses. Ticks outside the running state are dropped;
    /// that is what protects against an interval the client forgot to
    /// clear. Returns the completion event on the tick that hits zero.
    pub fn tick(&mut self) -> Option<Completion> {
        if self.state != TimerState::Running {
            return None;
        }
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining > 0 {
            return None;
        }
        self.state = TimerState::Completed;
        if self.mode == TimerMode::Focus && !self.session_saved {
            self.session_saved = true;
            return Some(Completion::FocusFinished {
                minutes: i64::from(TimerMode::Focus.duration_seconds() / 60),
                subject_id: self.subject_id.clone(),
            });
        }
        Some(Completion::BreakFinished)
    }

    /// Advances up to `seconds` ticks, stopping early once completed.
    pub fn tick_many(&mut self, seconds: u32) -> Option<Completion> {
        for _ in 0..seconds {
            if let Some(done) = self.tick() {
                return Some(done);
            }
            if self.state != TimerState::Running {
                break;
            }
        }
        None
    }
}

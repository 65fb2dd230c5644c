use serde::Serialize;

/// Identifies one `arm()` call. Ticks scheduled for an older countdown carry
/// an outdated id and are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct CountdownId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Countdown still running; `remaining` seconds left.
    Running { remaining: u64 },
    /// Reached zero on this tick. Reported exactly once per `arm()`.
    Expired,
    /// Nothing armed, or the tick belongs to a superseded countdown.
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CountdownProgress {
    pub total: u64,
    pub remaining: u64,
    pub elapsed: u64,
    pub active: bool,
}

/// Per-item countdown. One instance per sequencer, so at most one countdown
/// is ever active.
#[derive(Debug, Default)]
pub struct Countdown {
    total: u64,
    remaining: u64,
    active: bool,
    generation: u64,
}

impl Countdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces whatever countdown was running with a fresh one.
    pub fn arm(&mut self, seconds: u64) -> CountdownId {
        self.cancel();
        let seconds = seconds.max(1);
        self.generation += 1;
        self.total = seconds;
        self.remaining = seconds;
        self.active = true;
        CountdownId(self.generation)
    }

    pub fn cancel(&mut self) {
        if self.active {
            self.active = false;
            self.total = 0;
            self.remaining = 0;
        }
    }

    pub fn tick(&mut self, id: CountdownId) -> Tick {
        if !self.active || id.0 != self.generation {
            return Tick::Ignored;
        }

        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.active = false;
            Tick::Expired
        } else {
            Tick::Running {
                remaining: self.remaining,
            }
        }
    }

    /// Id of the active countdown, if any.
    pub fn current(&self) -> Option<CountdownId> {
        self.active.then_some(CountdownId(self.generation))
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn progress(&self) -> CountdownProgress {
        CountdownProgress {
            total: self.total,
            remaining: self.remaining,
            elapsed: self.total - self.remaining,
            active: self.active,
        }
    }
}

use crate::config::MotivationParams;

/// Per-event input C1 hands to the motivation tracker.
#[derive(Debug, Clone)]
pub struct MotivationEvent {
    pub is_correct: bool,
    pub is_quit: bool,
    pub streak_length: i32,
}

impl Default for MotivationEvent {
    fn default() -> Self {
        Self {
            is_correct: true,
            is_quit: false,
            streak_length: 0,
        }
    }
}

/// C2's motivation channel: `M_t = clip(rho*M_{t-1} + kappa*success -
/// lambda*failure - mu*quit, -1, 1)`, with a running count of consecutive
/// low-motivation events (threshold below which the count increments).
pub struct MotivationTracker {
    params: MotivationParams,
    current_value: f64,
    low_m_streak: i32,
    low_m_threshold: f64,
}

impl MotivationTracker {
    pub fn new(params: MotivationParams) -> Self {
        Self {
            params,
            current_value: 0.0,
            low_m_streak: 0,
            low_m_threshold: -0.3,
        }
    }

    pub fn update(&mut self, event: MotivationEvent) -> f64 {
        let success = if event.is_correct && !event.is_quit {
            1.0
        } else {
            0.0
        };
        let failure = if !event.is_correct && !event.is_quit {
            1.0
        } else {
            0.0
        };
        let quit = if event.is_quit { 1.0 } else { 0.0 };

        self.current_value = (self.params.rho * self.current_value
            + self.params.kappa * success
            - self.params.lambda * failure
            - self.params.mu * quit)
            .clamp(-1.0, 1.0);

        if self.current_value < self.low_m_threshold {
            self.low_m_streak += 1;
        } else {
            self.low_m_streak = 0;
        }

        self.current_value
    }

    pub fn current(&self) -> f64 {
        self.current_value
    }

    pub fn low_motivation_streak(&self) -> i32 {
        self.low_m_streak
    }

    pub fn reset(&mut self) {
        self.current_value = 0.0;
        self.low_m_streak = 0;
    }

    pub fn set_value(&mut self, value: f64) {
        self.current_value = value.clamp(-1.0, 1.0);
    }
}

impl Default for MotivationTracker {
    fn default() -> Self {
        Self::new(MotivationParams::default())
    }
}

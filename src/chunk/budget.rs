//! Adaptive mesh-build budget.
//!
//! Frame times are smoothed with an exponential moving average. At a fixed
//! interval the smoothed value is compared against two thresholds: above the
//! high mark the mesh budget drops by one (never below 1), below the low mark
//! it grows by one (never above the configured maximum).

use crate::settings::PerformanceSettings;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BudgetConfig {
    pub enabled: bool,
    pub interval_secs: f32,
    pub high_ms: f32,
    pub low_ms: f32,
    pub smoothing: f32,
    pub max_budget: usize,
}

impl BudgetConfig {
    /// Smoothed frame time assumed before any frame was observed (60 Hz).
    pub const INITIAL_FRAME_MS: f32 = 16.6;

    #[must_use]
    pub fn from_settings(perf: &PerformanceSettings) -> Self {
        Self {
            enabled: perf.auto_adjust_budgets,
            interval_secs: perf.budget_interval_secs,
            high_ms: perf.frame_ms_high,
            low_ms: perf.frame_ms_low,
            smoothing: perf.frame_smoothing.clamp(0.0, 1.0),
            max_budget: perf.max_mesh_build_per_frame,
        }
    }
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self::from_settings(&PerformanceSettings::default())
    }
}

#[derive(Debug, Clone)]
pub struct AdaptiveBudget {
    config: BudgetConfig,
    smoothed_ms: f32,
    timer: f32,
    budget: usize,
}

impl AdaptiveBudget {
    #[must_use]
    pub fn new(config: BudgetConfig) -> Self {
        Self {
            config,
            smoothed_ms: BudgetConfig::INITIAL_FRAME_MS,
            timer: 0.0,
            budget: config.max_budget.max(1),
        }
    }

    /// Replace the configuration, clamping the current budget into the new range.
    pub fn reconfigure(&mut self, config: BudgetConfig) {
        self.config = config;
        self.budget = self.budget.clamp(1, config.max_budget.max(1));
        if !config.enabled {
            self.budget = config.max_budget.max(1);
        }
    }

    /// Budget to use for the current tick.
    #[must_use]
    pub fn budget(&self) -> usize {
        self.budget
    }

    #[must_use]
    pub fn smoothed_ms(&self) -> f32 {
        self.smoothed_ms
    }

    #[must_use]
    pub fn config(&self) -> &BudgetConfig {
        &self.config
    }

    /// Feed one frame's duration.
    ///
    /// # Return
    /// The new budget when this call changed it.
    pub fn observe(&mut self, dt_secs: f32) -> Option<usize> {
        let frame_ms = dt_secs * 1000.0;
        if frame_ms.is_finite() {
            self.smoothed_ms += (frame_ms - self.smoothed_ms) * self.config.smoothing;
        }
        if !self.config.enabled {
            return None;
        }

        self.timer += dt_secs.max(0.0);
        if self.timer < self.config.interval_secs {
            return None;
        }
        self.timer = 0.0;

        let before = self.budget;
        let max = self.config.max_budget.max(1);
        if self.smoothed_ms > self.config.high_ms {
            self.budget = self.budget.saturating_sub(1).max(1);
        } else if self.smoothed_ms < self.config.low_ms {
            self.budget = (self.budget + 1).min(max);
        }
        (self.budget != before).then_some(self.budget)
    }
}

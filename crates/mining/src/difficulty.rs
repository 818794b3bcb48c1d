//! Difficulty retargeting.

use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Blocks per retarget window.
pub const RETARGET_WINDOW: u64 = 2016;

/// Result of a retarget check.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum RetargetOutcome {
    /// Window not yet complete.
    NotDue,
    /// Difficulty is pinned; the window completed but nothing changed.
    Pinned,
    /// Difficulty was rescaled by `1 / factor`.
    Adjusted {
        /// Difficulty before the retarget.
        previous: f64,
        /// Difficulty after the retarget.
        current: f64,
        /// Observed over expected block time.
        factor: f64,
    },
    /// The window elapsed in zero virtual time. The factor is treated as 1
    /// and the window is reset.
    Degenerate,
}

/// Keeps the average block time near its target.
///
/// Every [`RETARGET_WINDOW`] blocks the observed average block time over the
/// window is compared with the target, and difficulty is divided by the
/// ratio. An explicitly configured difficulty pins the controller.
#[derive(Debug, Clone)]
pub struct DifficultyController {
    difficulty: f64,
    target_block_time: Duration,
    pinned: bool,
    window_blocks: u64,
    window_start: Duration,
    retargets: u64,
}

impl DifficultyController {
    /// Controller starting at `target_block_time * total_hashrate`, so the
    /// expected first block time equals the target.
    pub fn new(target_block_time: Duration, total_hashrate: f64) -> Self {
        Self {
            difficulty: target_block_time.as_secs_f64() * total_hashrate,
            target_block_time,
            pinned: false,
            window_blocks: 0,
            window_start: Duration::ZERO,
            retargets: 0,
        }
    }

    /// Controller fixed at `difficulty`; retargeting is disabled.
    pub fn pinned(target_block_time: Duration, difficulty: f64) -> Self {
        Self {
            difficulty,
            pinned: true,
            ..Self::new(target_block_time, 0.0)
        }
    }

    /// Current difficulty.
    pub fn difficulty(&self) -> f64 {
        self.difficulty
    }

    /// Whether retargeting is disabled.
    pub fn is_pinned(&self) -> bool {
        self.pinned
    }

    /// Target block time.
    pub fn target_block_time(&self) -> Duration {
        self.target_block_time
    }

    /// Blocks mined in the current window.
    pub fn window_blocks(&self) -> u64 {
        self.window_blocks
    }

    /// Number of completed retargets.
    pub fn retargets(&self) -> u64 {
        self.retargets
    }

    /// Expected block time for a given total hashrate.
    pub fn expected_block_time(&self, total_hashrate: f64) -> f64 {
        if total_hashrate > 0.0 {
            self.difficulty / total_hashrate
        } else {
            f64::INFINITY
        }
    }

    /// Count an accepted block toward the current window.
    pub fn on_block(&mut self) {
        self.window_blocks += 1;
    }

    /// Retarget if a full window has been mined. Called at round start.
    pub fn check_retarget(&mut self, now: Duration) -> RetargetOutcome {
        if self.window_blocks < RETARGET_WINDOW {
            return RetargetOutcome::NotDue;
        }
        if self.pinned {
            self.reset_window(now);
            return RetargetOutcome::Pinned;
        }

        let elapsed = now.saturating_sub(self.window_start).as_secs_f64();
        let blocks = self.window_blocks;
        self.reset_window(now);

        if elapsed <= 0.0 {
            warn!(blocks, "Retarget window elapsed in zero time, keeping difficulty");
            return RetargetOutcome::Degenerate;
        }

        let observed = elapsed / blocks as f64;
        let factor = observed / self.target_block_time.as_secs_f64();
        let previous = self.difficulty;
        self.difficulty = previous / factor;
        self.retargets += 1;

        debug!(
            previous,
            current = self.difficulty,
            factor,
            observed_block_time = observed,
            "Difficulty retargeted"
        );

        RetargetOutcome::Adjusted {
            previous,
            current: self.difficulty,
            factor,
        }
    }

    fn reset_window(&mut self, now: Duration) {
        self.window_blocks = 0;
        self.window_start = now;
    }
}

//! 单调时钟

use std::cell::Cell;

use gametime::{TimeSpan, TimeStamp};

/// 单调时钟，返回毫秒
pub trait Clock {
    /// 当前时间（毫秒）
    fn now_ms(&self) -> f64;
}

/// 以创建时刻为零点的游戏时钟
#[derive(Clone, Copy, Debug)]
pub struct GameClock {
    /// 零点
    origin: TimeStamp,
}

impl GameClock {
    /// 以当前时刻为零点创建时钟
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: TimeStamp::now(),
        }
    }
}

impl Default for GameClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for GameClock {
    fn now_ms(&self) -> f64 {
        let elapsed = TimeStamp::now()
            .checked_elapsed_since(self.origin)
            .unwrap_or(TimeSpan::ZERO);
        elapsed.as_nanos().max(0) as f64 / 1_000_000.0
    }
}

/// 手动推进的时钟，用于测试与离线驱动
#[derive(Debug, Default)]
pub struct ManualClock {
    /// 当前时间
    now: Cell<f64>,
}

impl ManualClock {
    /// 以给定时间创建
    #[must_use]
    pub const fn new(now_ms: f64) -> Self {
        Self {
            now: Cell::new(now_ms),
        }
    }

    /// 设置当前时间
    pub fn set(&self, now_ms: f64) {
        self.now.set(now_ms);
    }

    /// 前进若干毫秒
    pub fn advance(&self, delta_ms: f64) {
        self.now.set(self.now.get() + delta_ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> f64 {
        self.now.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn game_clock_is_monotonic() {
        let clock = GameClock::new();
        let a = clock.now_ms();
        let b = clock.now_ms();
        assert!(a >= 0.0);
        assert!(b >= a);
    }

    #[test]
    fn manual_clock_moves_on_request() {
        let clock = ManualClock::new(10.0);
        clock.advance(5.5);
        assert!((clock.now_ms() - 15.5).abs() < f64::EPSILON);
        clock.set(3.0);
        assert!((clock.now_ms() - 3.0).abs() < f64::EPSILON);
    }
}

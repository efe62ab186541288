//! 发声实例池
//!
//! 预先创建一批实例，耗尽时按倍数扩容（只增不减）。
//! 每个 tick 回收播放已结束的实例。

use std::collections::VecDeque;

use tracing::debug;

/// 默认初始容量
pub const DEFAULT_CAPACITY: usize = 32;
/// 默认扩容倍数
pub const DEFAULT_GROWTH: f64 = 2.0;
/// 单次扩容最多新增的实例数
pub const MAX_GROWTH_STEP: usize = 1024;

/// 发声实例编号
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VoiceId(pub usize);

/// 正在使用的发声实例
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VoiceHandle {
    /// 实例编号
    pub voice: VoiceId,
    /// 计划播放时刻（毫秒）
    pub scheduled_time: f64,
    /// 播放时长（毫秒）
    pub duration_ms: f64,
}

impl VoiceHandle {
    /// 播放结束时刻
    #[must_use]
    pub fn completed_at(&self) -> f64 {
        self.scheduled_time + self.duration_ms
    }

    /// 在 `now_ms` 时是否已播放完毕
    #[must_use]
    pub fn is_done(&self, now_ms: f64) -> bool {
        now_ms > self.completed_at()
    }
}

/// 发声实例池
#[derive(Debug)]
pub struct VoicePool {
    /// 空闲实例
    free: VecDeque<VoiceId>,
    /// 使用中的实例
    active: Vec<VoiceHandle>,
    /// 已创建的实例总数
    capacity: usize,
    /// 扩容倍数
    growth: f64,
}

impl Default for VoicePool {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_GROWTH)
    }
}

impl VoicePool {
    /// 预创建 `initial` 个实例
    #[must_use]
    pub fn new(initial: usize, growth: f64) -> Self {
        Self {
            free: (0..initial).map(VoiceId).collect(),
            active: Vec::with_capacity(initial),
            capacity: initial,
            growth,
        }
    }

    /// 已创建的实例总数
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// 空闲实例数
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// 使用中的实例数
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// 取出一个实例，空闲实例耗尽时先扩容
    pub fn acquire(&mut self, scheduled_time: f64, duration_ms: f64) -> VoiceHandle {
        let voice = match self.free.pop_front() {
            Some(voice) => voice,
            None => self.grow(),
        };
        let handle = VoiceHandle {
            voice,
            scheduled_time,
            duration_ms,
        };
        self.active.push(handle);
        handle
    }

    /// 归还一个实例，未在使用中时返回 `false`
    pub fn release(&mut self, handle: VoiceHandle) -> bool {
        let Some(idx) = self.active.iter().position(|h| h.voice == handle.voice) else {
            return false;
        };
        self.active.swap_remove(idx);
        self.free.push_back(handle.voice);
        true
    }

    /// 回收所有在 `now_ms` 时已播放完毕的实例，返回回收数
    pub fn sweep(&mut self, now_ms: f64) -> usize {
        let before = self.active.len();
        let free = &mut self.free;
        self.active.retain(|h| {
            if h.is_done(now_ms) {
                free.push_back(h.voice);
                false
            } else {
                true
            }
        });
        before - self.active.len()
    }

    /// 扩容并返回一个新实例，其余新实例放入空闲队列
    ///
    /// 新容量为 `max(ceil(capacity * growth), capacity + 1)`，单次最多新增
    /// [`MAX_GROWTH_STEP`] 个；非有限倍数按 +1 处理。
    fn grow(&mut self) -> VoiceId {
        let scaled = self.capacity as f64 * self.growth;
        let step = if scaled.is_finite() {
            (scaled.ceil() as usize).saturating_sub(self.capacity)
        } else {
            0
        };
        let target = self
            .capacity
            .saturating_add(step.clamp(1, MAX_GROWTH_STEP));
        debug!(from = self.capacity, to = target, "发声实例池扩容");
        self.free.extend((self.capacity + 1..target).map(VoiceId));
        let voice = VoiceId(self.capacity);
        self.capacity = target;
        voice
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_when_exhausted() {
        let mut pool = VoicePool::new(2, 2.0);
        let a = pool.acquire(0.0, 100.0);
        let b = pool.acquire(0.0, 100.0);
        assert_eq!(pool.capacity(), 2);
        let c = pool.acquire(0.0, 100.0);
        assert_eq!(pool.capacity(), 4);
        assert_eq!(pool.free_count(), 1);
        assert_eq!(pool.active_count(), 3);
        assert_eq!(
            [a.voice, b.voice, c.voice],
            [VoiceId(0), VoiceId(1), VoiceId(2)]
        );
    }

    #[test]
    fn growth_adds_at_least_one() {
        let mut pool = VoicePool::new(0, 1.0);
        pool.acquire(0.0, 1.0);
        assert_eq!(pool.capacity(), 1);
        pool.acquire(0.0, 1.0);
        assert_eq!(pool.capacity(), 2);
    }

    #[test]
    fn huge_growth_is_capped_per_step() {
        let mut pool = VoicePool::new(1, 1e30);
        pool.acquire(0.0, 1.0);
        let b = pool.acquire(0.0, 1.0);
        assert_eq!(b.voice, VoiceId(1));
        assert_eq!(pool.capacity(), 1 + MAX_GROWTH_STEP);
        assert_eq!(pool.free_count(), MAX_GROWTH_STEP - 1);
    }

    #[test]
    fn non_finite_growth_adds_one() {
        for growth in [f64::INFINITY, f64::NAN] {
            let mut pool = VoicePool::new(1, growth);
            pool.acquire(0.0, 1.0);
            pool.acquire(0.0, 1.0);
            assert_eq!(pool.capacity(), 2);
            assert_eq!(pool.free_count(), 0);
        }
    }

    #[test]
    fn sweep_reclaims_finished_voices() {
        let mut pool = VoicePool::new(4, 2.0);
        pool.acquire(0.0, 100.0);
        pool.acquire(50.0, 100.0);
        assert_eq!(pool.sweep(100.0), 0);
        assert_eq!(pool.sweep(100.5), 1);
        assert_eq!(pool.active_count(), 1);
        assert_eq!(pool.sweep(151.0), 1);
        assert_eq!(pool.free_count(), 4);
        assert_eq!(pool.capacity(), 4);
    }

    #[test]
    fn release_returns_voice_once() {
        let mut pool = VoicePool::new(1, 2.0);
        let handle = pool.acquire(0.0, 10.0);
        assert!(pool.release(handle));
        assert!(!pool.release(handle));
        assert_eq!(pool.free_count(), 1);
        assert_eq!(pool.acquire(0.0, 10.0).voice, handle.voice);
    }
}

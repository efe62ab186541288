//! 预读窗口调度器
//!
//! 开始播放时确定锚点 `anchor = base + delay`，之后每个 tick 把
//! `time_ms <= now - anchor + preload` 的事件按时间顺序取出，
//! 并给出绝对播放时刻 `anchor + time_ms`。游标只前进不后退。

use tracing::{debug, info};

use crate::chart::timeline::{NoteEvent, Timeline};

/// 已派发的事件及其绝对播放时刻
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScheduledNote {
    /// 原始事件
    pub event: NoteEvent,
    /// 绝对播放时刻（毫秒，与时钟同源）
    pub at_ms: f64,
}

/// 调度状态
#[derive(Debug, Default)]
enum State {
    /// 未开始
    #[default]
    Idle,
    /// 播放中
    Running {
        /// 正在调度的时间轴
        timeline: Timeline,
        /// 时间轴零点对应的时钟时间
        anchor_ms: f64,
        /// 下一个待派发事件的下标
        cursor: usize,
    },
}

/// 播放调度器
#[derive(Debug)]
pub struct Scheduler {
    /// 预读窗口（毫秒）
    preload_ms: f64,
    /// 当前状态
    state: State,
}

impl Scheduler {
    /// 以给定预读窗口创建空闲的调度器
    #[must_use]
    pub fn new(preload_ms: f64) -> Self {
        Self {
            preload_ms: preload_ms.max(0.0),
            state: State::Idle,
        }
    }

    /// 预读窗口
    #[must_use]
    pub const fn preload_ms(&self) -> f64 {
        self.preload_ms
    }

    /// 开始调度；播放中调用时丢弃原会话重新开始
    pub fn start(&mut self, timeline: Timeline, base_ms: f64, delay_ms: f64) {
        if self.is_running() {
            info!("调度器重新开始");
        }
        let anchor_ms = base_ms + delay_ms;
        debug!(anchor_ms, events = timeline.len(), "调度开始");
        self.state = State::Running {
            timeline,
            anchor_ms,
            cursor: 0,
        };
    }

    /// 停止调度并交还时间轴
    pub fn stop(&mut self) -> Option<Timeline> {
        match std::mem::take(&mut self.state) {
            State::Running { timeline, .. } => Some(timeline),
            State::Idle => None,
        }
    }

    /// 是否处于播放中
    #[must_use]
    pub const fn is_running(&self) -> bool {
        matches!(self.state, State::Running { .. })
    }

    /// 当前游标，空闲时为 `None`
    #[must_use]
    pub const fn cursor(&self) -> Option<usize> {
        match &self.state {
            State::Running { cursor, .. } => Some(*cursor),
            State::Idle => None,
        }
    }

    /// 锚点时间，空闲时为 `None`
    #[must_use]
    pub const fn anchor_ms(&self) -> Option<f64> {
        match &self.state {
            State::Running { anchor_ms, .. } => Some(*anchor_ms),
            State::Idle => None,
        }
    }

    /// 正在调度的时间轴长度
    #[must_use]
    pub fn len(&self) -> usize {
        match &self.state {
            State::Running { timeline, .. } => timeline.len(),
            State::Idle => 0,
        }
    }

    /// 是否没有正在调度的事件
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 播放中且所有事件均已派发
    #[must_use]
    pub fn is_finished(&self) -> bool {
        match &self.state {
            State::Running {
                timeline, cursor, ..
            } => *cursor >= timeline.len(),
            State::Idle => false,
        }
    }

    /// 推进到 `now_ms`，返回进入预读窗口的事件
    ///
    /// 空闲或已到末尾时不返回任何事件。未被取走的事件留待下次调用。
    pub fn update(&mut self, now_ms: f64) -> impl Iterator<Item = ScheduledNote> + '_ {
        let preload_ms = self.preload_ms;
        let state = &mut self.state;
        std::iter::from_fn(move || {
            let State::Running {
                timeline,
                anchor_ms,
                cursor,
            } = &mut *state
            else {
                return None;
            };
            let event = *timeline.events().get(*cursor)?;
            if event.time_ms > now_ms - *anchor_ms + preload_ms {
                return None;
            }
            *cursor += 1;
            Some(ScheduledNote {
                event,
                at_ms: *anchor_ms + event.time_ms,
            })
        })
    }
}

//! 播放调度
//!
//! - `clock`：单调时钟
//! - `scheduler`：按预读窗口派发时间轴事件
//! - `voice_pool`：可复用的发声实例池
//!
//! 所有时间均为与时钟同源的毫秒数（`f64`）。

pub mod clock;
pub mod scheduler;
pub mod voice_pool;

use self::voice_pool::VoiceId;

/// 可播放数据，需要知道自身时长以便回收发声实例
pub trait Playable {
    /// 播放时长（毫秒）
    fn duration_ms(&self) -> f64;
}

/// 外部播放端
///
/// `at_ms` 为与调度时钟同源的绝对播放时刻，可能晚于当前时间。
pub trait PlaybackSink {
    /// 可播放数据类型
    type Payload;

    /// 安排一次播放
    fn play(&mut self, voice: VoiceId, payload: &Self::Payload, volume: f32, pan: f32, at_ms: f64);
}

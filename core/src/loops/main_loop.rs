//! 主循环：等待音源载入、推进调度器并分发播放
//!
//! - 以固定间隔 tick
//! - 载入阶段每秒输出一次 `已载入/总数`
//! - 播放阶段每秒输出一次派发统计

use std::{
    thread,
    time::{Duration, Instant},
};

use tracing::{debug, info};

use crate::chart::sample::{AudioLoader, SampleRegistry};
use crate::chart::timeline::Timeline;
use crate::config;
use crate::playback::clock::Clock;
use crate::playback::scheduler::Scheduler;
use crate::playback::voice_pool::VoicePool;
use crate::playback::{Playable, PlaybackSink};

/// 单次 tick 的处理结果
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    /// 应用的载入完成消息数
    pub completions: usize,
    /// 回收的发声实例数
    pub reclaimed: usize,
    /// 交给播放端的音符数
    pub dispatched: usize,
    /// 因音源缺失或载入失败而静音的音符数
    pub muted: usize,
}

/// 一次播放会话：音源表、调度器、发声实例池与播放端
pub struct Session<S: PlaybackSink> {
    /// 音源注册表
    samples: SampleRegistry<S::Payload>,
    /// 调度器
    scheduler: Scheduler,
    /// 发声实例池
    voices: VoicePool,
    /// 播放端
    sink: S,
}

impl<S> Session<S>
where
    S: PlaybackSink,
    S::Payload: Playable,
{
    /// 组装会话
    pub const fn new(
        samples: SampleRegistry<S::Payload>,
        scheduler: Scheduler,
        voices: VoicePool,
        sink: S,
    ) -> Self {
        Self {
            samples,
            scheduler,
            voices,
            sink,
        }
    }

    /// 音源注册表
    pub const fn samples(&self) -> &SampleRegistry<S::Payload> {
        &self.samples
    }

    /// 调度器
    pub const fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// 发声实例池
    pub const fn voices(&self) -> &VoicePool {
        &self.voices
    }

    /// 播放端
    pub const fn sink(&self) -> &S {
        &self.sink
    }

    /// 请求载入全部音源，返回请求数
    pub fn request_samples<L>(&self, loader: &L) -> usize
    where
        L: AudioLoader<Payload = S::Payload>,
    {
        self.samples.request_all(loader)
    }

    /// 应用已到达的载入结果，返回是否全部载入完毕
    pub fn poll_loading(&mut self) -> bool {
        self.samples.drain_completions();
        self.samples.is_ready()
    }

    /// 开始播放
    pub fn start(&mut self, timeline: Timeline, base_ms: f64, delay_ms: f64) {
        self.scheduler.start(timeline, base_ms, delay_ms);
    }

    /// 推进一个 tick：应用载入结果、回收发声实例、派发进入预读窗口的音符
    pub fn tick(&mut self, now_ms: f64) -> TickReport {
        let mut report = TickReport {
            completions: self.samples.drain_completions(),
            reclaimed: self.voices.sweep(now_ms),
            ..TickReport::default()
        };
        for note in self.scheduler.update(now_ms) {
            let id = note.event.sample_id;
            let Some(def) = self.samples.get(id) else {
                debug!(id = id.0, "未定义的音源");
                report.muted += 1;
                continue;
            };
            let Some(payload) = def.payload() else {
                report.muted += 1;
                continue;
            };
            let handle = self.voices.acquire(note.at_ms, payload.duration_ms());
            self.sink
                .play(handle.voice, payload, def.volume, def.pan, note.at_ms);
            report.dispatched += 1;
        }
        report
    }

    /// 所有音符均已派发且播放完毕
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.scheduler.is_finished() && self.voices.active_count() == 0
    }
}

/// 固定间隔节拍器
struct Ticker {
    /// 间隔
    interval: Duration,
    /// 下一次 tick 的时刻
    next: Instant,
}

impl Ticker {
    /// 创建节拍器，第一次 tick 立即返回
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: Instant::now(),
        }
    }

    /// 睡眠到下一次 tick；落后时不补偿
    fn wait(&mut self) {
        let now = Instant::now();
        if let Some(wait) = self.next.checked_duration_since(now) {
            thread::sleep(wait);
        } else {
            self.next = now;
        }
        self.next = self.next.checked_add(self.interval).unwrap_or(now);
    }
}

/// 每秒一次的日志节流
struct PerSecond {
    /// 上次输出所在的秒
    last_sec: u64,
}

impl PerSecond {
    /// 时钟跨过新的整秒时返回该秒
    fn tick(&mut self, now_ms: f64) -> Option<u64> {
        let sec = (now_ms.max(0.0) / 1000.0) as u64;
        if sec == self.last_sec {
            return None;
        }
        self.last_sec = sec;
        Some(sec)
    }
}

/// 播放结束时的汇总
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// 交给播放端的音符数
    pub dispatched: usize,
    /// 静音的音符数
    pub muted: usize,
}

/// 运行主循环直到播放结束
///
/// - `session`：已请求载入音源的会话
/// - `clock`：与播放端同源的时钟
/// - `timeline`：要播放的时间轴
/// - `playback`：预读、开播延迟与 tick 间隔
pub fn run<S, C>(
    session: &mut Session<S>,
    clock: &C,
    timeline: Timeline,
    playback: &config::Playback,
) -> RunSummary
where
    S: PlaybackSink,
    S::Payload: Playable,
    C: Clock,
{
    let mut ticker = Ticker::new(playback.tick);
    let mut every_sec = PerSecond { last_sec: 0 };

    loop {
        ticker.wait();
        if session.poll_loading() {
            break;
        }
        if every_sec.tick(clock.now_ms()).is_some() {
            let (loaded, total) = session.samples().progress();
            info!(loaded, total, "音源载入进度");
        }
    }
    let (loaded, total) = session.samples().progress();
    info!(loaded, total, "音源载入完成");

    let base_ms = clock.now_ms();
    session.start(timeline, base_ms, playback.start_delay_ms);
    info!(
        events = session.scheduler().len(),
        preload_ms = session.scheduler().preload_ms(),
        "开始播放"
    );
    let mut summary = RunSummary::default();
    let mut dispatched_this_sec: usize = 0;
    let mut every_sec = PerSecond {
        last_sec: (base_ms.max(0.0) / 1000.0) as u64,
    };
    loop {
        ticker.wait();
        let now = clock.now_ms();
        let report = session.tick(now);
        summary.dispatched += report.dispatched;
        summary.muted += report.muted;
        dispatched_this_sec += report.dispatched;
        if let Some(sec) = every_sec.tick(now) {
            debug!(
                elapsed_sec = sec,
                cursor = session.scheduler().cursor().unwrap_or_default(),
                total = session.scheduler().len(),
                active_voices = session.voices().active_count(),
                capacity = session.voices().capacity(),
                dispatched = dispatched_this_sec,
                "主循环统计"
            );
            dispatched_this_sec = 0;
        }
        if session.is_finished() {
            break;
        }
    }
    info!(
        dispatched = summary.dispatched,
        muted = summary.muted,
        "播放结束"
    );
    summary
}

//! 音符时间轴构建
//!
//! 将 `#MMMll:` 音符放置命令换算为绝对毫秒时间：
//!
//! - 前三位十进制为小节号，后两位 36 进制为轨道号
//! - 小节号变化时按**当时**生效的小节长度推进当前时间
//! - 轨道 `08` 为变速轨，值为 BPM 表编号，只影响其后处理的命令
//! - 其余轨道的值是两位一组的音源编号序列，均分整小节，`00` 为休止
//!
//! 各轨道独立书写，文件顺序不保证全局时间有序，因此 [`TimelineBuilder::build`]
//! 会合并并排序全部事件。

use std::cmp::Ordering;

use tracing::{debug, warn};

use super::base36;
use super::command::{Block, Command};
use super::error::ChartError;
use super::sample::SampleId;
use super::tempo::{TempoId, TempoMap};

/// 轨道编号（两位 36 进制）
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LaneId(pub u16);

/// 保留给变速事件的轨道
pub const TEMPO_LANE: LaneId = LaneId(8);

/// 音符放置命令名长度：三位小节号 + 两位轨道号
const NOTE_COMMAND_LEN: usize = 5;

/// 单个音符事件
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NoteEvent {
    /// 触发的音源
    pub sample_id: SampleId,
    /// 所在轨道
    pub lane_id: LaneId,
    /// 距谱面开始的毫秒数
    pub time_ms: f64,
}

impl NoteEvent {
    /// 时间升序，同时刻按轨道号
    fn timeline_order(&self, other: &Self) -> Ordering {
        self.time_ms
            .total_cmp(&other.time_ms)
            .then(self.lane_id.cmp(&other.lane_id))
    }
}

/// 按时间升序排列的完整音符序列
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Timeline {
    events: Vec<NoteEvent>,
}

impl Timeline {
    /// 由任意顺序的事件构造时间轴（稳定排序）
    #[must_use]
    pub fn from_events(mut events: Vec<NoteEvent>) -> Self {
        events.sort_by(NoteEvent::timeline_order);
        Self { events }
    }

    /// 全部事件
    #[must_use]
    pub fn events(&self) -> &[NoteEvent] {
        &self.events
    }

    /// 事件数
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// 是否没有事件
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// 最后一个事件的时间，即谱面长度；没有事件时为 0
    #[must_use]
    pub fn last_time_ms(&self) -> f64 {
        self.events.last().map_or(0.0, |e| e.time_ms)
    }
}

/// 判断命令名是否为音符放置：`[0-9]{3}[0-9A-Za-z]{2}`
#[must_use]
pub fn is_note_command(name: &str) -> bool {
    let bytes = name.as_bytes();
    bytes.len() == NOTE_COMMAND_LEN
        && bytes.iter().take(3).all(u8::is_ascii_digit)
        && bytes.iter().skip(3).all(u8::is_ascii_alphanumeric)
}

/// 时间轴构建器，在一次谱面载入内跨块保持当前小节与时间
#[derive(Debug, Default)]
pub struct TimelineBuilder {
    /// 当前小节号
    current_measure: u32,
    /// 当前小节起点的毫秒数
    current_time_ms: f64,
    /// 已提交的事件
    events: Vec<NoteEvent>,
}

impl TimelineBuilder {
    /// 创建构建器，从第 0 小节、0 毫秒开始
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// 处理一个音符放置块
    ///
    /// 块内出错时本块产生的音符全部丢弃；出错前已生效的变速与小节推进保留。
    ///
    /// # Errors
    ///
    /// - 小节号不是十进制数
    /// - 轨道号、音源编号或 BPM 编号不是两位 36 进制
    pub fn setup_block(
        &mut self,
        block: &Block<'_>,
        tempo: &mut TempoMap,
    ) -> Result<usize, ChartError> {
        let mut staged = Vec::new();
        for (line, cmd) in block.commands() {
            if cmd.command.len() != NOTE_COMMAND_LEN {
                continue;
            }
            self.push_command(line, &cmd, tempo, &mut staged)?;
        }
        let count = staged.len();
        self.events.append(&mut staged);
        Ok(count)
    }

    /// 处理单条音符放置命令，产生的事件追加到 `out`
    ///
    /// # Errors
    ///
    /// - 同 [`TimelineBuilder::setup_block`]
    pub fn push_command(
        &mut self,
        line: usize,
        cmd: &Command,
        tempo: &mut TempoMap,
        out: &mut Vec<NoteEvent>,
    ) -> Result<(), ChartError> {
        let measure = parse_measure(line, cmd)?;
        let lane = LaneId(cmd.suffix_id(line)?);

        if measure != self.current_measure {
            let span = f64::from(measure) - f64::from(self.current_measure);
            self.current_time_ms += tempo.measure_length_ms() * span;
            self.current_measure = measure;
        }

        let tokens = decode_tokens(line, cmd)?;
        if lane == TEMPO_LANE {
            let Some(&id) = tokens.iter().find(|&&v| v != 0) else {
                return Ok(());
            };
            match tempo.apply(TempoId(id)) {
                Some(bpm) => debug!(line, measure, bpm, "变速"),
                None => debug!(line, id, "未定义的 BPM 编号，速度不变"),
            }
            return Ok(());
        }

        if cmd.value.len() % 2 != 0 {
            warn!(line, value = %cmd.value, "音符序列长度为奇数，末尾字符被忽略");
        }
        if tokens.is_empty() {
            return Ok(());
        }
        let slot_ms = tempo.measure_length_ms() / tokens.len() as f64;
        for (slot, &value) in tokens.iter().enumerate() {
            if value == 0 {
                continue;
            }
            out.push(NoteEvent {
                sample_id: SampleId(value),
                lane_id: lane,
                time_ms: (self.current_time_ms + slot as f64 * slot_ms).max(0.0),
            });
        }
        Ok(())
    }

    /// 合并全部事件并按时间排序，生成时间轴
    #[must_use]
    pub fn build(self) -> Timeline {
        Timeline::from_events(self.events)
    }
}

/// 解析三位十进制小节号
fn parse_measure(line: usize, cmd: &Command) -> Result<u32, ChartError> {
    let digits = cmd.command.get(..3).unwrap_or_default();
    let invalid = || ChartError::InvalidNumber {
        line,
        command: cmd.command.clone(),
        value: digits.to_string(),
    };
    if digits.len() != 3 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    digits.parse().map_err(|_| invalid())
}

/// 将命令值解码为两位一组的编号序列
fn decode_tokens(line: usize, cmd: &Command) -> Result<Vec<u16>, ChartError> {
    base36::tokens(&cmd.value)
        .map(|pair| {
            base36::decode_pair(pair).ok_or_else(|| ChartError::InvalidBase36 {
                line,
                command: cmd.command.clone(),
                token: String::from_utf8_lossy(pair).into_owned(),
            })
        })
        .collect()
}

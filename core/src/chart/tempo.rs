//! BPM 表与当前速度
//!
//! 仅支持 4/4 拍：一小节长度为 `60000 / bpm * 4` 毫秒。

use std::collections::BTreeMap;

use tracing::debug;

use super::command::{Block, Command};
use super::error::ChartError;

/// 未指定时的默认 BPM
pub const DEFAULT_BPM: f64 = 120.0;
/// 每小节拍数（4/4）
pub const BEATS_PER_MEASURE: f64 = 4.0;

/// BPM 表编号（两位 36 进制）
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TempoId(pub u16);

/// BPM 表中的一项
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TempoEntry {
    /// 编号
    pub id: TempoId,
    /// BPM
    pub bpm: f64,
}

/// 给定 BPM 下一小节的毫秒数
#[must_use]
pub fn measure_length_ms(bpm: f64) -> f64 {
    60_000.0 / bpm * BEATS_PER_MEASURE
}

/// 解析 BPM 值，要求为有限正数且小节长度有限
///
/// # Errors
///
/// - 值不是数字
/// - 值不是有限正数，或小到小节长度溢出
pub fn parse_bpm(line: usize, cmd: &Command) -> Result<f64, ChartError> {
    let bpm: f64 = cmd
        .value
        .parse()
        .map_err(|_| ChartError::InvalidNumber {
            line,
            command: cmd.command.clone(),
            value: cmd.value.clone(),
        })?;
    if !bpm.is_finite() || bpm <= 0.0 || !measure_length_ms(bpm).is_finite() {
        return Err(ChartError::InvalidTempo { line, bpm });
    }
    Ok(bpm)
}

/// 速度表：命名 BPM 值与当前生效的 BPM
#[derive(Debug, Clone, PartialEq)]
pub struct TempoMap {
    /// 编号到 BPM 的映射
    entries: BTreeMap<TempoId, f64>,
    /// 当前生效的 BPM
    active_bpm: f64,
}

impl Default for TempoMap {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
            active_bpm: DEFAULT_BPM,
        }
    }
}

impl TempoMap {
    /// 创建空表，当前 BPM 为默认值
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前 BPM
    #[must_use]
    pub const fn active_bpm(&self) -> f64 {
        self.active_bpm
    }

    /// 当前 BPM 下一小节的毫秒数
    #[must_use]
    pub fn measure_length_ms(&self) -> f64 {
        measure_length_ms(self.active_bpm)
    }

    /// 设置基础 BPM，立即生效
    pub const fn set_base(&mut self, bpm: f64) {
        self.active_bpm = bpm;
    }

    /// 写入一项 BPM 表，返回被替换的旧值
    pub fn insert(&mut self, id: TempoId, bpm: f64) -> Option<f64> {
        self.entries.insert(id, bpm)
    }

    /// 查询 BPM 表
    #[must_use]
    pub fn get(&self, id: TempoId) -> Option<f64> {
        self.entries.get(&id).copied()
    }

    /// 切换到表中的 BPM；编号不存在时保持不变并返回 `None`
    pub fn apply(&mut self, id: TempoId) -> Option<f64> {
        let bpm = self.get(id)?;
        self.active_bpm = bpm;
        Some(bpm)
    }

    /// 按编号顺序遍历 BPM 表
    pub fn entries(&self) -> impl Iterator<Item = TempoEntry> + '_ {
        self.entries
            .iter()
            .map(|(&id, &bpm)| TempoEntry { id, bpm })
    }

    /// BPM 表项数
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// BPM 表是否为空
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 读取速度表块
    ///
    /// `#BPMxx` 写入表项，不带后缀的 `#BPM` 设置基础 BPM，其余命令忽略。
    ///
    /// # Errors
    ///
    /// - 编号不是两位 36 进制
    /// - BPM 不是有限正数
    pub fn setup_block(&mut self, block: &Block<'_>) -> Result<(), ChartError> {
        for (line, cmd) in block.commands() {
            let name = cmd.command.as_str();
            if name.eq_ignore_ascii_case("bpm") {
                let bpm = parse_bpm(line, &cmd)?;
                debug!(bpm, "基础 BPM");
                self.set_base(bpm);
                continue;
            }
            let is_entry = name.len() == 5
                && name
                    .get(..3)
                    .is_some_and(|p| p.eq_ignore_ascii_case("bpm"));
            if !is_entry {
                continue;
            }
            let id = TempoId(cmd.suffix_id(line)?);
            let bpm = parse_bpm(line, &cmd)?;
            if let Some(old) = self.insert(id, bpm) {
                debug!(id = id.0, old, bpm, "BPM 表项被覆盖");
            }
        }
        Ok(())
    }
}

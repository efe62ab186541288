//! 谱面载入：按空行切块并分派给各构建器
//!
//! 每块只看首条命令决定类型，块按文件顺序处理，音源表与速度表跨块累积。

use serde::Deserialize;
use tracing::{debug, info, warn};

use super::command::Block;
use super::error::ChartError;
use super::music_info::MusicInfo;
use super::sample::SampleRegistry;
use super::tempo::TempoMap;
use super::timeline::{TimelineBuilder, is_note_command};
use super::Chart;

/// 块分隔符
const BLOCK_SEPARATOR: &str = "\n\n";

/// 格式错误块的处理方式
#[derive(Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MalformedBlockPolicy {
    /// 任一块出错即整体载入失败
    Abort,
    /// 跳过出错的块并记录，继续处理后续块
    #[default]
    Skip,
}

/// 命令块类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// 曲目信息（首条命令 `TITLE`）
    MusicInfo,
    /// 音源定义（首条命令 `WAVxx`）
    SampleInfo,
    /// 速度表（首条命令以 `BPM` 开头）
    TempoTable,
    /// 音符放置（首条命令 `MMMll`）
    NotePlacement,
    /// 无法识别，忽略（如 AVI 块）
    Unrecognized,
}

/// 根据块首条命令名判定块类型
#[must_use]
pub fn classify(command: &str) -> BlockKind {
    let head3 = command.get(..3);
    if command.eq_ignore_ascii_case("title") {
        BlockKind::MusicInfo
    } else if command.len() == 5 && head3.is_some_and(|p| p.eq_ignore_ascii_case("wav")) {
        BlockKind::SampleInfo
    } else if head3.is_some_and(|p| p.eq_ignore_ascii_case("bpm")) {
        BlockKind::TempoTable
    } else if is_note_command(command) {
        BlockKind::NotePlacement
    } else {
        BlockKind::Unrecognized
    }
}

/// 按空行将文本切分为命令块，丢弃空块
#[must_use]
pub fn split_blocks(text: &str) -> Vec<Block<'_>> {
    let mut line = 1;
    let mut blocks = Vec::new();
    for chunk in text.split(BLOCK_SEPARATOR) {
        let block = Block::new(line, chunk);
        line += chunk.matches('\n').count() + 2;
        if !block.is_blank() {
            blocks.push(block);
        }
    }
    blocks
}

/// 谱面载入器
#[derive(Debug, Clone, Copy, Default)]
pub struct ChartLoader {
    /// 格式错误块的处理方式
    policy: MalformedBlockPolicy,
}

impl ChartLoader {
    /// 以指定的错误块处理方式创建载入器
    #[must_use]
    pub const fn new(policy: MalformedBlockPolicy) -> Self {
        Self { policy }
    }

    /// 解析已规范化（`\n` 换行、制表符替换为空格）的谱面文本
    ///
    /// # Errors
    ///
    /// - 处理方式为 [`MalformedBlockPolicy::Abort`] 且某块格式错误
    pub fn load<P>(&self, text: &str) -> Result<Chart<P>, ChartError> {
        let mut music_info = MusicInfo::default();
        let mut samples = SampleRegistry::new();
        let mut tempo = TempoMap::new();
        let mut builder = TimelineBuilder::new();
        let mut skipped = Vec::new();

        for block in split_blocks(text) {
            let Some(head) = block.head() else {
                continue;
            };
            let kind = classify(&head.command);
            let result = match kind {
                BlockKind::MusicInfo => {
                    let mut staged = music_info.clone();
                    match staged.setup_block(&block) {
                        Ok(bpm) => {
                            if let Some(bpm) = bpm {
                                tempo.set_base(bpm);
                            }
                            music_info = staged;
                            Ok(())
                        }
                        Err(e) => Err(e),
                    }
                }
                BlockKind::SampleInfo => samples.setup_block(&block),
                BlockKind::TempoTable => {
                    let mut staged = tempo.clone();
                    staged.setup_block(&block).map(|()| tempo = staged)
                }
                BlockKind::NotePlacement => builder
                    .setup_block(&block, &mut tempo)
                    .map(|notes| debug!(line = block.start_line(), notes, "音符块")),
                BlockKind::Unrecognized => {
                    debug!(line = block.start_line(), command = %head.command, "忽略无法识别的块");
                    Ok(())
                }
            };
            let Err(e) = result else {
                continue;
            };
            match self.policy {
                MalformedBlockPolicy::Abort => return Err(e),
                MalformedBlockPolicy::Skip => {
                    warn!(block = block.start_line(), kind = ?kind, error = %e, "跳过格式错误的块");
                    skipped.push(e);
                }
            }
        }

        let timeline = builder.build();
        info!(
            samples = samples.len(),
            tempo_entries = tempo.len(),
            notes = timeline.len(),
            skipped = skipped.len(),
            "谱面解析完成"
        );
        Ok(Chart {
            music_info,
            samples,
            tempo,
            timeline,
            skipped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::sample::SampleId;

    const CHART: &str = "\
; header comment
#TITLE: Test Song
#ARTIST: Tester
#BPM: 120
#DLEVEL: 35

#WAV01: kick.wav
#VOLUME01: 90
#WAV02: snare.wav
#PAN02: 30

#BPM01: 240

#AVI01: movie.avi

#00011: 0100
#00012: 00000200
#00108: 01
#00111: 0101
";

    #[test]
    fn classifies_blocks_by_first_command() {
        assert_eq!(classify("TITLE"), BlockKind::MusicInfo);
        assert_eq!(classify("title"), BlockKind::MusicInfo);
        assert_eq!(classify("WAV0Z"), BlockKind::SampleInfo);
        assert_eq!(classify("wav01"), BlockKind::SampleInfo);
        assert_eq!(classify("BPM01"), BlockKind::TempoTable);
        assert_eq!(classify("bpm"), BlockKind::TempoTable);
        assert_eq!(classify("00111"), BlockKind::NotePlacement);
        assert_eq!(classify("AVI01"), BlockKind::Unrecognized);
        assert_eq!(classify("ARTIST"), BlockKind::Unrecognized);
        assert_eq!(classify("WAV"), BlockKind::Unrecognized);
    }

    #[test]
    fn splits_blocks_with_line_numbers() {
        let blocks = split_blocks("#A:1\n\n\n#B:2\n#C:3\n\n\n\n#D:4\n");
        let starts: Vec<usize> = blocks.iter().map(Block::start_line).collect();
        assert_eq!(starts, vec![1, 3, 9]);
        let lines: Vec<usize> = blocks
            .iter()
            .flat_map(|b| b.commands().map(|(l, _)| l).collect::<Vec<_>>())
            .collect();
        assert_eq!(lines, vec![1, 4, 5, 9]);
    }

    #[test]
    fn loads_complete_chart() {
        let chart = ChartLoader::default().load::<()>(CHART);
        let Ok(chart) = chart else {
            panic!("chart should load");
        };
        assert_eq!(chart.music_info.title.as_deref(), Some("Test Song"));
        assert_eq!(chart.music_info.level.as_deref(), Some("35"));
        assert_eq!(chart.samples.len(), 2);
        let snare = chart.samples.get(SampleId(2)).map(|d| d.pan);
        assert_eq!(snare, Some(0.3));
        assert_eq!(chart.tempo.len(), 1);
        assert!(chart.skipped.is_empty());
        let events: Vec<(u16, f64)> = chart
            .timeline
            .events()
            .iter()
            .map(|e| (e.sample_id.0, e.time_ms))
            .collect();
        assert_eq!(
            events,
            vec![(1, 0.0), (2, 1000.0), (1, 2000.0), (1, 2500.0)]
        );
        assert!((chart.tempo.active_bpm() - 240.0).abs() < f64::EPSILON);
    }

    #[test]
    fn base_tempo_seeds_measure_length() {
        let text = "#TITLE: fast\n#BPM: 240\n\n#00111: 01";
        let Ok(chart) = ChartLoader::default().load::<()>(text) else {
            panic!("chart should load");
        };
        assert_eq!(chart.timeline.events().first().map(|e| e.time_ms), Some(1000.0));
    }

    #[test]
    fn skip_policy_keeps_going_after_malformed_block() {
        let text = "#WAV01: a.wav\n\n#00011: 01\n#00012: 0?\n\n#00111: 01";
        let Ok(chart) = ChartLoader::new(MalformedBlockPolicy::Skip).load::<()>(text) else {
            panic!("skip policy should not fail");
        };
        assert_eq!(chart.skipped.len(), 1);
        assert_eq!(chart.skipped.first().map(ChartError::line), Some(4));
        assert_eq!(chart.timeline.len(), 1);
        assert_eq!(chart.timeline.events().first().map(|e| e.time_ms), Some(2000.0));
    }

    #[test]
    fn abort_policy_surfaces_first_error() {
        let text = "#TITLE: x\n#BPM: slow\n\n#00011: 01";
        let err = ChartLoader::new(MalformedBlockPolicy::Abort).load::<()>(text);
        assert!(matches!(err, Err(ChartError::InvalidNumber { line: 2, .. })));
    }

    #[test]
    fn block_without_command_head_is_ignored() {
        let text = "free text\n#00011: 01\n\n#00012: 02";
        let Ok(chart) = ChartLoader::default().load::<()>(text) else {
            panic!("chart should load");
        };
        assert_eq!(chart.timeline.len(), 1);
    }
}

//! DTX 谱面解析
//!
//! - `command`：单行命令分词与命令块
//! - `loader`：按块分派的谱面载入器
//! - `music_info` / `sample` / `tempo` / `timeline`：各类块的构建器
//! - `dtx`：从文件载入谱面并解析音频路径

pub mod base36;
pub mod command;
pub mod dtx;
pub mod error;
pub mod loader;
pub mod music_info;
pub mod sample;
pub mod tempo;
pub mod timeline;

use self::error::ChartError;
use self::music_info::MusicInfo;
use self::sample::SampleRegistry;
use self::tempo::TempoMap;
use self::timeline::Timeline;

/// 一次载入的结果，`P` 为音频载入器产出的音源数据
#[derive(Debug)]
pub struct Chart<P> {
    /// 曲目信息
    pub music_info: MusicInfo,
    /// 音源定义表
    pub samples: SampleRegistry<P>,
    /// 速度表（当前 BPM 为最后一次变速后的值）
    pub tempo: TempoMap,
    /// 已排序的音符时间轴
    pub timeline: Timeline,
    /// 被跳过的格式错误块
    pub skipped: Vec<ChartError>,
}

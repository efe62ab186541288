//! 曲目信息块

use super::command::Block;
use super::error::ChartError;
use super::tempo::parse_bpm;

/// 曲目元数据，每次载入谱面时构建一次
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MusicInfo {
    /// 曲名
    pub title: Option<String>,
    /// 艺术家
    pub artist: Option<String>,
    /// 注释
    pub comment: Option<String>,
    /// 曲风
    pub genre: Option<String>,
    /// 试听音频
    pub preview_sound: Option<String>,
    /// 预览图
    pub preview_image: Option<String>,
    /// 预览视频
    pub preview_movie: Option<String>,
    /// 背景图
    pub background_image: Option<String>,
    /// 难度标签
    pub level: Option<String>,
    /// 基础 BPM
    pub bpm: Option<f64>,
}

impl MusicInfo {
    /// 读取曲目信息块，未知命令被忽略
    ///
    /// 返回本块中出现的 `#BPM`（若有）。
    ///
    /// # Errors
    ///
    /// - `#BPM` 的值不是有限正数
    pub fn setup_block(&mut self, block: &Block<'_>) -> Result<Option<f64>, ChartError> {
        let mut block_bpm = None;
        for (line, cmd) in block.commands() {
            match cmd.command.to_ascii_lowercase().as_str() {
                "title" => self.title = Some(cmd.value),
                "artist" => self.artist = Some(cmd.value),
                "comment" => self.comment = Some(cmd.value),
                "genre" => self.genre = Some(cmd.value),
                "preview" => self.preview_sound = Some(cmd.value),
                "preimage" => self.preview_image = Some(cmd.value),
                "premovie" => self.preview_movie = Some(cmd.value),
                "background" => self.background_image = Some(cmd.value),
                "dlevel" => self.level = Some(cmd.value),
                "bpm" => {
                    let bpm = parse_bpm(line, &cmd)?;
                    self.bpm = Some(bpm);
                    block_bpm = Some(bpm);
                }
                _ => {}
            }
        }
        Ok(block_bpm)
    }
}

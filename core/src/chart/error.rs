//! 谱面格式错误

use thiserror::Error;

/// 谱面块处理失败的原因
///
/// 每个变体都带有出错命令所在的源文件行号（从 1 开始）。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChartError {
    /// 36 进制编号或音符记号非法
    #[error("line {line}: invalid base-36 token `{token}` in #{command}")]
    InvalidBase36 {
        /// 行号
        line: usize,
        /// 命令名
        command: String,
        /// 出错的记号
        token: String,
    },

    /// 数值字段无法解析
    #[error("line {line}: invalid number `{value}` for #{command}")]
    InvalidNumber {
        /// 行号
        line: usize,
        /// 命令名
        command: String,
        /// 原始值
        value: String,
    },

    /// BPM 不是有限正数
    #[error("line {line}: tempo must be positive and finite, got {bpm}")]
    InvalidTempo {
        /// 行号
        line: usize,
        /// 解析得到的 BPM
        bpm: f64,
    },
}

impl ChartError {
    /// 出错命令所在行号
    #[must_use]
    pub const fn line(&self) -> usize {
        match self {
            Self::InvalidBase36 { line, .. }
            | Self::InvalidNumber { line, .. }
            | Self::InvalidTempo { line, .. } => *line,
        }
    }
}

//! 单行命令分词与命令块
//!
//! 一行合法命令形如 `#NAME:value`，`;` 之后的内容视为注释。

use super::error::ChartError;

/// 命令前缀
pub const COMMAND_PREFIX: char = '#';
/// 命令名与值的分隔符
pub const SEPARATOR: char = ':';
/// 注释起始符
pub const COMMENT: char = ';';

/// 一条解析后的命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// 命令名（不含 `#`，保留大小写）
    pub command: String,
    /// 命令值（已去除首尾空白）
    pub value: String,
}

impl Command {
    /// 命令名的最后两个字符（编号后缀）
    #[must_use]
    pub fn suffix(&self) -> Option<&str> {
        let start = self.command.len().checked_sub(2)?;
        self.command.get(start..)
    }

    /// 命令名去掉两位后缀后的前缀
    #[must_use]
    pub fn prefix(&self) -> Option<&str> {
        let end = self.command.len().checked_sub(2)?;
        self.command.get(..end)
    }

    /// 将两位 36 进制后缀解码为编号
    ///
    /// # Errors
    ///
    /// - 后缀不足两个字符或包含非法字符
    pub fn suffix_id(&self, line: usize) -> Result<u16, ChartError> {
        self.suffix()
            .and_then(super::base36::decode)
            .ok_or_else(|| ChartError::InvalidBase36 {
                line,
                command: self.command.clone(),
                token: self.suffix().unwrap_or(self.command.as_str()).to_string(),
            })
    }
}

/// 截断 `;` 之后的注释并去除首尾空白
#[must_use]
pub fn strip_comment(line: &str) -> &str {
    line.split_once(COMMENT).map_or(line, |(head, _)| head).trim()
}

/// 判断一行是否为合法命令：非空、以 `#` 开头、且包含 `:`
#[must_use]
pub fn is_valid_command(line: &str) -> bool {
    let line = strip_comment(line);
    line.starts_with(COMMAND_PREFIX) && line.contains(SEPARATOR)
}

/// 将一行拆分为命令名与值
///
/// 第一个 `:` 之前为命令名，其余片段去掉分隔符后拼接作为值。
/// 调用方应先用 [`is_valid_command`] 过滤。
#[must_use]
pub fn build_command(line: &str) -> Command {
    let line = strip_comment(line);
    let body = line.strip_prefix(COMMAND_PREFIX).unwrap_or(line);
    let mut parts = body.split(SEPARATOR);
    let command = parts.next().unwrap_or_default().trim().to_string();
    let value = parts.collect::<String>().trim().to_string();
    Command { command, value }
}

/// 合法时解析命令，否则返回 `None`
#[must_use]
pub fn parse_line(line: &str) -> Option<Command> {
    is_valid_command(line).then(|| build_command(line))
}

/// 以空行分隔的命令块
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block<'a> {
    /// 块内第一行在源文件中的行号（从 1 开始）
    start_line: usize,
    /// 块内原始行
    lines: Vec<&'a str>,
}

impl<'a> Block<'a> {
    /// 由起始行号与块文本构造命令块
    #[must_use]
    pub fn new(start_line: usize, text: &'a str) -> Self {
        Self {
            start_line,
            lines: text.split('\n').collect(),
        }
    }

    /// 块的起始行号
    #[must_use]
    pub const fn start_line(&self) -> usize {
        self.start_line
    }

    /// 块是否只含空白
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.lines.iter().all(|l| l.trim().is_empty())
    }

    /// 用于判定块类型的首行：跳过去除注释后为空的前导行
    #[must_use]
    pub fn head(&self) -> Option<Command> {
        self.lines
            .iter()
            .find(|l| !strip_comment(l).is_empty())
            .and_then(|l| parse_line(l))
    }

    /// 按顺序遍历块内的合法命令及其行号，非命令行被跳过
    pub fn commands(&self) -> impl Iterator<Item = (usize, Command)> + '_ {
        self.lines
            .iter()
            .enumerate()
            .filter_map(|(i, l)| parse_line(l).map(|c| (self.start_line + i, c)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_simple_command() {
        let cmd = parse_line("#TITLE:Test Song");
        assert_eq!(
            cmd,
            Some(Command {
                command: "TITLE".into(),
                value: "Test Song".into(),
            })
        );
    }

    #[test]
    fn strips_comment_before_parsing() {
        let cmd = parse_line("#TITLE:Foo;bar").map(|c| c.value);
        assert_eq!(cmd.as_deref(), Some("Foo"));
        assert!(!is_valid_command("#TITLE Foo ; has: colon in comment"));
    }

    #[test]
    fn rejects_lines_without_separator_or_prefix() {
        assert!(!is_valid_command("#TITLE Test"));
        assert!(!is_valid_command("TITLE:Test"));
        assert!(!is_valid_command(""));
        assert!(!is_valid_command("; #TITLE:Test"));
    }

    #[test]
    fn rejoins_extra_separators_into_value() {
        let cmd = build_command("#WAV01: C:\\snd\\kick.wav ");
        assert_eq!(cmd.command, "WAV01");
        assert_eq!(cmd.value, "C\\snd\\kick.wav");
    }

    #[test]
    fn exposes_suffix_and_prefix() {
        let cmd = build_command("#VOLUME1Z:80");
        assert_eq!(cmd.prefix(), Some("VOLUME"));
        assert_eq!(cmd.suffix(), Some("1Z"));
        assert_eq!(cmd.suffix_id(1), Ok(36 + 35));
        let short = build_command("#A:1");
        assert_eq!(short.suffix(), None);
        assert!(short.suffix_id(7).is_err());
    }

    #[test]
    fn block_reports_line_numbers() {
        let block = Block::new(10, "; header comment\n#TITLE:a\nfree text\n#ARTIST:b");
        assert_eq!(block.head().map(|c| c.command), Some("TITLE".into()));
        let lines: Vec<usize> = block.commands().map(|(l, _)| l).collect();
        assert_eq!(lines, vec![11, 13]);
    }
}

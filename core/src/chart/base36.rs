//! 36 进制两位编号解码
//!
//! DTX 中的音源编号、轨道编号、BPM 表编号以及音符序列都使用两位 36 进制：
//! `0-9` 对应 0–9，`A-Z` 与 `a-z` 均对应 10–35。

/// 两位 36 进制可表示的最大值（`ZZ`）
pub const MAX_ID: u16 = 36 * 36 - 1;

/// 解码单个 36 进制字符
#[must_use]
pub const fn digit(c: u8) -> Option<u16> {
    match c {
        b'0'..=b'9' => Some((c - b'0') as u16),
        b'A'..=b'Z' => Some((c - b'A') as u16 + 10),
        b'a'..=b'z' => Some((c - b'a') as u16 + 10),
        _ => None,
    }
}

/// 解码两字节的 36 进制记号
#[must_use]
pub const fn decode_pair(pair: &[u8]) -> Option<u16> {
    let &[hi, lo] = pair else {
        return None;
    };
    match (digit(hi), digit(lo)) {
        (Some(hi), Some(lo)) => Some(hi * 36 + lo),
        _ => None,
    }
}

/// 解码两字符的 36 进制字符串，长度不为 2 或含非法字符时返回 `None`
#[must_use]
pub const fn decode(token: &str) -> Option<u16> {
    decode_pair(token.as_bytes())
}

/// 将值按两字节切分为记号序列，末尾多余的单个字节被忽略
pub fn tokens(value: &str) -> impl Iterator<Item = &[u8]> {
    value.as_bytes().chunks_exact(2)
}

//! 系统配置定义与解析

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Deserializer};
use tracing::info;

use crate::chart::loader::MalformedBlockPolicy;

/// 系统运行时配置
#[derive(Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct Sys {
    /// 播放调度配置
    pub playback: Playback,
    /// 发声实例池配置
    pub voices: Voices,
    /// 谱面与音源载入配置
    pub loader: Loader,
}

/// 播放调度配置
#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Playback {
    /// 提前派发的时间窗口（毫秒）
    pub preload_ms: f64,
    /// 开始播放前的延迟（毫秒）
    pub start_delay_ms: f64,
    #[serde(rename = "tick_ms", deserialize_with = "de_duration_ms")]
    /// 主循环间隔
    pub tick: Duration,
}

impl Default for Playback {
    fn default() -> Self {
        Self {
            preload_ms: 2000.0,
            start_delay_ms: 1000.0,
            tick: Duration::from_millis(16),
        }
    }
}

/// 发声实例池配置
#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Voices {
    /// 预创建的实例数
    pub initial_capacity: usize,
    #[serde(deserialize_with = "de_growth")]
    /// 耗尽时的扩容倍数，须为大于 1 的有限数
    pub growth: f64,
}

impl Default for Voices {
    fn default() -> Self {
        Self {
            initial_capacity: 32,
            growth: 2.0,
        }
    }
}

/// 载入配置
#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Loader {
    /// 音源解码线程数
    pub workers: usize,
    /// 格式错误块的处理方式
    pub malformed_blocks: MalformedBlockPolicy,
    /// 音源文件缺失时按顺序尝试的扩展名
    pub audio_exts: Vec<String>,
}

impl Default for Loader {
    fn default() -> Self {
        Self {
            workers: 4,
            malformed_blocks: MalformedBlockPolicy::default(),
            audio_exts: ["ogg", "wav", "flac", "mp3"].map(String::from).to_vec(),
        }
    }
}

/// 从 TOML 字符串解析系统配置
///
/// # Errors
///
/// - TOML 解析失败
/// - 配置字段反序列化失败
pub fn parse_sys_str(s: &str) -> Result<Sys> {
    let cfg: Sys = toml::from_str(s)?;
    Ok(cfg)
}

/// 从指定路径加载系统配置（TOML）
///
/// # Errors
///
/// - 读取文件失败
/// - TOML 解析失败
/// - 配置字段反序列化失败
pub fn load_sys(path: &Path) -> Result<Sys> {
    let s = std::fs::read_to_string(path)?;
    parse_sys_str(&s)
}

/// 加载系统配置，文件不存在时使用默认值
///
/// # Errors
///
/// - 文件存在但读取或解析失败
pub fn load_sys_or_default(path: &Path) -> Result<Sys> {
    if !path.exists() {
        info!(path = %path.display(), "配置文件不存在，使用默认配置");
        return Ok(Sys::default());
    }
    load_sys(path)
}

/// 反序列化毫秒为 `Duration`
fn de_duration_ms<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let ms = f64::deserialize(deserializer)?;
    if !ms.is_finite() || ms <= 0.0 {
        return Err(serde::de::Error::custom("tick_ms must be a positive number"));
    }
    Ok(Duration::from_nanos((ms * 1_000_000.0).round() as u64))
}

/// 反序列化扩容倍数，拒绝非有限值与不大于 1 的值
fn de_growth<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let growth = f64::deserialize(deserializer)?;
    if !growth.is_finite() || growth <= 1.0 {
        return Err(serde::de::Error::custom(
            "voices.growth must be a finite number greater than 1",
        ));
    }
    Ok(growth)
}

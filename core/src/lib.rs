//! DTX 谱面解析与音源播放调度
//!
//! - `chart`：谱面分词、分块载入、速度表、时间轴与音源表
//! - `playback`：时钟、预读调度器与发声实例池
//! - `loops`：rodio 解码/播放端与主循环
//! - `config` / `filesystem` / `logging`：配置、文件读取与日志

pub mod chart;
pub mod config;
pub mod filesystem;
pub mod logging;
pub mod loops;
pub mod playback;

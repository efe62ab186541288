//! 事件循环模块入口
//!
//! 提供两个子模块：
//! - `audio`：基于 rodio 的音源解码线程池与播放端
//! - `main_loop`：等待音源载入、推进调度器并分发播放的主循环

pub mod audio;
pub mod main_loop;

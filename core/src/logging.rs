//! 日志系统初始化模块

/// 初始化全局日志系统
///
/// 使用 `tracing-subscriber`，支持环境变量 `RUST_LOG` 控制日志级别。
/// 日志写到标准错误，标准输出留给 `--inspect` 等摘要输出。
///
/// # 使用方式
///
/// ```bash
/// RUST_LOG=info dtx-player --chart song.dtx    # info 及以上级别
/// RUST_LOG=debug dtx-player --chart song.dtx   # debug 及以上级别
/// RUST_LOG=warn dtx-player --chart song.dtx    # 仅警告和错误
/// ```
pub fn init_logging() {
    use tracing_subscriber::fmt::time::FormatTime;
    use tracing_subscriber::{EnvFilter, fmt};

    // 只显示 HH:MM:SS.微秒（UTC）
    struct ClockTime;

    impl FormatTime for ClockTime {
        fn format_time(&self, w: &mut fmt::format::Writer<'_>) -> std::fmt::Result {
            let now = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default();

            let total_secs = now.as_secs();
            let micros = now.subsec_micros();

            let h = (total_secs / 3600) % 24;
            let m = (total_secs / 60) % 60;
            let s = total_secs % 60;

            write!(w, "{h:02}:{m:02}:{s:02}.{micros:06}")
        }
    }

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // 重复初始化（如集成测试）时保持已有订阅者
    let _ = fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_ansi(true)
        .with_timer(ClockTime)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}

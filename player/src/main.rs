//! # DTX Player 主程序

use std::{io::Write, path::PathBuf};

use anyhow::Result;
use clap::Parser;
use futures_lite::future;
use tracing::info;

use dtx_player::{
    chart::{Chart, dtx::load_dtx_and_collect_paths},
    config::load_sys_or_default,
    logging,
    loops::{
        audio::{DecodedAudio, RodioLoader, RodioSink},
        main_loop::{self, Session},
    },
    playback::{clock::GameClock, scheduler::Scheduler, voice_pool::VoicePool},
};

#[derive(Parser)]
#[command(version, about = "Play a DTX drum chart through the default audio device")]
/// 命令行参数
struct ExecArgs {
    #[arg(long)]
    /// 要播放的 DTX 文件路径
    chart: PathBuf,
    #[arg(long, default_value = "config_sys.toml")]
    /// 系统配置文件路径，不存在时使用默认配置
    config: PathBuf,
    #[arg(long)]
    /// 只输出谱面摘要，不打开音频设备
    inspect: bool,
}

/// 将谱面摘要写到标准输出
fn print_summary<P>(chart: &Chart<P>) -> Result<()> {
    let info = &chart.music_info;
    let mut out = std::io::stdout().lock();
    writeln!(out, "title: {}", info.title.as_deref().unwrap_or_default())?;
    writeln!(out, "artist: {}", info.artist.as_deref().unwrap_or_default())?;
    writeln!(out, "samples: {}", chart.samples.len())?;
    writeln!(out, "notes: {}", chart.timeline.len())?;
    writeln!(out, "length_ms: {}", chart.timeline.last_time_ms())?;
    for entry in chart.tempo.entries() {
        writeln!(out, "tempo {}: {}", entry.id.0, entry.bpm)?;
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = ExecArgs::parse();
    logging::init_logging();
    let sys = load_sys_or_default(&args.config)?;
    let chart: Chart<DecodedAudio> =
        future::block_on(load_dtx_and_collect_paths(args.chart, &sys.loader))?;

    if args.inspect {
        return print_summary(&chart);
    }

    let Chart {
        samples, timeline, ..
    } = chart;
    let clock = GameClock::new();
    let sink = RodioSink::open(clock)?;
    let loader = RodioLoader::new(sys.loader.workers)?;
    let mut session = Session::new(
        samples,
        Scheduler::new(sys.playback.preload_ms),
        VoicePool::new(sys.voices.initial_capacity, sys.voices.growth),
        sink,
    );
    let requested = session.request_samples(&loader);
    info!(requested, "已请求载入音源");
    let summary = main_loop::run(&mut session, &clock, timeline, &sys.playback);
    info!(
        dispatched = summary.dispatched,
        muted = summary.muted,
        "退出"
    );
    Ok(())
}

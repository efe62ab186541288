//! DTX 文件载入与音源路径解析

use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::{info, warn};

use super::Chart;
use super::loader::ChartLoader;
use super::sample::SampleId;
use crate::{config, filesystem};

/// 将谱面中的 `\` 路径分隔符统一为 `/`
#[must_use]
pub fn normalize_separators(path: &Path) -> PathBuf {
    PathBuf::from(path.to_string_lossy().replace('\\', "/"))
}

/// 加载 DTX 文件，并把音源路径解析为谱面目录下实际存在的文件
///
/// # Errors
///
/// - 读取 DTX 文件失败
/// - 以 `abort` 方式载入时遇到格式错误的块
pub async fn load_dtx_and_collect_paths<P>(
    dtx_path: PathBuf,
    settings: &config::Loader,
) -> Result<Chart<P>> {
    let text = filesystem::read_chart_text(&dtx_path).await?;
    let mut chart = ChartLoader::new(settings.malformed_blocks).load::<P>(&text)?;
    info!(title = ?chart.music_info.title, "DTX 标题");
    info!(artist = ?chart.music_info.artist, "DTX 艺术家");
    info!(bpm = ?chart.music_info.bpm, "DTX 基础 BPM");
    if !chart.skipped.is_empty() {
        warn!(count = chart.skipped.len(), "部分块格式错误已跳过");
    }

    let dtx_dir = dtx_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();
    let (ids, child_list): (Vec<SampleId>, Vec<PathBuf>) = chart
        .samples
        .audio_paths()
        .map(|(id, p)| (id, normalize_separators(p)))
        .unzip();
    let exts: Vec<&str> = settings.audio_exts.iter().map(String::as_str).collect();
    let resolved = filesystem::resolve_paths_by_ext_async(&dtx_dir, &child_list, &exts).await;
    for (id, chosen) in ids.into_iter().zip(resolved) {
        chart.samples.set_audio_path(id, chosen);
    }
    Ok(chart)
}

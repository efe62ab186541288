//! 谱面文本读取与资源路径查找

use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use async_fs as afs;
use chardetng::EncodingDetector;
use futures_lite::{StreamExt, stream};
use tracing::{debug, warn};

/// 读取谱面文件并解码为规范化文本
///
/// # Errors
///
/// - 读取文件失败
pub async fn read_chart_text(path: &Path) -> Result<String> {
    let bytes = afs::read(path)
        .await
        .with_context(|| format!("failed to read chart {}", path.display()))?;
    Ok(decode_chart_bytes(&bytes))
}

/// 探测编码并解码谱面字节（兼容 Shift-JIS 等旧编码），再规范化换行与制表符
#[must_use]
pub fn decode_chart_bytes(bytes: &[u8]) -> String {
    let mut det = EncodingDetector::new();
    det.feed(bytes, true);
    let enc = det.guess(None, true);
    let (text, used, had_errors) = enc.decode(bytes);
    debug!(encoding = used.name(), "谱面编码");
    if had_errors {
        warn!(encoding = used.name(), "谱面包含无法解码的字节，已替换");
    }
    normalize_chart_text(&text)
}

/// `\r\n` 与 `\r` 统一为 `\n`，制表符替换为空格
#[must_use]
pub fn normalize_chart_text(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n").replace('\t', " ")
}

/// 在各子路径所在目录中按扩展名优先级查找同名文件
///
/// 返回以“目录/文件主名”为键的映射；`exts` 越靠前优先级越高，比较时忽略大小写。
pub async fn choose_paths_by_ext_async(
    parent: &Path,
    children: &[PathBuf],
    exts: &[&str],
) -> HashMap<PathBuf, PathBuf> {
    let dirs: HashSet<PathBuf> = std::iter::once(parent.to_path_buf())
        .chain(
            children
                .iter()
                .map(|c| parent.join(c))
                .map(|p| p.parent().unwrap_or(parent).to_path_buf()),
        )
        .collect();

    let mut found: HashMap<PathBuf, (usize, PathBuf)> = HashMap::new();
    for dir_path in dirs {
        let Ok(mut dir) = afs::read_dir(&dir_path).await else {
            continue;
        };
        let raw: Vec<Result<afs::DirEntry, std::io::Error>> = StreamExt::collect(&mut dir).await;
        let Ok(items) = raw.into_iter().collect::<Result<Vec<_>, _>>() else {
            continue;
        };
        let collected: Vec<Option<(String, String, PathBuf)>> = stream::iter(items)
            .then(|entry| async move {
                let Ok(ft) = entry.file_type().await else {
                    return None;
                };
                if !ft.is_file() {
                    return None;
                }
                let p = entry.path();
                let stem = p.file_stem().and_then(|s| s.to_str()).map(str::to_string)?;
                let ext = p.extension().and_then(|s| s.to_str()).map(str::to_string)?;
                Some((stem, ext, p))
            })
            .collect()
            .await;
        for (stem, e, p) in collected.into_iter().flatten() {
            let Some(rank) = exts.iter().position(|x| e.eq_ignore_ascii_case(x)) else {
                continue;
            };
            let key = dir_path.join(stem);
            if found.get(&key).is_some_and(|(r, _)| *r <= rank) {
                continue;
            }
            found.insert(key, (rank, p));
        }
    }
    found.into_iter().map(|(k, (_, p))| (k, p)).collect()
}

/// 将子路径解析为实际存在的文件
///
/// 原文件存在时直接使用；否则按扩展名优先级选择同名文件；都找不到时保留原路径。
pub async fn resolve_paths_by_ext_async(
    parent: &Path,
    children: &[PathBuf],
    exts: &[&str],
) -> Vec<PathBuf> {
    let index = choose_paths_by_ext_async(parent, children, exts).await;
    let mut resolved = Vec::with_capacity(children.len());
    for child in children {
        let base = parent.join(child);
        let exists = afs::metadata(&base).await.is_ok_and(|m| m.is_file());
        let chosen = if exists {
            base
        } else {
            index.get(&base.with_extension("")).cloned().unwrap_or(base)
        };
        resolved.push(chosen);
    }
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_lite::future::block_on;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("dtx-fs-{name}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn normalizes_line_endings_and_tabs() {
        let text = normalize_chart_text("#TITLE:\tA\r\n#ARTIST: B\r#BPM: 1");
        assert_eq!(text, "#TITLE: A\n#ARTIST: B\n#BPM: 1");
    }

    #[test]
    fn decodes_utf8_with_bom() {
        let bytes = b"\xEF\xBB\xBF#TITLE:abc\r\n";
        assert_eq!(decode_chart_bytes(bytes), "#TITLE:abc\n");
    }

    #[test]
    fn decodes_shift_jis() {
        let source = "#TITLE:夏祭りの夜に響く太鼓の音を聴きながら\n#ARTIST:ひらがなとカタカナのテストです\n";
        let (bytes, _, _) = encoding_rs::SHIFT_JIS.encode(source);
        assert_eq!(decode_chart_bytes(&bytes), source);
    }

    #[test]
    fn picks_extension_by_priority() {
        let dir = temp_dir("priority");
        std::fs::create_dir_all(dir.join("snd")).unwrap();
        std::fs::write(dir.join("snd").join("kick.mp3"), b"x").unwrap();
        std::fs::write(dir.join("snd").join("kick.OGG"), b"x").unwrap();
        std::fs::write(dir.join("snd").join("kick.txt"), b"x").unwrap();
        let children = vec![PathBuf::from("snd/kick.wav")];
        let index = block_on(choose_paths_by_ext_async(&dir, &children, &["ogg", "wav", "mp3"]));
        assert_eq!(
            index.get(&dir.join("snd").join("kick")),
            Some(&dir.join("snd").join("kick.OGG"))
        );
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn resolves_existing_then_fallback_then_given_path() {
        let dir = temp_dir("resolve");
        std::fs::write(dir.join("snare.wav"), b"x").unwrap();
        std::fs::write(dir.join("snare.ogg"), b"x").unwrap();
        std::fs::write(dir.join("hat.ogg"), b"x").unwrap();
        let children = vec![
            PathBuf::from("snare.wav"),
            PathBuf::from("hat.wav"),
            PathBuf::from("tom.wav"),
        ];
        let resolved = block_on(resolve_paths_by_ext_async(&dir, &children, &["ogg", "wav"]));
        assert_eq!(
            resolved,
            vec![dir.join("snare.wav"), dir.join("hat.ogg"), dir.join("tom.wav")]
        );
        let _ = std::fs::remove_dir_all(&dir);
    }
}

//! 音源定义与异步载入状态
//!
//! - 谱面解析阶段创建 [`SampleDefinition`]，此时尚未载入
//! - [`SampleRegistry::request_load`] 把载入请求交给外部 [`AudioLoader`]
//! - 载入结果经由注册表持有的单消费者通道回传，在主循环 tick 中统一应用
//!
//! 载入失败同样视为“已载入”，只是没有可播放数据，避免单个缺失音源阻塞开播。

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::mpsc,
};

use tracing::{debug, warn};

use super::command::{Block, Command};
use super::error::ChartError;

/// 音源编号（两位 36 进制，0..=1295）
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SampleId(pub u16);

/// 单个音源定义
#[derive(Debug)]
pub struct SampleDefinition<P> {
    /// 编号
    pub id: SampleId,
    /// 音频文件路径（谱面中写的相对路径，载入前可被重定位）
    pub audio_path: PathBuf,
    /// 音量 [0, 1]
    pub volume: f32,
    /// 声像 [-1, 1]
    pub pan: f32,
    /// 是否为 BGM 音源
    pub is_bgm: bool,
    /// 载入流程是否已结束（无论成败）
    loaded: bool,
    /// 载入成功后的可播放数据
    payload: Option<P>,
}

impl<P> SampleDefinition<P> {
    /// 以默认音量与声像创建未载入的定义
    #[must_use]
    pub const fn new(id: SampleId, audio_path: PathBuf) -> Self {
        Self {
            id,
            audio_path,
            volume: 1.0,
            pan: 0.0,
            is_bgm: false,
            loaded: false,
            payload: None,
        }
    }

    /// 载入流程是否已结束
    #[must_use]
    pub const fn loaded(&self) -> bool {
        self.loaded
    }

    /// 可播放数据，载入失败或未载入时为 `None`
    #[must_use]
    pub const fn payload(&self) -> Option<&P> {
        self.payload.as_ref()
    }
}

/// 发往外部载入器的请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    /// 音源编号
    pub id: SampleId,
    /// 音频文件路径
    pub path: PathBuf,
}

/// 载入完成消息
#[derive(Debug)]
pub struct LoadCompletion<P> {
    /// 音源编号
    pub id: SampleId,
    /// 载入结果
    pub result: anyhow::Result<P>,
}

/// 外部音频载入器
///
/// `load` 必须立即返回；完成后（成功或失败）通过 `reply` 发送恰好一条消息。
pub trait AudioLoader {
    /// 可播放数据类型
    type Payload;

    /// 发起一次非阻塞载入
    fn load(&self, request: LoadRequest, reply: mpsc::Sender<LoadCompletion<Self::Payload>>);
}

/// 音源注册表
#[derive(Debug)]
pub struct SampleRegistry<P> {
    /// 编号到定义的映射
    samples: BTreeMap<SampleId, SampleDefinition<P>>,
    /// 载入完成通道发送端（克隆给载入器）
    reply_tx: mpsc::Sender<LoadCompletion<P>>,
    /// 载入完成通道接收端
    reply_rx: mpsc::Receiver<LoadCompletion<P>>,
}

impl<P> Default for SampleRegistry<P> {
    fn default() -> Self {
        let (reply_tx, reply_rx) = mpsc::channel();
        Self {
            samples: BTreeMap::new(),
            reply_tx,
            reply_rx,
        }
    }
}

impl<P> SampleRegistry<P> {
    /// 创建空注册表
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册定义，返回被替换的同编号旧定义
    pub fn define(&mut self, definition: SampleDefinition<P>) -> Option<SampleDefinition<P>> {
        self.samples.insert(definition.id, definition)
    }

    /// 查询定义
    #[must_use]
    pub fn get(&self, id: SampleId) -> Option<&SampleDefinition<P>> {
        self.samples.get(&id)
    }

    /// 按编号顺序遍历定义
    pub fn iter(&self) -> impl Iterator<Item = &SampleDefinition<P>> {
        self.samples.values()
    }

    /// 定义数量
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// 是否没有任何定义
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// 修改音频路径（例如按谱面目录重定位），编号不存在时返回 `false`
    pub fn set_audio_path(&mut self, id: SampleId, path: PathBuf) -> bool {
        let Some(def) = self.samples.get_mut(&id) else {
            return false;
        };
        def.audio_path = path;
        true
    }

    /// 遍历编号与音频路径
    pub fn audio_paths(&self) -> impl Iterator<Item = (SampleId, &Path)> {
        self.samples
            .values()
            .map(|d| (d.id, d.audio_path.as_path()))
    }

    /// 请求载入单个音源，编号不存在时返回 `false`
    pub fn request_load<L>(&self, id: SampleId, loader: &L) -> bool
    where
        L: AudioLoader<Payload = P>,
    {
        let Some(def) = self.samples.get(&id) else {
            return false;
        };
        loader.load(
            LoadRequest {
                id,
                path: def.audio_path.clone(),
            },
            self.reply_tx.clone(),
        );
        true
    }

    /// 请求载入所有尚未完成载入的音源，返回请求数
    pub fn request_all<L>(&self, loader: &L) -> usize
    where
        L: AudioLoader<Payload = P>,
    {
        let pending: Vec<SampleId> = self
            .samples
            .values()
            .filter(|d| !d.loaded)
            .map(|d| d.id)
            .collect();
        pending
            .into_iter()
            .filter(|&id| self.request_load(id, loader))
            .count()
    }

    /// 应用一条载入完成消息
    ///
    /// 无论成败都会标记为已载入；失败时不设置可播放数据。
    pub fn complete(&mut self, completion: LoadCompletion<P>) {
        let LoadCompletion { id, result } = completion;
        let Some(def) = self.samples.get_mut(&id) else {
            warn!(id = id.0, "收到未知音源的载入结果");
            return;
        };
        match result {
            Ok(payload) => {
                debug!(id = id.0, path = %def.audio_path.display(), "音源已载入");
                def.payload = Some(payload);
            }
            Err(e) => {
                warn!(id = id.0, path = %def.audio_path.display(), error = %e, "音源载入失败，将静音");
                def.payload = None;
            }
        }
        def.loaded = true;
    }

    /// 取出并应用所有已到达的载入完成消息，返回处理条数
    pub fn drain_completions(&mut self) -> usize {
        let mut count = 0;
        while let Ok(completion) = self.reply_rx.try_recv() {
            self.complete(completion);
            count += 1;
        }
        count
    }

    /// 是否所有音源都已结束载入
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.samples.values().all(|d| d.loaded)
    }

    /// 载入进度（已结束，总数）
    #[must_use]
    pub fn progress(&self) -> (usize, usize) {
        let loaded = self.samples.values().filter(|d| d.loaded).count();
        (loaded, self.samples.len())
    }

    /// 读取音源定义块，返回本块新建的定义（尚未写入注册表）
    ///
    /// `#PANxx`/`#VOLUMExx`/`#BGMWAV` 作用于最近一条 `#WAVxx` 打开的定义，
    /// 与其自身后缀无关。
    ///
    /// # Errors
    ///
    /// - `#WAVxx` 编号不是两位 36 进制
    /// - 声像或音量不是整数
    pub fn parse_block(block: &Block<'_>) -> Result<Vec<SampleDefinition<P>>, ChartError> {
        let mut defined: Vec<SampleDefinition<P>> = Vec::new();
        for (line, cmd) in block.commands() {
            let lower = cmd.command.to_ascii_lowercase();
            if lower == "bgmwav" {
                if let Some(open) = defined.last_mut() {
                    open.is_bgm = true;
                } else {
                    warn!(line, "#BGMWAV 之前没有 #WAV 定义，已忽略");
                }
                continue;
            }
            let prefix = cmd.prefix().map(str::to_ascii_lowercase);
            match prefix.as_deref() {
                Some("wav") => {
                    let id = SampleId(cmd.suffix_id(line)?);
                    defined.push(SampleDefinition::new(id, PathBuf::from(&cmd.value)));
                }
                Some("pan") => {
                    let pan = parse_percent(line, &cmd, -100, 100)?;
                    match defined.last_mut() {
                        Some(open) => open.pan = pan,
                        None => warn!(line, "#PAN 之前没有 #WAV 定义，已忽略"),
                    }
                }
                Some("volume") => {
                    let volume = parse_percent(line, &cmd, 0, 100)?;
                    match defined.last_mut() {
                        Some(open) => open.volume = volume,
                        None => warn!(line, "#VOLUME 之前没有 #WAV 定义，已忽略"),
                    }
                }
                _ => warn!(line, command = %cmd.command, "不支持的音源命令"),
            }
        }
        Ok(defined)
    }

    /// 将一个音源定义块写入注册表；块出错时不写入任何定义
    ///
    /// # Errors
    ///
    /// - 见 [`SampleRegistry::parse_block`]
    pub fn setup_block(&mut self, block: &Block<'_>) -> Result<(), ChartError> {
        for def in Self::parse_block(block)? {
            let id = def.id;
            if self.define(def).is_some() {
                warn!(id = id.0, "音源编号重复定义，后者覆盖前者");
            }
        }
        Ok(())
    }
}

/// 解析整数百分比并钳制到 `[min, max]`，返回除以 100 后的值
fn parse_percent(line: usize, cmd: &Command, min: i32, max: i32) -> Result<f32, ChartError> {
    let raw: i32 = cmd.value.parse().map_err(|_| ChartError::InvalidNumber {
        line,
        command: cmd.command.clone(),
        value: cmd.value.clone(),
    })?;
    Ok(raw.clamp(min, max) as f32 / 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 按路径名决定成败的同步载入器
    struct FakeLoader;

    impl AudioLoader for FakeLoader {
        type Payload = String;

        fn load(&self, request: LoadRequest, reply: mpsc::Sender<LoadCompletion<String>>) {
            let result = if request.path.to_string_lossy().contains("missing") {
                Err(anyhow::anyhow!("not found"))
            } else {
                Ok(request.path.to_string_lossy().into_owned())
            };
            let _ = reply.send(LoadCompletion {
                id: request.id,
                result,
            });
        }
    }

    /// 只记录请求、从不回复的载入器
    #[derive(Default)]
    struct PendingLoader {
        requests: std::cell::RefCell<Vec<LoadRequest>>,
    }

    impl AudioLoader for PendingLoader {
        type Payload = String;

        fn load(&self, request: LoadRequest, _reply: mpsc::Sender<LoadCompletion<String>>) {
            self.requests.borrow_mut().push(request);
        }
    }

    fn registry(text: &str) -> SampleRegistry<String> {
        let mut reg = SampleRegistry::new();
        assert!(reg.setup_block(&Block::new(1, text)).is_ok());
        reg
    }

    #[test]
    fn pan_and_volume_apply_to_open_definition() {
        let reg = registry(
            "#WAV01: kick.wav\n#VOLUME01: 80\n#PAN01: -50\n#WAV02: snare.wav\n#PAN99: 150\n#BGMWAV: 02",
        );
        let kick = reg.get(SampleId(1)).map(|d| (d.volume, d.pan, d.is_bgm));
        assert_eq!(kick, Some((0.8, -0.5, false)));
        let snare = reg.get(SampleId(2)).map(|d| (d.volume, d.pan, d.is_bgm));
        assert_eq!(snare, Some((1.0, 1.0, true)));
    }

    #[test]
    fn unsupported_and_orphan_commands_are_skipped() {
        let reg = registry("#WAV0Z: a.wav\n#SIZE0Z: 100\n#BMP01: x.bmp");
        assert_eq!(reg.len(), 1);
        assert!(reg.get(SampleId(35)).is_some());
        let orphan = registry("#PAN01: 10\n#VOLUME01: 10\n#BGMWAV: 01");
        assert!(orphan.is_empty());
    }

    #[test]
    fn malformed_block_defines_nothing() {
        let mut reg: SampleRegistry<String> = SampleRegistry::new();
        let err = reg.setup_block(&Block::new(7, "#WAV01: a.wav\n#VOLUME01: loud"));
        assert!(matches!(err, Err(ChartError::InvalidNumber { line: 8, .. })));
        assert!(reg.is_empty());
        let err = reg.setup_block(&Block::new(1, "#WAV!!: a.wav"));
        assert!(matches!(err, Err(ChartError::InvalidBase36 { .. })));
    }

    #[test]
    fn ready_once_every_load_finishes_regardless_of_outcome() {
        let mut reg = registry("#WAV01: kick.wav\n#WAV02: missing.wav");
        assert!(!reg.is_ready());
        assert_eq!(reg.request_all(&FakeLoader), 2);
        assert!(!reg.is_ready());
        assert_eq!(reg.drain_completions(), 2);
        assert!(reg.is_ready());
        assert_eq!(reg.progress(), (2, 2));
        let kick = reg.get(SampleId(1)).and_then(SampleDefinition::payload);
        assert_eq!(kick.map(String::as_str), Some("kick.wav"));
        let missing = reg.get(SampleId(2));
        assert!(missing.is_some_and(|d| d.loaded() && d.payload().is_none()));
    }

    #[test]
    fn completions_may_arrive_out_of_order() {
        let mut reg = registry("#WAV01: a.wav\n#WAV02: b.wav");
        let loader = PendingLoader::default();
        assert_eq!(reg.request_all(&loader), 2);
        assert_eq!(loader.requests.borrow().len(), 2);
        reg.complete(LoadCompletion {
            id: SampleId(2),
            result: Ok("b".into()),
        });
        assert!(!reg.is_ready());
        assert_eq!(reg.progress(), (1, 2));
        reg.complete(LoadCompletion {
            id: SampleId(1),
            result: Err(anyhow::anyhow!("decode error")),
        });
        assert!(reg.is_ready());
    }

    #[test]
    fn never_completing_load_keeps_registry_not_ready() {
        let mut reg = registry("#WAV01: a.wav");
        assert_eq!(reg.request_all(&PendingLoader::default()), 1);
        assert_eq!(reg.drain_completions(), 0);
        assert!(!reg.is_ready());
        assert!(!reg.request_load(SampleId(5), &FakeLoader));
    }
}

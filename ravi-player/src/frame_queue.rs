//! Thread-safe decoded-frame buffer sitting between the decode thread and the
//! renderer: PTS-ordered retrieval, decode-ahead buffering, automatic
//! dropping when playback falls behind, and a small pool to avoid churn.
//!
//! Adapted from the original player's frame queue. MJPEG-in-AVI has no
//! B-frames, so the reorder buffer that module carried is dropped - frames
//! arrive in display order and go straight to the PTS-ordered display queue.

use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// A decoded RGB24 frame ready for display.
#[derive(Debug)]
pub struct Frame {
    pub id: u64,
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub pts_us: i64,
    pub keyframe: bool,
}

impl Frame {
    pub fn new(width: u32, height: u32) -> Self {
        static FRAME_COUNTER: AtomicU64 = AtomicU64::new(0);
        Self {
            id: FRAME_COUNTER.fetch_add(1, Ordering::Relaxed),
            data: vec![0u8; width as usize * height as usize * 3],
            width,
            height,
            pts_us: 0,
            keyframe: true,
        }
    }

    pub fn reset(&mut self) {
        self.pts_us = 0;
        self.keyframe = true;
    }

    pub fn copy_from(&mut self, data: &[u8], pts_us: i64) {
        let len = data.len().min(self.data.len());
        self.data[..len].copy_from_slice(&data[..len]);
        self.pts_us = pts_us;
    }
}

/// Pool of pre-allocated frames to avoid allocation during playback.
pub struct FramePool {
    frames: Mutex<Vec<Frame>>,
    width: u32,
    height: u32,
    allocated: AtomicU64,
    recycled: AtomicU64,
}

impl FramePool {
    pub fn new(width: u32, height: u32, initial_size: usize) -> Self {
        let frames = (0..initial_size).map(|_| Frame::new(width, height)).collect();
        Self {
            frames: Mutex::new(frames),
            width,
            height,
            allocated: AtomicU64::new(initial_size as u64),
            recycled: AtomicU64::new(0),
        }
    }

    pub fn acquire(&self) -> Frame {
        let mut pool = self.frames.lock();
        if let Some(mut frame) = pool.pop() {
            frame.reset();
            self.recycled.fetch_add(1, Ordering::Relaxed);
            frame
        } else {
            drop(pool);
            self.allocated.fetch_add(1, Ordering::Relaxed);
            Frame::new(self.width, self.height)
        }
    }

    pub fn release(&self, frame: Frame) {
        if frame.width == self.width && frame.height == self.height {
            self.frames.lock().push(frame);
        }
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            available: self.frames.lock().len(),
            total_allocated: self.allocated.load(Ordering::Relaxed),
            total_recycled: self.recycled.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PoolStats {
    pub available: usize,
    pub total_allocated: u64,
    pub total_recycled: u64,
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub max_frames: usize,
    pub target_buffer: usize,
    pub min_buffer: usize,
    pub max_pts_diff_us: i64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_frames: 32,
            target_buffer: 8,
            min_buffer: 2,
            max_pts_diff_us: 100_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    Empty,
    Buffering,
    Ready,
    Playing,
    Paused,
    Seeking,
    EndOfStream,
}

/// Thread-safe, PTS-ordered frame queue.
pub struct FrameQueue {
    config: QueueConfig,
    display_queue: Mutex<VecDeque<Frame>>,
    pool: Arc<FramePool>,
    state: RwLock<QueueState>,
    ready_cond: Condvar,
    space_cond: Condvar,
    last_pts_us: AtomicI64,
    frames_pushed: AtomicU64,
    frames_popped: AtomicU64,
    frames_dropped: AtomicU64,
    eos: AtomicBool,
    seek_generation: AtomicU64,
}

impl FrameQueue {
    pub fn new(config: QueueConfig, pool: Arc<FramePool>) -> Self {
        Self {
            config,
            display_queue: Mutex::new(VecDeque::with_capacity(32)),
            pool,
            state: RwLock::new(QueueState::Empty),
            ready_cond: Condvar::new(),
            space_cond: Condvar::new(),
            last_pts_us: AtomicI64::new(0),
            frames_pushed: AtomicU64::new(0),
            frames_popped: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
            eos: AtomicBool::new(false),
            seek_generation: AtomicU64::new(0),
        }
    }

    pub fn with_pool(pool: Arc<FramePool>) -> Self {
        Self::new(QueueConfig::default(), pool)
    }

    /// Push a decoded frame. Returns `false` if the queue is already full.
    pub fn push(&self, frame: Frame) -> bool {
        let mut queue = self.display_queue.lock();
        if queue.len() >= self.config.max_frames {
            return false;
        }
        self.insert_by_pts(&mut queue, frame);
        self.frames_pushed.fetch_add(1, Ordering::Relaxed);
        self.update_state(&queue);
        self.ready_cond.notify_one();
        drop(queue);
        self.space_cond.notify_one();
        true
    }

    pub fn push_blocking(&self, frame: Frame, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut queue = self.display_queue.lock();
        while queue.len() >= self.config.max_frames {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            self.space_cond.wait_for(&mut queue, remaining);
        }
        drop(queue);
        self.push(frame)
    }

    fn insert_by_pts(&self, queue: &mut VecDeque<Frame>, frame: Frame) {
        let pos = queue.iter().position(|f| f.pts_us > frame.pts_us);
        match pos {
            Some(idx) => queue.insert(idx, frame),
            None => queue.push_back(frame),
        }
    }

    pub fn signal_eos(&self) {
        self.eos.store(true, Ordering::SeqCst);
        *self.state.write() = QueueState::EndOfStream;
        self.ready_cond.notify_all();
    }

    pub fn pop(&self) -> Option<Frame> {
        let mut queue = self.display_queue.lock();
        let frame = queue.pop_front()?;
        self.last_pts_us.store(frame.pts_us, Ordering::Relaxed);
        self.frames_popped.fetch_add(1, Ordering::Relaxed);
        self.update_state(&queue);
        self.space_cond.notify_one();
        Some(frame)
    }

    pub fn pop_blocking(&self, timeout: Duration) -> Option<Frame> {
        let deadline = Instant::now() + timeout;
        let mut queue = self.display_queue.lock();
        while queue.is_empty() {
            if self.eos.load(Ordering::SeqCst) {
                return None;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            self.ready_cond.wait_for(&mut queue, remaining);
        }
        let frame = queue.pop_front()?;
        self.last_pts_us.store(frame.pts_us, Ordering::Relaxed);
        self.frames_popped.fetch_add(1, Ordering::Relaxed);
        self.update_state(&queue);
        self.space_cond.notify_one();
        Some(frame)
    }

    /// Return the frame closest to `target_pts_us`, dropping anything
    /// further behind than `max_pts_diff_us`.
    pub fn get_frame_for_pts(&self, target_pts_us: i64) -> Option<Frame> {
        let mut queue = self.display_queue.lock();
        while let Some(frame) = queue.front() {
            if target_pts_us - frame.pts_us > self.config.max_pts_diff_us {
                let dropped = queue.pop_front().unwrap();
                self.pool.release(dropped);
                self.frames_dropped.fetch_add(1, Ordering::Relaxed);
            } else {
                break;
            }
        }

        let front_within_tolerance = queue
            .front()
            .map(|f| (target_pts_us - f.pts_us).abs() <= self.config.max_pts_diff_us)
            .unwrap_or(false);
        if !front_within_tolerance {
            return None;
        }

        let frame = queue.pop_front().unwrap();
        self.last_pts_us.store(frame.pts_us, Ordering::Relaxed);
        self.frames_popped.fetch_add(1, Ordering::Relaxed);
        self.update_state(&queue);
        self.space_cond.notify_one();
        Some(frame)
    }

    pub fn release(&self, frame: Frame) {
        self.pool.release(frame);
    }

    pub fn flush(&self) {
        let generation = self.seek_generation.fetch_add(1, Ordering::SeqCst);
        let mut queue = self.display_queue.lock();
        while let Some(frame) = queue.pop_front() {
            self.pool.release(frame);
        }
        drop(queue);

        self.eos.store(false, Ordering::SeqCst);
        self.last_pts_us.store(0, Ordering::Relaxed);
        *self.state.write() = QueueState::Seeking;

        self.ready_cond.notify_all();
        self.space_cond.notify_all();
        debug!(generation, "frame queue flushed");
    }

    pub fn seek_generation(&self) -> u64 {
        self.seek_generation.load(Ordering::SeqCst)
    }

    pub fn set_state(&self, state: QueueState) {
        *self.state.write() = state;
    }

    pub fn state(&self) -> QueueState {
        *self.state.read()
    }

    fn update_state(&self, queue: &VecDeque<Frame>) {
        let mut state = self.state.write();
        if *state == QueueState::Paused || *state == QueueState::Seeking {
            return;
        }
        *state = if queue.is_empty() {
            if self.eos.load(Ordering::SeqCst) {
                QueueState::EndOfStream
            } else {
                QueueState::Empty
            }
        } else if queue.len() < self.config.min_buffer {
            QueueState::Buffering
        } else if queue.len() >= self.config.target_buffer {
            QueueState::Ready
        } else {
            QueueState::Playing
        };
    }

    pub fn stats(&self) -> QueueStats {
        let queue = self.display_queue.lock();
        QueueStats {
            state: *self.state.read(),
            buffered_frames: queue.len(),
            frames_pushed: self.frames_pushed.load(Ordering::Relaxed),
            frames_popped: self.frames_popped.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            last_pts_us: self.last_pts_us.load(Ordering::Relaxed),
            is_eos: self.eos.load(Ordering::SeqCst),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state(), QueueState::Ready | QueueState::Playing)
    }

    pub fn needs_buffering(&self) -> bool {
        matches!(self.state(), QueueState::Empty | QueueState::Buffering)
    }

    pub fn buffer_level(&self) -> f32 {
        let len = self.display_queue.lock().len();
        (len as f32 / self.config.max_frames as f32).min(1.0)
    }
}

#[derive(Debug, Clone)]
pub struct QueueStats {
    pub state: QueueState,
    pub buffered_frames: usize,
    pub frames_pushed: u64,
    pub frames_popped: u64,
    pub frames_dropped: u64,
    pub last_pts_us: i64,
    pub is_eos: bool,
}

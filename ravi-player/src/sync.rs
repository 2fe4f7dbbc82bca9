//! Audio/Video Synchronization
//!
//! Uses audio as master clock. Video adjusts to match.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::time::Instant;

/// Audio clock - updated from audio callback
pub struct AudioClock {
    pts_us: AtomicI64,
    last_update: Mutex<Instant>,
    sample_rate: u32,
    samples_played: AtomicU64,
    playing: AtomicBool,
}

impl AudioClock {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            pts_us: AtomicI64::new(0),
            last_update: Mutex::new(Instant::now()),
            sample_rate,
            samples_played: AtomicU64::new(0),
            playing: AtomicBool::new(false),
        }
    }

    pub fn update(&self, pts_us: i64) {
        self.pts_us.store(pts_us, Ordering::SeqCst);
        *self.last_update.lock() = Instant::now();
        self.samples_played.store(0, Ordering::SeqCst);
    }

    pub fn add_samples(&self, n: u64) {
        self.samples_played.fetch_add(n, Ordering::SeqCst);
    }

    pub fn time_us(&self) -> i64 {
        if !self.playing.load(Ordering::SeqCst) {
            return self.pts_us.load(Ordering::SeqCst);
        }
        let base = self.pts_us.load(Ordering::SeqCst);
        let samples = self.samples_played.load(Ordering::SeqCst);
        let sample_us = (samples as i64 * 1_000_000) / self.sample_rate as i64;
        base + sample_us
    }

    pub fn time_ms(&self) -> i64 {
        self.time_us() / 1000
    }

    pub fn set_playing(&self, p: bool) {
        self.playing.store(p, Ordering::SeqCst);
        if p {
            *self.last_update.lock() = Instant::now();
        }
    }
}

/// Video clock
pub struct VideoClock {
    pts_us: AtomicI64,
    frame_dur_us: AtomicI64,
    last_display: Mutex<Instant>,
}

impl VideoClock {
    pub fn new(fps: f64) -> Self {
        let dur = if fps > 0.0 {
            (1_000_000.0 / fps) as i64
        } else {
            33333
        };
        Self {
            pts_us: AtomicI64::new(0),
            frame_dur_us: AtomicI64::new(dur),
            last_display: Mutex::new(Instant::now()),
        }
    }

    pub fn update(&self, pts_us: i64) {
        self.pts_us.store(pts_us, Ordering::SeqCst);
        *self.last_display.lock() = Instant::now();
    }

    pub fn set_fps(&self, fps: f64) {
        if fps > 0.0 {
            self.frame_dur_us
                .store((1_000_000.0 / fps) as i64, Ordering::SeqCst);
        }
    }

    pub fn pts_us(&self) -> i64 {
        self.pts_us.load(Ordering::SeqCst)
    }
    pub fn pts_ms(&self) -> i64 {
        self.pts_us() / 1000
    }
    pub fn frame_duration_us(&self) -> i64 {
        self.frame_dur_us.load(Ordering::SeqCst)
    }
}


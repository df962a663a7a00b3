//! Execution scheduler: advances and redraws a running program at a
//! configurable cadence.
//!
//! A framerate of 0 means "follow the screen refresh rate". When
//! interpolation is enabled, rendering runs at the refresh cadence with
//! positions interpolated between steps, independent of the step cadence.
//! Changing the framerate or interpolation mode restarts a running loop.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Cadence assumed for "follow the screen refresh" and for interpolated
/// rendering.
const SCREEN_REFRESH_RATE: u32 = 60;

/// What the loop drives. The runtime implements this.
pub trait FrameTarget: Send + 'static {
    /// Advance the program by one step.
    fn step(&mut self);

    /// Redraw at the stepped positions.
    fn render(&mut self) {}

    /// Redraw at positions interpolated between steps.
    fn render_interpolated(&mut self) {}
}

pub struct FrameLoop<T: FrameTarget> {
    target: Arc<Mutex<T>>,
    framerate: u32,
    interpolation: bool,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl<T: FrameTarget> FrameLoop<T> {
    pub fn new(target: Arc<Mutex<T>>) -> Self {
        Self {
            target,
            framerate: 30,
            interpolation: false,
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    /// Steps per second; 0 follows the screen refresh rate.
    pub fn set_framerate(&mut self, fps: u32) {
        self.framerate = fps;
        self.restart();
    }

    pub fn set_interpolation(&mut self, interpolation: bool) {
        self.interpolation = interpolation;
        self.restart();
    }

    pub fn framerate(&self) -> u32 {
        self.framerate
    }

    /// Wall-clock duration of one step at the current framerate.
    pub fn step_duration(&self) -> Duration {
        let fps = if self.framerate == 0 {
            SCREEN_REFRESH_RATE
        } else {
            self.framerate
        };
        Duration::from_secs(1) / fps
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn start(&mut self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let running = Arc::clone(&self.running);
        let target = Arc::clone(&self.target);
        let step_interval = self.step_duration();
        let render_interval = Duration::from_secs(1) / SCREEN_REFRESH_RATE;
        let interpolation = self.interpolation;

        self.worker = Some(thread::spawn(move || {
            let mut next_step = Instant::now();
            let mut next_render = Instant::now();
            while running.load(Ordering::SeqCst) {
                let now = Instant::now();
                if now >= next_step {
                    let Ok(mut target) = target.lock() else {
                        break;
                    };
                    target.step();
                    if !interpolation {
                        target.render();
                    }
                    next_step += step_interval;
                    if next_step < now {
                        // Fell behind; do not try to catch up on missed steps.
                        next_step = now + step_interval;
                    }
                }
                if interpolation && now >= next_render {
                    let Ok(mut target) = target.lock() else {
                        break;
                    };
                    target.render_interpolated();
                    next_render += render_interval;
                    if next_render < now {
                        next_render = now + render_interval;
                    }
                }

                let wake = if interpolation {
                    next_step.min(next_render)
                } else {
                    next_step
                };
                let now = Instant::now();
                if wake > now {
                    thread::sleep(wake - now);
                }
            }
        }));
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }

    fn restart(&mut self) {
        if self.is_running() {
            self.stop();
            self.start();
        }
    }
}

impl<T: FrameTarget> Drop for FrameLoop<T> {
    fn drop(&mut self) {
        self.stop();
    }
}

impl<T: FrameTarget> fmt::Debug for FrameLoop<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameLoop")
            .field("framerate", &self.framerate)
            .field("interpolation", &self.interpolation)
            .field("running", &self.is_running())
            .finish()
    }
}

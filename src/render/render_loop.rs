//! Self-rescheduling paint cycle.
//!
//! The loop holds at most one pending frame request. `stop` cancels exactly
//! that request and clears the running flag, so a callback already in flight
//! finds the loop stopped and does not reschedule.

use std::time::Duration;

use super::scene;
use super::scheduler::{FrameRequestId, FrameScheduler};
use super::surface::Surface;
use crate::analysis::{AnalysisFrame, AnalysisHandle};

pub struct RenderLoop {
    running: bool,
    scheduled: Option<FrameRequestId>,
    frame: AnalysisFrame,
    ticks: u64,
}

impl Default for RenderLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderLoop {
    pub fn new() -> Self {
        Self {
            running: false,
            scheduled: None,
            frame: AnalysisFrame::silent(0, 0),
            ticks: 0,
        }
    }

    /// Begins the cycle. Has no effect while already running.
    pub fn start(&mut self, scheduler: &mut FrameScheduler, now: Duration) {
        if self.running {
            return;
        }
        self.running = true;
        self.scheduled = Some(scheduler.request_frame(now));
        tracing::debug!("Render loop started");
    }

    /// Cancels the next tick. Returns whether the loop was running.
    pub fn stop(&mut self, scheduler: &mut FrameScheduler) -> bool {
        if let Some(id) = self.scheduled.take() {
            scheduler.cancel_frame(id);
        }
        let was_running = self.running;
        self.running = false;
        if was_running {
            tracing::debug!("Render loop stopped after {} frames", self.ticks);
        }
        was_running
    }

    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        self.running
    }

    #[cfg(test)]
    pub fn scheduled(&self) -> Option<FrameRequestId> {
        self.scheduled
    }

    /// Handles a fired frame request: paints, publishes and reschedules.
    ///
    /// Returns `false` for requests that do not belong to this loop.
    pub fn on_frame(
        &mut self,
        id: FrameRequestId,
        scheduler: &mut FrameScheduler,
        surface: &mut Surface,
        analysis: Option<&AnalysisHandle>,
        now: Duration,
    ) -> bool {
        if !self.running || self.scheduled != Some(id) {
            return false;
        }
        self.scheduled = None;
        self.paint(surface, analysis, now);
        self.scheduled = Some(scheduler.request_frame(now));
        true
    }

    fn paint(&mut self, surface: &mut Surface, analysis: Option<&AnalysisHandle>, now: Duration) {
        surface.sync_backing_size();
        surface.clear();
        match analysis {
            Some(handle) => self.frame.read_from(handle),
            // Without a tap the scene still animates, non-reactively.
            None => self.frame.clear(),
        }
        let (width, height) = surface.logical_size();
        let dpr = surface.device_pixel_ratio();
        scene::paint(
            surface.pixmap_mut(),
            width,
            height,
            dpr,
            &self.frame,
            now.as_secs_f64() * 1000.0,
        );
        surface.publish();
        self.ticks += 1;
    }

    /// Buffers used by the most recent paint.
    pub fn frame(&self) -> &AnalysisFrame {
        &self.frame
    }

    #[cfg(test)]
    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> (RenderLoop, FrameScheduler, Surface) {
        (
            RenderLoop::new(),
            FrameScheduler::new(60),
            Surface::new(32.0, 18.0, 1.0).unwrap(),
        )
    }

    fn drive(
        render: &mut RenderLoop,
        scheduler: &mut FrameScheduler,
        surface: &mut Surface,
        now: Duration,
    ) -> usize {
        let mut painted = 0;
        for id in scheduler.poll(now) {
            if render.on_frame(id, scheduler, surface, None, now) {
                painted += 1;
            }
        }
        painted
    }

    #[test]
    fn test_loop_reschedules_itself() {
        let (mut render, mut scheduler, mut surface) = fixture();
        render.start(&mut scheduler, Duration::ZERO);
        for frame in 1..=5 {
            let now = Duration::from_millis(17 * frame);
            assert_eq!(drive(&mut render, &mut scheduler, &mut surface, now), 1);
            assert_eq!(scheduler.pending(), 1);
        }
        assert_eq!(render.ticks(), 5);
        assert!(surface.frame_slot().borrow().is_some());
        assert_eq!(surface.reallocations(), 0);
    }

    #[test]
    fn test_start_twice_keeps_one_request() {
        let (mut render, mut scheduler, _surface) = fixture();
        render.start(&mut scheduler, Duration::ZERO);
        render.start(&mut scheduler, Duration::ZERO);
        assert_eq!(scheduler.pending(), 1);
    }

    #[test]
    fn test_stop_cancels_exactly_the_next_tick() {
        let (mut render, mut scheduler, mut surface) = fixture();
        render.start(&mut scheduler, Duration::ZERO);
        drive(&mut render, &mut scheduler, &mut surface, Duration::from_millis(17));
        assert!(render.stop(&mut scheduler));
        assert_eq!(scheduler.pending(), 0);
        assert_eq!(drive(&mut render, &mut scheduler, &mut surface, Duration::from_secs(1)), 0);
        assert_eq!(render.ticks(), 1);
        assert!(!render.stop(&mut scheduler));
    }

    #[test]
    fn test_stale_request_is_ignored() {
        let (mut render, mut scheduler, mut surface) = fixture();
        render.start(&mut scheduler, Duration::ZERO);
        let stale = render.scheduled().unwrap();
        render.stop(&mut scheduler);
        render.start(&mut scheduler, Duration::ZERO);
        assert!(!render.on_frame(stale, &mut scheduler, &mut surface, None, Duration::from_millis(17)));
        assert_eq!(scheduler.pending(), 1);
    }

    #[test]
    fn test_resize_reallocates_once() {
        let (mut render, mut scheduler, mut surface) = fixture();
        render.start(&mut scheduler, Duration::ZERO);
        surface.set_layout_size(64.0, 36.0);
        for frame in 1..=4 {
            drive(&mut render, &mut scheduler, &mut surface, Duration::from_millis(17 * frame));
        }
        assert_eq!(surface.reallocations(), 1);
        assert_eq!(surface.backing_size(), (64, 36));
    }
}

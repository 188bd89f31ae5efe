//! Frame driver of the atlas: advances the viewport on every redraw tick and
//! tracks whether the GPU resources of the instance should exist.
use iced::time::Instant;

use crate::animation::AnimationFinished;
use crate::viewport::ViewportController;

/// What one frame tick produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameOutcome {
    /// Animation that completed during this tick.
    pub finished: Option<AnimationFinished>,
    /// The camera is still moving; another redraw should follow.
    pub keep_running: bool,
}

/// Start/stop state and frame accounting.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderLoop {
    running: bool,
    frames: u64,
    last_frame: Option<Instant>,
    /// Number of stop transitions, used to tag teardown requests.
    teardowns: u64,
}

impl RenderLoop {
    /// Begin ticking. Returns `false` when already running.
    pub fn start(&mut self) -> bool {
        if self.running {
            return false;
        }
        self.running = true;
        self.last_frame = None;
        log::debug!("render loop started");
        true
    }

    /// Stop ticking and request teardown of GPU resources. Returns `false`
    /// when already stopped, so teardown is requested once per stop.
    pub fn stop(&mut self) -> bool {
        if !self.running {
            return false;
        }
        self.running = false;
        self.teardowns += 1;
        log::debug!("render loop stopped after {} frames", self.frames);
        true
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Frames ticked since creation.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn last_frame(&self) -> Option<Instant> {
        self.last_frame
    }

    pub fn teardowns(&self) -> u64 {
        self.teardowns
    }

    /// Advance camera animation and pan damping to `now`.
    ///
    /// Does nothing while stopped.
    pub fn frame(&mut self, now: Instant, viewport: &mut ViewportController) -> FrameOutcome {
        if !self.running {
            return FrameOutcome::default();
        }
        self.frames += 1;
        self.last_frame = Some(now);

        let finished = viewport.update(now);
        FrameOutcome {
            finished,
            keep_running: viewport.is_moving(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use glam::DVec2;

    use super::*;
    use crate::animation::AnimationKind;

    #[test]
    fn start_and_stop_are_idempotent() {
        let mut render_loop = RenderLoop::default();
        assert!(!render_loop.is_running());
        assert!(!render_loop.stop());
        assert_eq!(render_loop.teardowns(), 0);

        assert!(render_loop.start());
        assert!(!render_loop.start());
        assert!(render_loop.stop());
        assert!(!render_loop.stop());
        assert_eq!(render_loop.teardowns(), 1);
    }

    #[test]
    fn stopped_loop_does_not_move_the_camera() {
        let mut render_loop = RenderLoop::default();
        let mut viewport = ViewportController::default();
        let start = Instant::now();
        viewport.animate_to(DVec2::new(10.0, 0.0), 2.0, Duration::from_millis(100), start);

        let outcome = render_loop.frame(start + Duration::from_secs(1), &mut viewport);
        assert_eq!(outcome, FrameOutcome::default());
        assert_eq!(viewport.target(), DVec2::ZERO);
        assert_eq!(render_loop.frames(), 0);
    }

    #[test]
    fn frames_drive_animations_to_completion() {
        let mut render_loop = RenderLoop::default();
        render_loop.start();
        let mut viewport = ViewportController::default();
        let start = Instant::now();
        viewport.reset_to_default(Duration::from_millis(350), start);

        let mid = render_loop.frame(start + Duration::from_millis(100), &mut viewport);
        assert!(mid.keep_running);
        assert!(mid.finished.is_none());

        let end = render_loop.frame(start + Duration::from_millis(400), &mut viewport);
        assert!(!end.keep_running);
        assert_eq!(end.finished.map(|f| f.kind), Some(AnimationKind::Reset));
        assert_eq!(render_loop.frames(), 2);
    }
}

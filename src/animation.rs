//! Time-driven camera transitions.
use std::time::Duration;

use glam::DVec2;
use iced::time::Instant;

/// Cubic ease-out: `1 - (1 - t)^3`, with `t` clamped to `0..=1`.
pub fn ease_out_cubic(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    1.0 - (1.0 - t).powi(3)
}

/// What started an animation. Reported back on completion so the caller can
/// acknowledge the trigger that requested it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimationKind {
    /// Ease toward an entity.
    Focus,
    /// Ease back to the origin at zoom 1.
    Reset,
    /// Ease the zoom by one step.
    StepZoom,
    /// Caller-driven transition.
    Custom,
}

/// Emitted when an animation reaches its end. Superseded animations never
/// complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnimationFinished {
    pub kind: AnimationKind,
    pub generation: u64,
}

/// One eased interpolation of the camera target and zoom.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct CameraAnimation {
    pub kind: AnimationKind,
    pub generation: u64,
    pub started: Instant,
    pub duration: Duration,
    pub from_target: DVec2,
    pub to_target: DVec2,
    pub from_zoom: f64,
    pub to_zoom: f64,
}

/// Camera values produced by one animation tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct AnimationSample {
    pub target: DVec2,
    pub zoom: f64,
    pub done: bool,
}

impl CameraAnimation {
    /// Progress in `0..=1` from wall-clock time, independent of frame rate.
    pub(crate) fn progress(&self, now: Instant) -> f64 {
        if self.duration.is_zero() {
            return 1.0;
        }
        let elapsed = now.saturating_duration_since(self.started);
        (elapsed.as_secs_f64() / self.duration.as_secs_f64()).min(1.0)
    }

    pub(crate) fn sample(&self, now: Instant) -> AnimationSample {
        let t = self.progress(now);
        let ease = ease_out_cubic(t);
        AnimationSample {
            target: self.from_target + (self.to_target - self.from_target) * ease,
            zoom: self.from_zoom + (self.to_zoom - self.from_zoom) * ease,
            done: t >= 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ease_out_cubic_endpoints_and_shape() {
        assert_eq!(ease_out_cubic(0.0), 0.0);
        assert_eq!(ease_out_cubic(1.0), 1.0);
        assert!((ease_out_cubic(0.5) - 0.875).abs() < 1e-12);
        // Clamped outside the unit interval.
        assert_eq!(ease_out_cubic(-3.0), 0.0);
        assert_eq!(ease_out_cubic(7.0), 1.0);
    }

    #[test]
    fn sample_is_time_based() {
        let start = Instant::now();
        let anim = CameraAnimation {
            kind: AnimationKind::Custom,
            generation: 1,
            started: start,
            duration: Duration::from_millis(400),
            from_target: DVec2::ZERO,
            to_target: DVec2::new(10.0, -10.0),
            from_zoom: 1.0,
            to_zoom: 3.0,
        };

        let mid = anim.sample(start + Duration::from_millis(200));
        assert!(!mid.done);
        assert!((mid.target.x - 8.75).abs() < 1e-9);
        assert!((mid.zoom - 2.75).abs() < 1e-9);

        let end = anim.sample(start + Duration::from_secs(5));
        assert!(end.done);
        assert_eq!(end.target, DVec2::new(10.0, -10.0));
        assert_eq!(end.zoom, 3.0);
    }

    #[test]
    fn zero_duration_completes_immediately() {
        let start = Instant::now();
        let anim = CameraAnimation {
            kind: AnimationKind::Reset,
            generation: 3,
            started: start,
            duration: Duration::ZERO,
            from_target: DVec2::ONE,
            to_target: DVec2::ZERO,
            from_zoom: 2.0,
            to_zoom: 1.0,
        };
        let sample = anim.sample(start);
        assert!(sample.done);
        assert_eq!(sample.zoom, 1.0);
    }
}

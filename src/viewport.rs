//! Pan/zoom controller driving the orthographic [`Camera`].
use std::time::Duration;

use glam::DVec2;
use iced::time::Instant;

use crate::animation::{AnimationFinished, AnimationKind, CameraAnimation};
use crate::camera::Camera;
use crate::config::AtlasConfig;

/// Frame period the damping factor is expressed against.
const DAMPING_REFERENCE_HZ: f64 = 60.0;
/// Pending pan below this length (world units) is dropped.
const PAN_EPSILON: f64 = 1e-9;

/// Zoom direction for step zooming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoomDirection {
    In,
    Out,
}

/// Owns the camera and every way it can move: immediate pan/zoom from input,
/// damped drag panning, and eased transitions.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewportController {
    camera: Camera,
    /// Logical size of the viewport, last valid (non-zero) value.
    size: DVec2,
    min_zoom: f64,
    max_zoom: f64,
    step_factor: f64,
    damping: f64,
    /// Drag pan not yet applied to the target.
    pending_pan: DVec2,
    animation: Option<CameraAnimation>,
    /// Incremented by every animation request; stale animations compare unequal.
    generation: u64,
    last_update: Option<Instant>,
}

impl Default for ViewportController {
    fn default() -> Self {
        Self::new(&AtlasConfig::default())
    }
}

impl ViewportController {
    pub fn new(config: &AtlasConfig) -> Self {
        Self {
            camera: Camera::new(config.frustum_half_extent, 1000, 600),
            size: DVec2::new(1000.0, 600.0),
            min_zoom: config.min_zoom,
            max_zoom: config.max_zoom_or_inf(),
            step_factor: config.step_zoom_factor,
            damping: config.pan_damping.clamp(0.0, 1.0),
            pending_pan: DVec2::ZERO,
            animation: None,
            generation: 0,
            last_update: None,
        }
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn zoom(&self) -> f64 {
        self.camera.zoom
    }

    pub fn target(&self) -> DVec2 {
        self.camera.target
    }

    /// Logical viewport size.
    pub fn size(&self) -> DVec2 {
        self.size
    }

    pub fn zoom_bounds(&self) -> (f64, f64) {
        (self.min_zoom, self.max_zoom)
    }

    /// Generation of the most recent animation request.
    pub fn animation_generation(&self) -> u64 {
        self.generation
    }

    pub fn is_animating(&self) -> bool {
        self.animation.is_some()
    }

    /// True while an animation or damped pan still moves the camera.
    pub fn is_moving(&self) -> bool {
        self.animation.is_some() || self.pending_pan.length() > PAN_EPSILON
    }

    /// Adopt the target and zoom of a previously published camera, e.g. when a
    /// widget instance is shown again with fresh state.
    pub fn restore(&mut self, camera: &Camera) {
        self.camera.target = camera.target;
        self.camera.zoom = self.clamp_zoom(camera.zoom);
        self.pending_pan = DVec2::ZERO;
        self.animation = None;
    }

    fn clamp_zoom(&self, zoom: f64) -> f64 {
        zoom.clamp(self.min_zoom, self.max_zoom)
    }

    /// Recompute the frustum for a new viewport size, preserving zoom and target.
    ///
    /// Zero-sized viewports (e.g. a hidden container) are ignored and the last
    /// valid frustum is kept. Returns whether the camera changed.
    pub fn resize(&mut self, width: f32, height: f32) -> bool {
        if !(width > 0.0 && height > 0.0) {
            return false;
        }
        let size = DVec2::new(width as f64, height as f64);
        if size == self.size {
            return false;
        }
        self.size = size;
        self.camera.aspect = size.x / size.y;
        true
    }

    /// Shift the pan target by a data-space delta.
    pub fn pan_by(&mut self, dx: f64, dy: f64) {
        self.camera.target += DVec2::new(dx, dy);
    }

    /// Queue a drag pan expressed in logical screen pixels. Dragging right moves
    /// the content right. The pan is applied by [`Self::update`] with damping.
    pub fn drag_by(&mut self, screen_delta: DVec2) {
        let world_per_px = self.camera.world_per_pixel(self.size.y);
        // Screen y grows downward, world y grows upward.
        self.pending_pan += DVec2::new(-screen_delta.x, screen_delta.y) * world_per_px;
        if self.damping <= 0.0 {
            self.camera.target += self.pending_pan;
            self.pending_pan = DVec2::ZERO;
        }
    }

    /// Zoom by `factor` keeping the world point under `screen_point` fixed.
    pub fn zoom_at(&mut self, screen_point: DVec2, factor: f64) {
        let ndc = Camera::screen_to_ndc(screen_point, self.size);
        let world_before = self.camera.ndc_to_world(ndc);

        self.camera.zoom = self.clamp_zoom(self.camera.zoom * factor);

        let world_after = self.camera.ndc_to_world(ndc);
        self.camera.target += world_before - world_after;
    }

    /// Start an eased transition of target and zoom. Supersedes any in-flight
    /// animation. Returns the generation of the new animation.
    pub fn animate_to(
        &mut self,
        target: DVec2,
        zoom: f64,
        duration: Duration,
        now: Instant,
    ) -> u64 {
        self.start_animation(AnimationKind::Custom, target, zoom, duration, now)
    }

    /// Ease toward a world point at the given zoom.
    pub fn focus_on(&mut self, point: DVec2, zoom: f64, duration: Duration, now: Instant) -> u64 {
        self.start_animation(AnimationKind::Focus, point, zoom, duration, now)
    }

    /// Ease back to the origin at zoom 1.
    pub fn reset_to_default(&mut self, duration: Duration, now: Instant) -> u64 {
        self.start_animation(AnimationKind::Reset, DVec2::ZERO, 1.0, duration, now)
    }

    /// Ease the zoom by one multiplicative step, keeping the target.
    pub fn step_zoom(&mut self, direction: ZoomDirection, duration: Duration, now: Instant) -> u64 {
        let factor = match direction {
            ZoomDirection::In => self.step_factor,
            ZoomDirection::Out => 1.0 / self.step_factor,
        };
        let target = self.camera.target;
        let zoom = self.camera.zoom * factor;
        self.start_animation(AnimationKind::StepZoom, target, zoom, duration, now)
    }

    fn start_animation(
        &mut self,
        kind: AnimationKind,
        target: DVec2,
        zoom: f64,
        duration: Duration,
        now: Instant,
    ) -> u64 {
        self.generation = self.generation.wrapping_add(1);
        // A pending drag would fight the transition.
        self.pending_pan = DVec2::ZERO;
        self.animation = Some(CameraAnimation {
            kind,
            generation: self.generation,
            started: now,
            duration,
            from_target: self.camera.target,
            to_target: target,
            from_zoom: self.camera.zoom,
            to_zoom: self.clamp_zoom(zoom),
        });
        self.generation
    }

    /// Drop the in-flight animation without completing it.
    pub fn cancel_animation(&mut self) {
        self.animation = None;
    }

    /// Advance the in-flight animation and the pan damping to `now`.
    ///
    /// Returns the completed animation, if one finished on this tick.
    pub fn update(&mut self, now: Instant) -> Option<AnimationFinished> {
        let dt = self
            .last_update
            .map(|last| now.saturating_duration_since(last).as_secs_f64())
            .unwrap_or(1.0 / DAMPING_REFERENCE_HZ);
        self.last_update = Some(now);

        self.update_damping(dt);
        self.advance_animation(now)
    }

    fn update_damping(&mut self, dt: f64) {
        if self.pending_pan.length() <= PAN_EPSILON {
            self.pending_pan = DVec2::ZERO;
            return;
        }
        // Fraction of the pending pan applied over `dt`, equal to `damping`
        // for one 60 Hz frame.
        let frames = dt * DAMPING_REFERENCE_HZ;
        let applied = 1.0 - (1.0 - self.damping).powf(frames);
        let step = self.pending_pan * applied;
        self.camera.target += step;
        self.pending_pan -= step;
    }

    fn advance_animation(&mut self, now: Instant) -> Option<AnimationFinished> {
        let animation = self.animation?;
        if animation.generation != self.generation {
            // Superseded; a newer request owns the camera.
            self.animation = None;
            return None;
        }

        let sample = animation.sample(now);
        self.camera.target = sample.target;
        self.camera.zoom = sample.zoom;

        if !sample.done {
            return None;
        }
        self.animation = None;
        log::trace!(
            "camera animation {:?} #{} finished",
            animation.kind,
            animation.generation
        );
        Some(AnimationFinished {
            kind: animation.kind,
            generation: animation.generation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64) {
        let diff = (actual - expected).abs();
        assert!(diff < 1e-6, "expected {expected}, got {actual} (diff: {diff})");
    }

    fn controller() -> ViewportController {
        let mut viewport = ViewportController::default();
        viewport.resize(800.0, 600.0);
        viewport
    }

    #[test]
    fn zoom_at_keeps_cursor_world_point_fixed() {
        let mut viewport = controller();
        viewport.pan_by(15.0, -4.0);
        let cursor = DVec2::new(620.0, 110.0);
        let size = viewport.size();
        let before = viewport.camera().screen_to_world(cursor, size);

        viewport.zoom_at(cursor, 1.15);
        viewport.zoom_at(cursor, 1.15);
        viewport.zoom_at(cursor, 1.0 / 1.15);

        let after = viewport.camera().screen_to_world(cursor, size);
        assert_close(after.x, before.x);
        assert_close(after.y, before.y);
        assert_close(viewport.zoom(), 1.15);
    }

    #[test]
    fn zoom_is_clamped_to_minimum() {
        let mut viewport = controller();
        for _ in 0..50 {
            viewport.zoom_at(DVec2::new(400.0, 300.0), 0.5);
        }
        assert_close(viewport.zoom(), 0.5);
    }

    #[test]
    fn zoom_is_clamped_to_configured_maximum() {
        let config = AtlasConfig {
            max_zoom: Some(10.0),
            ..AtlasConfig::default()
        };
        let mut viewport = ViewportController::new(&config);
        viewport.zoom_at(DVec2::new(10.0, 10.0), 1000.0);
        assert_close(viewport.zoom(), 10.0);
    }

    #[test]
    fn resize_preserves_zoom_and_target_and_ignores_zero() {
        let mut viewport = controller();
        viewport.pan_by(3.0, 4.0);
        viewport.zoom_at(DVec2::new(400.0, 300.0), 2.0);
        let zoom = viewport.zoom();
        let target = viewport.target();

        assert!(viewport.resize(1200.0, 300.0));
        assert_close(viewport.zoom(), zoom);
        assert_eq!(viewport.target(), target);
        assert_close(viewport.camera().aspect, 4.0);

        assert!(!viewport.resize(0.0, 300.0));
        assert!(!viewport.resize(500.0, 0.0));
        assert_close(viewport.camera().aspect, 4.0);
        assert_eq!(viewport.size(), DVec2::new(1200.0, 300.0));
    }

    #[test]
    fn animate_to_reaches_target_after_duration() {
        let mut viewport = controller();
        let start = Instant::now();
        let generation =
            viewport.animate_to(DVec2::new(20.0, 5.0), 4.0, Duration::from_millis(300), start);

        assert!(viewport.update(start + Duration::from_millis(100)).is_none());
        assert!(viewport.is_animating());
        assert!(viewport.target().x > 0.0 && viewport.target().x < 20.0);

        let finished = viewport.update(start + Duration::from_millis(300)).unwrap();
        assert_eq!(finished.generation, generation);
        assert_eq!(finished.kind, AnimationKind::Custom);
        assert_eq!(viewport.target(), DVec2::new(20.0, 5.0));
        assert_close(viewport.zoom(), 4.0);
        assert!(!viewport.is_animating());
    }

    #[test]
    fn animation_is_frame_rate_independent() {
        let start = Instant::now();
        let end = start + Duration::from_millis(150);

        let mut coarse = controller();
        coarse.animate_to(DVec2::new(50.0, 0.0), 2.0, Duration::from_millis(400), start);
        coarse.update(end);

        let mut fine = controller();
        fine.animate_to(DVec2::new(50.0, 0.0), 2.0, Duration::from_millis(400), start);
        for ms in 1..=150 {
            fine.update(start + Duration::from_millis(ms));
        }

        assert_close(coarse.target().x, fine.target().x);
        assert_close(coarse.zoom(), fine.zoom());
    }

    #[test]
    fn new_animation_supersedes_in_flight_one() {
        let mut viewport = controller();
        let start = Instant::now();
        let first = viewport.focus_on(DVec2::new(100.0, 0.0), 8.0, Duration::from_millis(400), start);
        viewport.update(start + Duration::from_millis(100));

        let second = viewport.reset_to_default(
            Duration::from_millis(350),
            start + Duration::from_millis(100),
        );
        assert!(second > first);

        let finished = viewport.update(start + Duration::from_secs(2)).unwrap();
        assert_eq!(finished.kind, AnimationKind::Reset);
        assert_eq!(finished.generation, second);
        assert_eq!(viewport.target(), DVec2::ZERO);
        assert_close(viewport.zoom(), 1.0);
        // The superseded focus never reports completion.
        assert!(viewport.update(start + Duration::from_secs(3)).is_none());
    }

    #[test]
    fn step_zoom_multiplies_and_clamps() {
        let mut viewport = controller();
        let start = Instant::now();
        viewport.step_zoom(ZoomDirection::In, Duration::from_millis(200), start);
        let finished = viewport.update(start + Duration::from_millis(200)).unwrap();
        assert_eq!(finished.kind, AnimationKind::StepZoom);
        assert_close(viewport.zoom(), 1.5);

        let later = start + Duration::from_secs(1);
        viewport.step_zoom(ZoomDirection::Out, Duration::from_millis(200), later);
        viewport.update(later + Duration::from_millis(200));
        viewport.step_zoom(ZoomDirection::Out, Duration::from_millis(200), later);
        viewport.update(later + Duration::from_millis(400));
        viewport.step_zoom(ZoomDirection::Out, Duration::from_millis(200), later);
        viewport.update(later + Duration::from_millis(600));
        assert_close(viewport.zoom(), 0.5);
    }

    #[test]
    fn drag_pan_converges_with_damping() {
        let mut viewport = controller();
        let size = viewport.size();
        let anchor = DVec2::new(200.0, 200.0);
        let world_before = viewport.camera().screen_to_world(anchor, size);

        viewport.drag_by(DVec2::new(40.0, -25.0));
        let start = Instant::now();
        viewport.update(start);
        assert!(viewport.is_moving());
        for frame in 1..=600 {
            viewport.update(start + Duration::from_micros(frame * 16_667));
        }
        assert!(!viewport.is_moving());

        // The world point that was under `anchor` is now 40 px right, 25 px up.
        let moved = viewport.camera().world_to_screen(world_before, size);
        assert_close(moved.x, anchor.x + 40.0);
        assert_close(moved.y, anchor.y - 25.0);
    }
}

use glam::{DMat4, DVec2, DVec3, Mat4};

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub(crate) struct CameraUniform {
    pub view_proj: [[f32; 4]; 4],
    // (2/width, 2/height, scale_factor, reserved) - for screen-space point sizing
    pub pixel_to_clip: [f32; 4],
    // Camera target as (high.xy, low.xy), subtracted from positions before view_proj
    pub target: [f32; 4],
}

impl CameraUniform {
    pub(crate) fn update(
        &mut self,
        camera: &Camera,
        viewport_width: u32,
        viewport_height: u32,
        scale_factor: f32,
    ) {
        self.view_proj = camera.build_view_projection_matrix().to_cols_array_2d();
        self.target = camera.split_target();

        // Point sizes are given in logical pixels, the viewport is in device pixels.
        let pixel_to_clip_x = 2.0 / viewport_width.max(1) as f32;
        let pixel_to_clip_y = 2.0 / viewport_height.max(1) as f32;
        self.pixel_to_clip = [pixel_to_clip_x, pixel_to_clip_y, scale_factor, 0.0];
    }
}

impl Default for CameraUniform {
    fn default() -> Self {
        Self {
            view_proj: Mat4::IDENTITY.to_cols_array_2d(),
            pixel_to_clip: [0.0; 4],
            target: [0.0; 4],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
/// Orthographic camera looking down at the atlas plane.
///
/// The frustum is derived from a fixed vertical half extent and the viewport
/// aspect ratio, then divided by the zoom factor:
/// `half_height = frustum_half_extent / zoom`, `half_width = half_height * aspect`.
pub struct Camera {
    /// Pan target, the world point at the center of the viewport.
    pub target: DVec2,
    /// Zoom factor, 1.0 shows the full frustum.
    pub zoom: f64,
    /// Vertical half extent at zoom 1, in world units.
    pub frustum_half_extent: f64,
    /// Viewport width / height.
    pub aspect: f64,
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(120.0, 1000, 600)
    }
}

impl Camera {
    pub(crate) const NEAR: f64 = 0.1;
    pub(crate) const FAR: f64 = 1000.0;
    /// Height of the camera above the plane, between `NEAR` and `FAR`.
    const EYE_Z: f64 = 100.0;

    pub fn new(frustum_half_extent: f64, width: u32, height: u32) -> Self {
        Self {
            target: DVec2::ZERO,
            zoom: 1.0,
            frustum_half_extent,
            aspect: width.max(1) as f64 / height.max(1) as f64,
        }
    }

    /// Visible half extents in world units at the current zoom.
    pub fn half_extents(&self) -> DVec2 {
        let half_height = self.frustum_half_extent / self.zoom;
        DVec2::new(half_height * self.aspect, half_height)
    }

    /// Projection of positions relative to the target.
    ///
    /// The translation to the target is left out: the shaders subtract
    /// [`Self::split_target`] from each position first, so the pan offset never
    /// meets the zoom scale in f32.
    pub(crate) fn build_view_projection_matrix(&self) -> Mat4 {
        let half = self.half_extents();
        let proj = DMat4::orthographic_rh(-half.x, half.x, -half.y, half.y, Self::NEAR, Self::FAR);
        let view = DMat4::from_translation(DVec3::new(0.0, 0.0, -Self::EYE_Z));
        Mat4::from_cols_array(&(proj * view).to_cols_array().map(|v| v as f32))
    }

    /// Target as `[high.x, high.y, low.x, low.y]`, where `high` is the target
    /// rounded to f32 and `low` the remainder.
    pub(crate) fn split_target(&self) -> [f32; 4] {
        let high = self.target.as_vec2();
        let low = (self.target - high.as_dvec2()).as_vec2();
        [high.x, high.y, low.x, low.y]
    }

    /// Position relative to the target the way the shaders compute it.
    #[cfg(test)]
    fn relative_f32(&self, world: glam::Vec2) -> glam::Vec2 {
        let [hx, hy, lx, ly] = self.split_target();
        (world - glam::Vec2::new(hx, hy)) - glam::Vec2::new(lx, ly)
    }

    /// Convert a screen position to normalized device coordinates.
    pub fn screen_to_ndc(screen_pos: DVec2, screen_size: DVec2) -> DVec2 {
        let size = screen_size.max(DVec2::ONE);
        DVec2::new(
            (screen_pos.x / size.x) * 2.0 - 1.0,
            -((screen_pos.y / size.y) * 2.0 - 1.0), // Flip Y
        )
    }

    /// Unproject normalized device coordinates onto the world plane.
    pub fn ndc_to_world(&self, ndc: DVec2) -> DVec2 {
        self.target + ndc * self.half_extents()
    }

    /// Convert screen coordinates (logical pixels, origin top-left) to world coordinates.
    pub fn screen_to_world(&self, screen_pos: DVec2, screen_size: DVec2) -> DVec2 {
        self.ndc_to_world(Self::screen_to_ndc(screen_pos, screen_size))
    }

    /// Convert world coordinates to screen coordinates (logical pixels, origin top-left).
    pub fn world_to_screen(&self, world: DVec2, screen_size: DVec2) -> DVec2 {
        let ndc = (world - self.target) / self.half_extents();
        DVec2::new(
            (ndc.x + 1.0) * 0.5 * screen_size.x,
            (1.0 - ndc.y) * 0.5 * screen_size.y,
        )
    }

    /// World units covered by one logical pixel vertically.
    pub fn world_per_pixel(&self, screen_height: f64) -> f64 {
        2.0 * self.half_extents().y / screen_height.max(1.0)
    }
}

//! Controls for user interaction with the atlas.

/// Configures user interaction behavior for [`crate::CdeAtlas`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtlasControls {
    /// Enables panning by dragging with the left or right mouse button.
    pub drag_to_pan: bool,

    /// Enables cursor-centered zoom with the mouse wheel.
    pub wheel_zoom: bool,

    /// Publishes the entity under the cursor as the hover target.
    pub hover: bool,

    /// Enables selecting an entity by clicking it.
    pub click_to_select: bool,

    /// Enables clearing the selection with the Escape key.
    pub clear_on_escape: bool,
}

// Everything is enabled by default.

impl Default for AtlasControls {
    fn default() -> Self {
        Self {
            drag_to_pan: true,
            wheel_zoom: true,
            hover: true,
            click_to_select: true,
            clear_on_escape: true,
        }
    }
}

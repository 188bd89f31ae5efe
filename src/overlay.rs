//! Ephemeral overlay primitives drawn on top of the point field.
use glam::DVec2;

use crate::entity::{Entity, EntityId};

/// Ring marker around the highlighted entity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HighlightRing {
    pub entity: EntityId,
    /// Ring center in world space.
    pub center: DVec2,
    pub inner_radius: f32,
    pub outer_radius: f32,
    /// Linear RGBA.
    pub color: [f32; 4],
}

/// Text label anchored to a pinned entity.
///
/// The label is left-anchored at the point and vertically centered on it.
#[derive(Debug, Clone, PartialEq)]
pub struct PinLabel {
    pub entity: EntityId,
    /// Anchor in world space.
    pub anchor: DVec2,
    pub text: String,
}

impl PinLabel {
    pub(crate) fn new(entity: &Entity, max_chars: usize) -> Self {
        Self {
            entity: entity.id,
            anchor: entity.world_position().into(),
            text: truncate_label(&entity.name, max_chars),
        }
    }
}

/// Truncate `name` to `max_chars` characters, appending `...` when cut.
pub fn truncate_label(name: &str, max_chars: usize) -> String {
    match name.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", &name[..byte_idx]),
        None => name.to_string(),
    }
}

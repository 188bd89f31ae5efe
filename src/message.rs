use iced::{Point, Rectangle};

use crate::{Camera, EntityId};

#[derive(Debug, Clone)]
/// Messages sent by the atlas widget to the application.
///
/// Route them back into [`crate::CdeAtlas::update`].
pub enum AtlasMessage {
    /// Internal render update message.
    RenderUpdate(AtlasRenderUpdate),
}

impl AtlasMessage {
    /// Entity clicked in this update, if any.
    pub fn selected(&self) -> Option<EntityId> {
        match self {
            AtlasMessage::RenderUpdate(update) => update.select,
        }
    }

    /// Hover change carried by this update, if any.
    pub fn hover(&self) -> Option<HoverEvent> {
        match self {
            AtlasMessage::RenderUpdate(update) => update.hover,
        }
    }

    /// Widget-local pointer position over the hovered entity, if it moved.
    pub fn hover_position(&self) -> Option<Point> {
        match self {
            AtlasMessage::RenderUpdate(update) => update.hover_position,
        }
    }
}

/// Change of the entity under the pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoverEvent {
    Hover(EntityId),
    ClearHover,
}

#[derive(Debug, Clone, Default)]
#[doc(hidden)]
pub struct AtlasRenderUpdate {
    pub hover: Option<HoverEvent>,
    pub hover_position: Option<Point>,
    pub select: Option<EntityId>,
    pub clear_selection: bool,
    /// Finished focus request id.
    pub focus_finished: Option<u64>,
    /// Finished zoom step request id.
    pub zoom_step_finished: Option<u64>,
    pub camera_bounds: Option<(Camera, Rectangle)>,
}

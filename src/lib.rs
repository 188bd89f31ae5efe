//! A GPU-accelerated point atlas of Common Data Elements for Iced.
//!
//! - Renders tens of thousands of entities as instanced point sprites
//! - Filters, pins and hover highlights update GPU state in place, without
//!   rebuilding point buffers
//! - Cursor-centered zoom, damped drag panning and eased camera transitions
//! - Hit testing that skips filtered-out points, click/drag disambiguation
//! - Pin labels, hover ring, text search and TSV loading
//!
//! Quick start:
//!
//! ```no_run
//! use cde_atlas::{CdeAtlas, Entity};
//!
//! let atlas = CdeAtlas::new().with_entities(vec![
//!     Entity::new(1, "Systolic blood pressure", "NHLBI", 2018, 1.0, 2.0),
//!     Entity::new(2, "Seizure frequency", "NINDS", 2020, -5.0, 0.5),
//! ]);
//! ```
//!
//! Route [`AtlasMessage`]s produced by [`CdeAtlas::view`] back into
//! [`CdeAtlas::update`]. See `demos/` for a complete application.
pub mod config;
pub mod controls;
pub mod dataset;
pub mod entity;
pub mod interaction;
pub mod message;
pub mod overlay;
pub mod palette;
pub mod point_field;
pub mod search;
pub mod viewport;

pub(crate) mod animation;
pub(crate) mod atlas;
pub(crate) mod atlas_state;
pub(crate) mod camera;
pub(crate) mod picking;
pub(crate) mod render_loop;
pub(crate) mod renderer;

// Iced re-exports.
pub use iced::Color;

// Re-exports of public types.
pub use animation::{AnimationFinished, AnimationKind, ease_out_cubic};
pub use atlas::CdeAtlas;
pub use camera::Camera;
pub use config::{AtlasConfig, ConfigError};
pub use controls::AtlasControls;
pub use dataset::{DatasetError, ParsedDataset, load_tsv, parse_tsv};
pub use entity::{Entity, EntityId};
pub use interaction::{FocusRequest, InteractionState, InteractionVersions, ZoomStepRequest};
pub use message::{AtlasMessage, HoverEvent};
pub use overlay::{HighlightRing, PinLabel};
pub use palette::Palette;
pub use picking::{PickHit, Picker, Release};
pub use point_field::{FieldVersions, PointField, PointStateTexture, PointStyle};
pub use render_loop::{FrameOutcome, RenderLoop};
pub use search::{SearchIndex, SearchOptions, SearchResults, SearchSuggestion};
pub use viewport::{ViewportController, ZoomDirection};

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use glam::DVec2;
use iced::{
    Element, Length, Rectangle, Theme,
    alignment::{Horizontal, Vertical},
    mouse::{self, Interaction},
    padding::Padding,
    time::Instant,
    wgpu::TextureFormat,
    widget::{
        self, container,
        shader::{self, Pipeline, Viewport},
        stack,
    },
};

use crate::{
    AtlasMessage, Entity, EntityId, HoverEvent,
    atlas_state::{AtlasState, UpdateEffects},
    camera::Camera,
    config::{AtlasConfig, ConfigError},
    controls::AtlasControls,
    interaction::{InteractionState, InteractionVersions},
    message::AtlasRenderUpdate,
    overlay::PinLabel,
    point_field::PointField,
    renderer::{AtlasRenderer, FrameSnapshot, RenderParams},
    search::{SearchIndex, SearchResults},
    viewport::ZoomDirection,
};

/// Padding inside pin labels and the hover tooltip.
const LABEL_PADDING: f32 = 3.0;

/// Versions of the interaction state and point field last pushed into the
/// point field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct AppliedVersions {
    interaction: InteractionVersions,
    field_generation: u64,
}

/// A WebGPU scatter atlas of Common Data Elements with pan/zoom, hover,
/// selection and pin labels.
pub struct CdeAtlas {
    pub(crate) instance_id: u64,
    pub(crate) config: AtlasConfig,
    pub(crate) controls: AtlasControls,
    pub(crate) field: PointField,
    pub(crate) interaction: InteractionState,
    pub(crate) search: SearchIndex,
    applied: AppliedVersions,
    pub(crate) running: bool,
    pub(crate) label_size: f32,
    // Camera and bounds last published by the widget, for label placement.
    pub(crate) camera_bounds: Option<(Camera, Rectangle)>,
}

impl Default for CdeAtlas {
    fn default() -> Self {
        Self::new()
    }
}

impl CdeAtlas {
    /// Create an empty atlas with the default configuration.
    pub fn new() -> Self {
        Self::from_valid_config(AtlasConfig::default())
    }

    /// Create an empty atlas with `config`, rejecting invalid constants.
    pub fn with_config(config: AtlasConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::from_valid_config(config))
    }

    fn from_valid_config(config: AtlasConfig) -> Self {
        Self {
            instance_id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            controls: AtlasControls::default(),
            field: PointField::new(&config),
            interaction: InteractionState::new(&config),
            search: SearchIndex::default(),
            applied: AppliedVersions::default(),
            running: true,
            label_size: 12.0,
            camera_bounds: None,
            config,
        }
    }

    /// Builder form of [`Self::set_entities`].
    pub fn with_entities(mut self, entities: impl Into<Arc<[Entity]>>) -> Self {
        self.set_entities(entities);
        self
    }

    /// Replace the displayed entities.
    ///
    /// An empty sequence leaves the atlas untouched. Selection, pins, hover and
    /// search are dropped; year range and hidden organizations are kept.
    pub fn set_entities(&mut self, entities: impl Into<Arc<[Entity]>>) {
        let entities = entities.into();
        if entities.is_empty() {
            log::debug!("ignoring empty entity sequence");
            return;
        }
        self.interaction.load(entities);
        self.sync();
    }

    pub fn set_controls(&mut self, controls: AtlasControls) {
        self.controls = controls;
    }

    pub fn controls(&self) -> AtlasControls {
        self.controls
    }

    /// Font size of pin labels.
    pub fn set_label_size(&mut self, size: f32) {
        self.label_size = size;
    }

    pub fn config(&self) -> &AtlasConfig {
        &self.config
    }

    pub fn interaction(&self) -> &InteractionState {
        &self.interaction
    }

    /// Mutate the interaction state, then bring the point field in line with
    /// it.
    pub fn with_interaction<R>(&mut self, f: impl FnOnce(&mut InteractionState) -> R) -> R {
        let out = f(&mut self.interaction);
        self.sync();
        out
    }

    pub fn field(&self) -> &PointField {
        &self.field
    }

    pub fn search_index(&self) -> &SearchIndex {
        &self.search
    }

    /// Run a search and apply it as a filter. Queries too short to search
    /// clear the active search and return `None`.
    pub fn search(&mut self, query: &str) -> Option<SearchResults> {
        let results = self.search.search(query);
        match &results {
            Some(results) => self.interaction.set_search_results(
                results.query.clone(),
                results.ids.clone(),
            ),
            None => self.interaction.clear_search(),
        }
        self.sync();
        results
    }

    pub fn clear_search(&mut self) {
        self.with_interaction(InteractionState::clear_search);
    }

    /// Select an entity: it is pinned and the camera eases onto it.
    pub fn select(&mut self, id: EntityId) -> bool {
        self.with_interaction(|interaction| interaction.select(id))
    }

    pub fn deselect(&mut self, id: EntityId) -> bool {
        self.with_interaction(|interaction| interaction.deselect(id))
    }

    pub fn clear_selection(&mut self) {
        self.with_interaction(InteractionState::clear_selection);
    }

    /// Ease the camera back to the initial view.
    pub fn reset_view(&mut self) {
        self.with_interaction(InteractionState::request_reset);
    }

    /// Ease the zoom by one step.
    pub fn zoom_step(&mut self, direction: ZoomDirection) -> u64 {
        self.with_interaction(|interaction| interaction.request_zoom_step(direction))
    }

    /// Resume rendering after [`Self::stop`].
    pub fn start(&mut self) {
        self.running = true;
    }

    /// Stop rendering and release the GPU resources of this atlas.
    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Camera last reported by the widget.
    pub fn camera(&self) -> Option<&Camera> {
        self.camera_bounds.as_ref().map(|(camera, _)| camera)
    }

    /// Handle a message sent by the atlas widget.
    pub fn update(&mut self, msg: AtlasMessage) {
        match msg {
            AtlasMessage::RenderUpdate(payload) => {
                if let Some(camera_bounds) = payload.camera_bounds
                    && self.camera_bounds != Some(camera_bounds)
                {
                    self.camera_bounds = Some(camera_bounds);
                }

                match payload.hover {
                    Some(HoverEvent::Hover(id)) => self.interaction.set_hovered(Some(id)),
                    Some(HoverEvent::ClearHover) => self.interaction.set_hovered(None),
                    None => false,
                };
                if let Some(position) = payload.hover_position {
                    self.interaction.set_hover_position(position);
                }
                if payload.clear_selection {
                    self.interaction.clear_selection();
                }
                if let Some(id) = payload.select {
                    self.interaction.select(id);
                }
                if let Some(id) = payload.focus_finished {
                    self.interaction.acknowledge_focus(id);
                }
                if let Some(id) = payload.zoom_step_finished {
                    self.interaction.acknowledge_zoom_step(id);
                }
                self.sync();
            }
        }
    }

    /// Push interaction changes into the point field, recomputing only what
    /// changed since the last sync.
    fn sync(&mut self) {
        let versions = self.interaction.versions();
        let applied = self.applied.interaction;

        if versions.data != applied.data {
            let entities = Arc::clone(self.interaction.entities());
            self.search = SearchIndex::from_entities(entities.iter());
            self.field.build(entities);
        }

        let regenerated = self.field.generation() != self.applied.field_generation;
        if regenerated || versions.filter != applied.filter {
            self.field.apply_filter(
                self.interaction.filtered_ids(),
                self.interaction.has_active_search(),
            );
        }
        if regenerated || versions.pins != applied.pins {
            let pinned = self.interaction.pinned();
            self.field.sync_pinned(pinned);
            self.field.sync_pins(pinned);
        }
        if regenerated || versions.highlight != applied.highlight {
            self.field.set_highlight(self.interaction.highlight_target());
        }

        self.applied = AppliedVersions {
            interaction: versions,
            field_generation: self.field.generation(),
        };
    }

    /// View the atlas widget.
    pub fn view<'a>(&'a self) -> Element<'a, AtlasMessage> {
        let atlas = widget::shader(self)
            .width(Length::Fill)
            .height(Length::Fill);

        let inner_container = container(atlas)
            .style(|theme: &Theme| container::background(theme.palette().background));

        stack![
            inner_container,
            stack(
                self.field
                    .pin_labels()
                    .filter_map(|label| self.view_pin_label(label))
                    .chain(self.view_hover_tooltip())
            ),
        ]
        .width(Length::Fill)
        .height(Length::Fill)
        .into()
    }

    fn view_pin_label(&self, label: &PinLabel) -> Option<Element<'_, AtlasMessage>> {
        // Gap between the point and the label's left edge.
        const OFFSET: f32 = 8.0;

        let (camera, bounds) = self.camera_bounds.as_ref()?;
        let size = DVec2::new(bounds.width as f64, bounds.height as f64);
        let screen = camera.world_to_screen(label.anchor, size);
        let (x, y) = (screen.x as f32, screen.y as f32);
        if !(0.0..=bounds.width).contains(&x) || !(0.0..=bounds.height).contains(&y) {
            return None;
        }

        // Vertically centered on the point.
        let half_height = self.label_size * 0.65 + LABEL_PADDING;
        let top = (y - half_height).max(0.0);
        Some(self.view_bubble(label.text.clone(), x + OFFSET, top))
    }

    /// Name, organization and year of the hovered entity next to the pointer.
    fn view_hover_tooltip(&self) -> Option<Element<'_, AtlasMessage>> {
        const OFFSET: f32 = 14.0;

        let entity = self.interaction.entity(self.interaction.hovered()?)?;
        let position = self.interaction.hover_position()?;
        let text = format!(
            "{} ({}, {})",
            entity.name, entity.organization, entity.year
        );
        Some(self.view_bubble(text, position.x + OFFSET, position.y + OFFSET))
    }

    fn view_bubble(&self, text: String, left: f32, top: f32) -> Element<'_, AtlasMessage> {
        use container::Style;
        const LABEL_ALPHA: f32 = 0.85;
        fn label_style(theme: &Theme) -> container::Style {
            let palette = theme.extended_palette();

            Style {
                background: Some(palette.background.weak.color.scale_alpha(LABEL_ALPHA).into()),
                text_color: Some(palette.background.weak.text),
                border: iced::border::rounded(2),
                ..Style::default()
            }
        }

        let bubble = container(
            widget::text(text)
                .size(self.label_size)
                .wrapping(widget::text::Wrapping::None),
        )
        .padding(LABEL_PADDING)
        .style(label_style);

        container(bubble)
            .width(Length::Fill)
            .height(Length::Fill)
            .padding(Padding {
                top,
                right: 0.0,
                bottom: 0.0,
                left,
            })
            .align_x(Horizontal::Left)
            .align_y(Vertical::Top)
            .style(container::transparent)
            .into()
    }
}

#[doc(hidden)]
pub struct Primitive {
    instance_id: u64,
    frame: FrameSnapshot,
    /// Release this instance's GPU resources instead of drawing.
    teardown: bool,
}

impl std::fmt::Debug for Primitive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Primitive")
            .field("instance_id", &self.instance_id)
            .field("teardown", &self.teardown)
            .finish_non_exhaustive()
    }
}

impl shader::Program<AtlasMessage> for CdeAtlas {
    type State = AtlasState;
    type Primitive = Primitive;

    fn draw(
        &self,
        state: &Self::State,
        _cursor: mouse::Cursor,
        _bounds: Rectangle,
    ) -> Self::Primitive {
        Primitive {
            instance_id: self.instance_id,
            frame: FrameSnapshot::new(&self.field, *state.viewport.camera()),
            teardown: !self.running,
        }
    }

    fn update(
        &self,
        state: &mut Self::State,
        event: &iced::Event,
        bounds: Rectangle,
        _cursor: mouse::Cursor,
    ) -> Option<shader::Action<AtlasMessage>> {
        let mut effects = UpdateEffects::default();

        effects.needs_redraw |= state.attach(self);
        state.bounds = bounds;
        effects.needs_redraw |= state.viewport.resize(bounds.width, bounds.height);

        state.sync_lifecycle(self, &mut effects);
        if !state.render_loop.is_running() {
            return effects.needs_redraw.then(shader::Action::request_redraw);
        }

        state.sync_triggers(self, Instant::now(), &mut effects);

        match event {
            iced::Event::Window(iced::window::Event::RedrawRequested(now)) => {
                state.advance_frame(*now, &mut effects);
            }
            iced::Event::Mouse(mouse_event) => {
                state.handle_mouse_event(*mouse_event, self, &mut effects);
            }
            iced::Event::Keyboard(keyboard_event) => {
                state.handle_keyboard_event(keyboard_event, self, &mut effects);
            }
            _ => {}
        }

        // Pin labels follow the camera; the first report seeds their placement.
        let camera_bounds = (*state.viewport.camera(), state.bounds);
        let camera_changed = self.camera_bounds != Some(camera_bounds);
        let publish_camera = camera_changed
            && (self.camera_bounds.is_none() || self.field.pin_labels().next().is_some());

        if effects.has_events() || publish_camera {
            return Some(shader::Action::publish(AtlasMessage::RenderUpdate(
                AtlasRenderUpdate {
                    hover: effects.hover,
                    hover_position: effects.hover_position,
                    select: effects.select,
                    clear_selection: effects.clear_selection,
                    focus_finished: effects.focus_finished,
                    zoom_step_finished: effects.zoom_step_finished,
                    camera_bounds: camera_changed.then_some(camera_bounds),
                },
            )));
        }

        effects.needs_redraw.then(shader::Action::request_redraw)
    }

    fn mouse_interaction(
        &self,
        state: &Self::State,
        _bounds: Rectangle,
        _cursor: mouse::Cursor,
    ) -> Interaction {
        state.mouse_interaction()
    }
}

#[doc(hidden)]
pub struct AtlasRendererState {
    renderers: HashMap<u64, AtlasRenderer>,
    format: TextureFormat,
}

impl shader::Primitive for Primitive {
    type Pipeline = AtlasRendererState;

    fn prepare(
        &self,
        renderer_state: &mut Self::Pipeline,
        device: &iced::wgpu::Device,
        queue: &iced::wgpu::Queue,
        bounds: &Rectangle,
        viewport: &Viewport,
    ) {
        if self.teardown {
            if let Some(mut renderer) = renderer_state.renderers.remove(&self.instance_id) {
                renderer.destroy();
            }
            return;
        }
        // Get or create renderer for this widget instance.
        let renderer = renderer_state
            .renderers
            .entry(self.instance_id)
            .or_insert_with(|| AtlasRenderer::new(device, queue, renderer_state.format));
        renderer.prepare_frame(device, queue, viewport, bounds, &self.frame);
    }

    fn render(
        &self,
        renderer_state: &Self::Pipeline,
        encoder: &mut iced::wgpu::CommandEncoder,
        target: &iced::wgpu::TextureView,
        clip_bounds: &Rectangle<u32>,
    ) {
        if self.teardown {
            return;
        }
        if let Some(renderer) = renderer_state.renderers.get(&self.instance_id) {
            renderer.encode(RenderParams {
                encoder,
                target,
                bounds: *clip_bounds,
            });
        }
    }
}

impl Pipeline for AtlasRendererState {
    fn new(
        _device: &iced::wgpu::Device,
        _queue: &iced::wgpu::Queue,
        format: iced::wgpu::TextureFormat,
    ) -> Self
    where
        Self: Sized,
    {
        AtlasRendererState {
            renderers: HashMap::new(),
            format,
        }
    }
}

// Global unique ID generator for widget instances
static NEXT_ID: AtomicU64 = AtomicU64::new(1);

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn entities() -> Vec<Entity> {
        vec![
            Entity::new(1, "Systolic blood pressure", "NHLBI", 2018, 1.0, 2.0)
                .with_description("Arterial pressure during contraction"),
            Entity::new(2, "Seizure frequency", "NINDS", 2020, -5.0, 0.5),
            Entity::new(3, "Seizure onset age", "NINDS", 2016, -4.0, 1.0),
            Entity::new(4, "Tumor size", "NCI", 2010, 8.0, -3.0),
        ]
    }

    fn atlas() -> CdeAtlas {
        CdeAtlas::new().with_entities(entities())
    }

    fn render_update(update: AtlasRenderUpdate) -> AtlasMessage {
        AtlasMessage::RenderUpdate(update)
    }

    #[test]
    fn instances_get_distinct_ids() {
        let a = CdeAtlas::new();
        let b = CdeAtlas::new();
        assert_ne!(a.instance_id, b.instance_id);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = AtlasConfig {
            point_size: -1.0,
            ..AtlasConfig::default()
        };
        assert!(CdeAtlas::with_config(config).is_err());
    }

    #[test]
    fn entities_build_the_field_and_apply_filters() {
        let atlas = atlas();
        assert_eq!(atlas.field().len(), 4);
        assert_eq!(atlas.search_index().len(), 4);

        let style = atlas.field().style();
        let old = atlas.field().index_of(EntityId(4)).unwrap();
        assert_eq!(atlas.field().final_alpha(old), Some(style.dimmed_opacity));
        let recent = atlas.field().index_of(EntityId(2)).unwrap();
        assert_eq!(atlas.field().final_alpha(recent), Some(style.active_opacity));
    }

    #[test]
    fn empty_entities_keep_the_previous_field() {
        let mut atlas = atlas();
        let generation = atlas.field().generation();
        atlas.set_entities(Vec::<Entity>::new());
        assert_eq!(atlas.field().generation(), generation);
        assert_eq!(atlas.field().len(), 4);
    }

    #[test]
    fn search_filters_and_enlarges_matches() {
        let mut atlas = atlas();
        let results = atlas.search("seizure").unwrap();
        assert_eq!(results.ids, HashSet::from([EntityId(2), EntityId(3)]));

        let style = atlas.field().style();
        let hit = atlas.field().index_of(EntityId(2)).unwrap();
        let miss = atlas.field().index_of(EntityId(1)).unwrap();
        assert_eq!(atlas.field().final_size(hit), Some(style.size_highlight));
        assert_eq!(atlas.field().final_alpha(miss), Some(style.dimmed_opacity));

        assert!(atlas.search("s").is_none());
        assert!(!atlas.interaction().has_active_search());
        assert_eq!(atlas.field().final_size(hit), Some(style.size));
        assert_eq!(atlas.field().final_alpha(miss), Some(style.active_opacity));
    }

    #[test]
    fn published_selection_pins_and_labels() {
        let mut atlas = atlas();
        atlas.update(render_update(AtlasRenderUpdate {
            select: Some(EntityId(2)),
            ..AtlasRenderUpdate::default()
        }));

        assert_eq!(atlas.interaction().selection(), &[EntityId(2)]);
        let index = atlas.field().index_of(EntityId(2)).unwrap();
        assert!(atlas.field().is_pinned(index));
        let labels: Vec<_> = atlas.field().pin_labels().map(|l| l.entity).collect();
        assert_eq!(labels, vec![EntityId(2)]);
        let focus = atlas.interaction().focus_request().unwrap();
        assert_eq!(focus.entity, EntityId(2));

        atlas.update(render_update(AtlasRenderUpdate {
            focus_finished: Some(focus.id),
            clear_selection: true,
            ..AtlasRenderUpdate::default()
        }));
        assert!(atlas.interaction().focus_request().is_none());
        assert!(atlas.interaction().selection().is_empty());
        assert!(!atlas.field().is_pinned(index));
        assert_eq!(atlas.field().pin_labels().count(), 0);
    }

    #[test]
    fn hover_moves_the_ring() {
        let mut atlas = atlas();
        atlas.update(render_update(AtlasRenderUpdate {
            hover: Some(HoverEvent::Hover(EntityId(1))),
            ..AtlasRenderUpdate::default()
        }));
        let ring = atlas.field().highlight().unwrap();
        assert_eq!(ring.entity, EntityId(1));
        assert_eq!(ring.center, DVec2::new(1.0, -2.0));

        atlas.update(render_update(AtlasRenderUpdate {
            hover: Some(HoverEvent::ClearHover),
            ..AtlasRenderUpdate::default()
        }));
        assert!(atlas.field().highlight().is_none());
    }

    #[test]
    fn hover_position_is_kept_for_tooltips() {
        let mut atlas = atlas();
        let message = render_update(AtlasRenderUpdate {
            hover: Some(HoverEvent::Hover(EntityId(4))),
            hover_position: Some(iced::Point::new(120.0, 48.5)),
            ..AtlasRenderUpdate::default()
        });
        assert_eq!(message.hover_position(), Some(iced::Point::new(120.0, 48.5)));
        atlas.update(message);
        assert_eq!(atlas.interaction().hovered(), Some(EntityId(4)));
        assert_eq!(
            atlas.interaction().hover_position(),
            Some(iced::Point::new(120.0, 48.5))
        );

        atlas.update(render_update(AtlasRenderUpdate {
            hover: Some(HoverEvent::ClearHover),
            ..AtlasRenderUpdate::default()
        }));
        assert_eq!(atlas.interaction().hover_position(), None);
    }

    #[test]
    fn hover_takes_precedence_over_search_highlight() {
        let mut atlas = atlas();
        atlas.with_interaction(|i| i.set_search_highlight(Some(EntityId(3))));
        assert_eq!(atlas.field().highlight().map(|r| r.entity), Some(EntityId(3)));

        atlas.with_interaction(|i| i.set_hovered(Some(EntityId(2))));
        assert_eq!(atlas.field().highlight().map(|r| r.entity), Some(EntityId(2)));

        atlas.with_interaction(|i| i.set_hovered(None));
        assert_eq!(atlas.field().highlight().map(|r| r.entity), Some(EntityId(3)));
    }

    #[test]
    fn reload_reapplies_filter_to_new_generation() {
        let mut atlas = atlas();
        atlas.with_interaction(|i| i.toggle_org("NINDS"));
        atlas.select(EntityId(1));

        atlas.set_entities(vec![
            Entity::new(7, "Heart rate", "NHLBI", 2019, 0.0, 0.0),
            Entity::new(8, "Gait speed", "NINDS", 2019, 1.0, 1.0),
        ]);
        let style = atlas.field().style();
        let hidden = atlas.field().index_of(EntityId(8)).unwrap();
        assert_eq!(atlas.field().final_alpha(hidden), Some(style.dimmed_opacity));
        assert_eq!(atlas.field().pin_labels().count(), 0);
        assert!(atlas.interaction().selection().is_empty());
    }

    #[test]
    fn camera_bounds_are_recorded() {
        let mut atlas = atlas();
        let camera = Camera::default();
        let bounds = Rectangle::new(iced::Point::ORIGIN, iced::Size::new(800.0, 600.0));
        atlas.update(render_update(AtlasRenderUpdate {
            camera_bounds: Some((camera, bounds)),
            ..AtlasRenderUpdate::default()
        }));
        assert_eq!(atlas.camera(), Some(&camera));
    }

    #[test]
    fn stop_and_start_toggle_running() {
        let mut atlas = atlas();
        assert!(atlas.is_running());
        atlas.stop();
        atlas.stop();
        assert!(!atlas.is_running());
        atlas.start();
        assert!(atlas.is_running());
    }
}

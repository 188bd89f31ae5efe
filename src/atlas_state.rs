use glam::DVec2;
use iced::{
    Rectangle, keyboard,
    mouse::{self, Event},
    time::Instant,
};

use crate::{
    CdeAtlas, EntityId,
    animation::AnimationFinished,
    config::AtlasConfig,
    message::HoverEvent,
    picking::{Picker, Release},
    render_loop::RenderLoop,
    viewport::ViewportController,
};

/// Wheel pixel delta treated as one notch.
const PIXELS_PER_WHEEL_NOTCH: f32 = 50.0;

/// Side effects collected while handling one widget update.
#[derive(Default, Debug)]
pub(crate) struct UpdateEffects {
    pub(crate) needs_redraw: bool,
    pub(crate) hover: Option<HoverEvent>,
    pub(crate) hover_position: Option<iced::Point>,
    pub(crate) select: Option<EntityId>,
    pub(crate) clear_selection: bool,
    pub(crate) focus_finished: Option<u64>,
    pub(crate) zoom_step_finished: Option<u64>,
}

impl UpdateEffects {
    pub(crate) fn has_events(&self) -> bool {
        self.hover.is_some()
            || self.hover_position.is_some()
            || self.select.is_some()
            || self.clear_selection
            || self.focus_finished.is_some()
            || self.zoom_step_finished.is_some()
    }
}

/// A camera animation started for an interaction request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingRequest {
    generation: u64,
    request: u64,
}

#[derive(Default, Debug, Clone)]
pub(crate) struct PanState {
    pub(crate) active: bool,
    /// Button that started the current press.
    pub(crate) button: Option<mouse::Button>,
    pub(crate) last_cursor: DVec2,
}

#[derive(Debug, Clone)]
/// Widget-owned state of the atlas: camera, picking and frame driver.
///
/// Not part of the public API, but pub visibility is required for the shader implementation.
pub struct AtlasState {
    pub(crate) viewport: ViewportController,
    pub(crate) picker: Picker,
    pub(crate) render_loop: RenderLoop,
    pub(crate) bounds: Rectangle,
    pub(crate) pan: PanState,
    /// Last hover target published to the application.
    pub(crate) hovered: Option<EntityId>,
    pub(crate) source_instance_id: Option<u64>,
    seen_reset: u64,
    seen_focus: Option<u64>,
    seen_zoom_step: Option<u64>,
    pending_focus: Option<PendingRequest>,
    pending_zoom_step: Option<PendingRequest>,
}

impl Default for AtlasState {
    fn default() -> Self {
        Self::new(&AtlasConfig::default())
    }
}

impl AtlasState {
    pub(crate) fn new(config: &AtlasConfig) -> Self {
        Self {
            viewport: ViewportController::new(config),
            picker: Picker::new(config),
            render_loop: RenderLoop::default(),
            bounds: Rectangle::default(),
            pan: PanState::default(),
            hovered: None,
            source_instance_id: None,
            seen_reset: 0,
            seen_focus: None,
            seen_zoom_step: None,
            pending_focus: None,
            pending_zoom_step: None,
        }
    }

    /// Bind this state to `widget`, starting over when it was last used by a
    /// different instance.
    pub(crate) fn attach(&mut self, widget: &CdeAtlas) -> bool {
        if self.source_instance_id == Some(widget.instance_id) {
            return false;
        }
        *self = Self::new(&widget.config);
        if let Some((camera, _)) = &widget.camera_bounds {
            self.viewport.restore(camera);
        }
        // Resets requested before the widget was shown have nothing to undo.
        self.seen_reset = widget.interaction.reset_counter();
        self.source_instance_id = Some(widget.instance_id);
        true
    }

    pub(crate) fn point_inside(&self, x: f32, y: f32) -> bool {
        self.bounds.contains(iced::Point::new(x, y))
    }

    pub(crate) fn cursor_inside(&self) -> bool {
        self.picker.cursor().is_some_and(|cursor| {
            cursor.x >= 0.0
                && cursor.y >= 0.0
                && cursor.x <= self.bounds.width as f64
                && cursor.y <= self.bounds.height as f64
        })
    }

    fn local(&self, position: iced::Point) -> DVec2 {
        DVec2::new(
            (position.x - self.bounds.x) as f64,
            (position.y - self.bounds.y) as f64,
        )
    }

    /// Start or stop the render loop to match the widget.
    pub(crate) fn sync_lifecycle(&mut self, widget: &CdeAtlas, effects: &mut UpdateEffects) {
        let changed = if widget.running {
            self.render_loop.start()
        } else {
            self.render_loop.stop()
        };
        // One more draw lets the primitive create or release GPU resources.
        effects.needs_redraw |= changed;
    }

    /// Start camera animations for reset, focus and zoom step requests not
    /// seen before.
    pub(crate) fn sync_triggers(
        &mut self,
        widget: &CdeAtlas,
        now: Instant,
        effects: &mut UpdateEffects,
    ) {
        let interaction = &widget.interaction;
        let config = &widget.config;

        if interaction.reset_counter() != self.seen_reset {
            self.seen_reset = interaction.reset_counter();
            self.supersede_pending(effects);
            self.viewport.reset_to_default(config.reset_duration(), now);
            effects.needs_redraw = true;
        }

        if let Some(request) = interaction.focus_request()
            && self.seen_focus != Some(request.id)
        {
            self.seen_focus = Some(request.id);
            match interaction.entity(request.entity) {
                Some(entity) => {
                    self.supersede_pending(effects);
                    let target = DVec2::from(entity.world_position());
                    let generation = self.viewport.focus_on(
                        target,
                        config.focus_zoom,
                        config.focus_duration(),
                        now,
                    );
                    self.pending_focus = Some(PendingRequest {
                        generation,
                        request: request.id,
                    });
                    effects.needs_redraw = true;
                }
                None => effects.focus_finished = Some(request.id),
            }
        }

        if let Some(request) = interaction.zoom_step_request()
            && self.seen_zoom_step != Some(request.id)
        {
            self.seen_zoom_step = Some(request.id);
            self.supersede_pending(effects);
            let generation =
                self.viewport
                    .step_zoom(request.direction, config.step_zoom_duration(), now);
            self.pending_zoom_step = Some(PendingRequest {
                generation,
                request: request.id,
            });
            effects.needs_redraw = true;
        }
    }

    /// Acknowledge requests whose animation is about to be replaced; they
    /// will never finish on their own.
    fn supersede_pending(&mut self, effects: &mut UpdateEffects) {
        if let Some(pending) = self.pending_focus.take() {
            effects.focus_finished = Some(pending.request);
        }
        if let Some(pending) = self.pending_zoom_step.take() {
            effects.zoom_step_finished = Some(pending.request);
        }
    }

    /// Stop any camera animation because the user took over.
    fn interrupt_animation(&mut self, effects: &mut UpdateEffects) {
        if self.viewport.is_animating() {
            self.viewport.cancel_animation();
            self.supersede_pending(effects);
        }
    }

    fn finish(&mut self, finished: AnimationFinished, effects: &mut UpdateEffects) {
        if let Some(pending) = self.pending_focus
            && pending.generation == finished.generation
        {
            self.pending_focus = None;
            effects.focus_finished = Some(pending.request);
        }
        if let Some(pending) = self.pending_zoom_step
            && pending.generation == finished.generation
        {
            self.pending_zoom_step = None;
            effects.zoom_step_finished = Some(pending.request);
        }
    }

    /// Tick the render loop for a redraw at `now`.
    pub(crate) fn advance_frame(&mut self, now: Instant, effects: &mut UpdateEffects) {
        let outcome = self.render_loop.frame(now, &mut self.viewport);
        if let Some(finished) = outcome.finished {
            self.finish(finished, effects);
        }
        effects.needs_redraw |= outcome.keep_running;
    }

    fn update_hover(&mut self, widget: &CdeAtlas, effects: &mut UpdateEffects) {
        if !widget.controls.hover || self.picker.is_dragging() {
            return;
        }
        let hit = if self.cursor_inside() {
            self.picker
                .pick_cursor(
                    &self.viewport,
                    &widget.field,
                    widget.interaction.filtered_ids(),
                )
                .map(|hit| hit.id)
        } else {
            None
        };
        self.publish_hover(hit, widget, effects);

        if hit.is_some()
            && let Some(cursor) = self.picker.cursor()
        {
            let position = iced::Point::new(cursor.x as f32, cursor.y as f32);
            if widget.interaction.hover_position() != Some(position) {
                effects.hover_position = Some(position);
            }
        }
    }

    fn publish_hover(
        &mut self,
        hit: Option<EntityId>,
        widget: &CdeAtlas,
        effects: &mut UpdateEffects,
    ) {
        // The application may have dropped its hover, e.g. on reload.
        if hit == self.hovered && hit == widget.interaction.hovered() {
            return;
        }
        self.hovered = hit;
        effects.hover = Some(match hit {
            Some(id) => HoverEvent::Hover(id),
            None => HoverEvent::ClearHover,
        });
    }

    pub(crate) fn handle_mouse_event(
        &mut self,
        event: Event,
        widget: &CdeAtlas,
        effects: &mut UpdateEffects,
    ) {
        match event {
            Event::CursorMoved { position } => {
                let inside = self.point_inside(position.x, position.y);
                let local = self.local(position);

                if self.pan.active {
                    self.picker.set_cursor(local);
                    // Small jitter before the click threshold is not a pan.
                    if self.picker.is_dragging() {
                        self.viewport.drag_by(local - self.pan.last_cursor);
                        self.pan.last_cursor = local;
                        effects.needs_redraw = true;
                    }
                    return;
                }

                if inside {
                    self.picker.set_cursor(local);
                    self.update_hover(widget, effects);
                } else if self.picker.cursor().is_some() {
                    self.picker.clear_cursor();
                    self.publish_hover(None, widget, effects);
                }
            }
            Event::CursorLeft => {
                self.picker.clear_cursor();
                self.pan.active = false;
                self.publish_hover(None, widget, effects);
            }
            Event::ButtonPressed(button @ (mouse::Button::Left | mouse::Button::Right)) => {
                if self.pan.button.is_some() || !self.cursor_inside() {
                    return;
                }
                // The right button only pans.
                if button == mouse::Button::Right && !widget.controls.drag_to_pan {
                    return;
                }
                let Some(cursor) = self.picker.cursor() else {
                    return;
                };
                self.picker.press(cursor);
                self.pan.button = Some(button);
                if widget.controls.drag_to_pan {
                    self.interrupt_animation(effects);
                    self.pan.active = true;
                    self.pan.last_cursor = cursor;
                }
            }
            Event::ButtonReleased(button @ (mouse::Button::Left | mouse::Button::Right)) => {
                if self.pan.button != Some(button) {
                    return;
                }
                self.pan.button = None;
                self.pan.active = false;
                let position = self.picker.cursor().unwrap_or(self.pan.last_cursor);
                match self.picker.release(position) {
                    Release::Click(at)
                        if button == mouse::Button::Left && widget.controls.click_to_select =>
                    {
                        let hit = self.picker.pick_at(
                            at,
                            &self.viewport,
                            &widget.field,
                            widget.interaction.filtered_ids(),
                        );
                        if let Some(hit) = hit {
                            log::trace!("clicked {}", hit.id);
                            effects.select = Some(hit.id);
                        }
                    }
                    Release::Click(_) | Release::Drag | Release::None => {}
                }
                effects.needs_redraw |= self.viewport.is_moving();
            }
            Event::WheelScrolled { delta } => {
                if !widget.controls.wheel_zoom || !self.cursor_inside() {
                    return;
                }
                let Some(cursor) = self.picker.cursor() else {
                    return;
                };
                let notches = match delta {
                    mouse::ScrollDelta::Lines { y, .. } => y,
                    mouse::ScrollDelta::Pixels { y, .. } => y / PIXELS_PER_WHEEL_NOTCH,
                };
                if notches == 0.0 {
                    return;
                }
                self.interrupt_animation(effects);
                let factor = widget.config.wheel_zoom_factor.powf(notches as f64);
                self.viewport.zoom_at(cursor, factor);
                self.update_hover(widget, effects);
                effects.needs_redraw = true;
            }
            _ => {}
        }
    }

    pub(crate) fn handle_keyboard_event(
        &mut self,
        event: &keyboard::Event,
        widget: &CdeAtlas,
        effects: &mut UpdateEffects,
    ) {
        if let keyboard::Event::KeyPressed {
            key: keyboard::Key::Named(keyboard::key::Named::Escape),
            ..
        } = event
        {
            self.escape_pressed(widget, effects);
        }
    }

    fn escape_pressed(&mut self, widget: &CdeAtlas, effects: &mut UpdateEffects) {
        if widget.controls.clear_on_escape && !widget.interaction.selection().is_empty() {
            effects.clear_selection = true;
        }
    }

    pub(crate) fn mouse_interaction(&self) -> mouse::Interaction {
        if self.pan.active && self.picker.is_dragging() {
            mouse::Interaction::Grabbing
        } else if self.hovered.is_some() {
            mouse::Interaction::Pointer
        } else if self.cursor_inside() {
            mouse::Interaction::Grab
        } else {
            mouse::Interaction::None
        }
    }
}

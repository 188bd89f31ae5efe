//! Implements hover and click picking for the atlas widget.
use std::collections::{HashMap, HashSet};

use glam::DVec2;

use crate::config::AtlasConfig;
use crate::entity::EntityId;
use crate::point_field::PointField;
use crate::viewport::ViewportController;

/// A point found under the cursor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PickHit {
    pub id: EntityId,
    /// Index into the point field.
    pub index: usize,
    /// World-space distance from the cursor.
    pub distance: f64,
}

/// Result of releasing the pointer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Release {
    /// The pointer stayed within the click threshold.
    Click(DVec2),
    /// The pointer moved too far; the gesture was a pan.
    Drag,
    /// No press was recorded.
    None,
}

/// Uniform bucket grid over world positions so a pick only scans the
/// neighborhood of the cursor.
#[derive(Debug, Clone, Default)]
struct PointGrid {
    cell: f64,
    cells: HashMap<(i64, i64), Vec<u32>>,
    generation: Option<u64>,
}

impl PointGrid {
    fn cell_of(&self, p: DVec2) -> (i64, i64) {
        ((p.x / self.cell).floor() as i64, (p.y / self.cell).floor() as i64)
    }

    fn rebuild(&mut self, field: &PointField, cell: f64) {
        self.cell = cell;
        self.cells.clear();
        for (index, position) in field.positions().iter().enumerate() {
            let p = DVec2::new(position[0] as f64, position[1] as f64);
            let key = self.cell_of(p);
            self.cells.entry(key).or_default().push(index as u32);
        }
        self.generation = Some(field.generation());
        log::debug!(
            "pick grid rebuilt: {} points in {} cells",
            field.len(),
            self.cells.len()
        );
    }

    /// Indices of every point whose cell intersects the square of half side
    /// `radius` around `center`.
    fn neighborhood(&self, center: DVec2, radius: f64) -> impl Iterator<Item = usize> + '_ {
        let (x0, y0) = self.cell_of(center - DVec2::splat(radius));
        let (x1, y1) = self.cell_of(center + DVec2::splat(radius));
        (x0..=x1)
            .flat_map(move |x| (y0..=y1).map(move |y| (x, y)))
            .filter_map(|key| self.cells.get(&key))
            .flatten()
            .map(|&index| index as usize)
    }
}

/// Cursor tracking, hit testing and click/drag disambiguation.
#[derive(Debug, Clone)]
pub struct Picker {
    /// Hit tolerance at zoom 1, in world units.
    base_threshold: f64,
    /// Pointer travel in logical pixels separating a click from a drag.
    click_threshold_px: f64,
    grid: PointGrid,
    cursor: Option<DVec2>,
    press: Option<DVec2>,
}

impl Default for Picker {
    fn default() -> Self {
        Self::new(&AtlasConfig::default())
    }
}

impl Picker {
    pub fn new(config: &AtlasConfig) -> Self {
        Self {
            base_threshold: config.pick_threshold,
            click_threshold_px: config.click_threshold_px as f64,
            grid: PointGrid::default(),
            cursor: None,
            press: None,
        }
    }

    /// World-space hit radius at `zoom`.
    pub fn tolerance(&self, zoom: f64) -> f64 {
        self.base_threshold / zoom
    }

    /// Rebuild the spatial grid when the field generation changed.
    pub fn sync(&mut self, field: &PointField) {
        if self.grid.generation != Some(field.generation()) {
            self.grid.rebuild(field, self.base_threshold);
        }
    }

    /// Record the pointer position in widget-local logical pixels.
    pub fn set_cursor(&mut self, position: DVec2) {
        self.cursor = Some(position);
    }

    /// Forget the pointer, e.g. when it leaves the widget.
    pub fn clear_cursor(&mut self) {
        self.cursor = None;
        self.press = None;
    }

    pub fn cursor(&self) -> Option<DVec2> {
        self.cursor
    }

    /// Nearest point within tolerance of `screen` that passes `filtered`.
    ///
    /// Candidates are visited in increasing distance; filtered-out points are
    /// skipped, so a visible point hidden behind a dimmed one is still found.
    pub fn pick_at(
        &mut self,
        screen: DVec2,
        viewport: &ViewportController,
        field: &PointField,
        filtered: &HashSet<EntityId>,
    ) -> Option<PickHit> {
        if field.is_empty() {
            return None;
        }
        self.sync(field);

        let world = viewport.camera().screen_to_world(screen, viewport.size());
        let tolerance = self.tolerance(viewport.zoom());
        let positions = field.positions();

        let mut candidates: Vec<(usize, f64)> = self
            .grid
            .neighborhood(world, tolerance)
            .filter_map(|index| {
                let position = positions.get(index)?;
                let p = DVec2::new(position[0] as f64, position[1] as f64);
                let distance = p.distance(world);
                (distance <= tolerance).then_some((index, distance))
            })
            .collect();
        candidates.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));

        let hit = candidates.into_iter().find_map(|(index, distance)| {
            let id = field.entity(index)?.id;
            filtered.contains(&id).then_some(PickHit {
                id,
                index,
                distance,
            })
        });
        log::trace!("pick at {screen:?} (world {world:?}, tol {tolerance:.4}): {hit:?}");
        hit
    }

    /// Pick under the tracked cursor.
    pub fn pick_cursor(
        &mut self,
        viewport: &ViewportController,
        field: &PointField,
        filtered: &HashSet<EntityId>,
    ) -> Option<PickHit> {
        let cursor = self.cursor?;
        self.pick_at(cursor, viewport, field, filtered)
    }

    /// Record a pointer press.
    pub fn press(&mut self, position: DVec2) {
        self.press = Some(position);
        self.cursor = Some(position);
    }

    pub fn is_pressed(&self) -> bool {
        self.press.is_some()
    }

    /// Whether the pointer has moved past the click threshold since the press.
    pub fn is_dragging(&self) -> bool {
        match (self.press, self.cursor) {
            (Some(start), Some(now)) => start.distance(now) > self.click_threshold_px,
            _ => false,
        }
    }

    /// Classify a pointer release at `position`.
    pub fn release(&mut self, position: DVec2) -> Release {
        self.cursor = Some(position);
        let Some(start) = self.press.take() else {
            return Release::None;
        };
        if start.distance(position) > self.click_threshold_px {
            Release::Drag
        } else {
            Release::Click(position)
        }
    }
}

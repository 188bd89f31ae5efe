//! CPU mirror of the per-point GPU buffers.
//!
//! The field keeps one entry per entity in parallel arrays (position, color,
//! alpha, size) plus an encoded state texture with one RGBA8 texel per point.
//! Visual state that toggles often (pinning) lives only in the texture, so a
//! toggle touches a single byte instead of the attribute arrays. The shader
//! resolves the final alpha and size per point at draw time.
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};

use crate::config::AtlasConfig;
use crate::entity::{Entity, EntityId};
use crate::overlay::{HighlightRing, PinLabel};
use crate::palette::Palette;

/// Bit 0 of the R channel: the entity is pinned.
pub const STATE_FLAG_PINNED: u8 = 1;

/// Widest encoded state texture row. Larger fields wrap onto more rows.
pub const STATE_TEXTURE_MAX_WIDTH: u32 = 4096;

const BYTES_PER_TEXEL: usize = 4;

/// Size and opacity levels used by the point field and its shader.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointStyle {
    pub size: f32,
    pub size_highlight: f32,
    pub size_pinned: f32,
    pub dimmed_opacity: f32,
    pub active_opacity: f32,
    pub pinned_opacity: f32,
}

impl From<&AtlasConfig> for PointStyle {
    fn from(config: &AtlasConfig) -> Self {
        Self {
            size: config.point_size,
            size_highlight: config.point_size_highlight,
            size_pinned: config.point_size_pinned,
            dimmed_opacity: config.dimmed_opacity,
            active_opacity: config.active_opacity,
            pinned_opacity: config.pinned_opacity,
        }
    }
}

/// Per-point state flags packed into RGBA8 texels, addressed by point index.
///
/// Rows are stored and versioned separately: a flag change copies and
/// re-uploads only the row it lands in, even while a frame snapshot still
/// holds the previous rows.
#[derive(Debug, Clone, PartialEq)]
pub struct PointStateTexture {
    rows: Vec<Arc<Vec<u8>>>,
    row_versions: Vec<u64>,
    width: u32,
    height: u32,
}

impl PointStateTexture {
    /// All-zero texture large enough for `count` points.
    pub fn new(count: usize) -> Self {
        let (width, height) = Self::dimensions_for(count);
        let row_len = width as usize * BYTES_PER_TEXEL;
        Self {
            rows: (0..height).map(|_| Arc::new(vec![0; row_len])).collect(),
            row_versions: vec![0; height as usize],
            width,
            height,
        }
    }

    /// Texture size for `count` points: a single row up to the max width,
    /// then as many full-width rows as needed.
    pub fn dimensions_for(count: usize) -> (u32, u32) {
        let count = count.max(1) as u32;
        if count <= STATE_TEXTURE_MAX_WIDTH {
            (count, 1)
        } else {
            (
                STATE_TEXTURE_MAX_WIDTH,
                count.div_ceil(STATE_TEXTURE_MAX_WIDTH),
            )
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw RGBA8 bytes of one texel row.
    pub fn row(&self, row: usize) -> Option<&[u8]> {
        self.rows.get(row).map(|bytes| bytes.as_slice())
    }

    /// Change counter of every row, bumped whenever a byte in the row changes.
    pub fn row_versions(&self) -> &[u64] {
        &self.row_versions
    }

    pub(crate) fn shared_rows(&self) -> &[Arc<Vec<u8>>] {
        &self.rows
    }

    /// Texel coordinates `(column, row)` of a point index.
    pub fn texel_of(&self, index: usize) -> (u32, u32) {
        let index = index as u32;
        (index % self.width, index / self.width)
    }

    /// Flag byte (R channel) of a point.
    pub fn flags(&self, index: usize) -> u8 {
        let (column, row) = self.texel_of(index);
        self.rows
            .get(row as usize)
            .and_then(|bytes| bytes.get(column as usize * BYTES_PER_TEXEL))
            .copied()
            .unwrap_or_default()
    }

    /// Set or clear `flag` for one point. Returns whether the byte changed.
    pub fn set_flag(&mut self, index: usize, flag: u8, on: bool) -> bool {
        let (column, row) = self.texel_of(index);
        let offset = column as usize * BYTES_PER_TEXEL;
        let Some(bytes) = self.rows.get_mut(row as usize) else {
            return false;
        };
        let Some(&current) = bytes.get(offset) else {
            return false;
        };
        let next = if on { current | flag } else { current & !flag };
        if next == current {
            return false;
        }
        Arc::make_mut(bytes)[offset] = next;
        let version = &mut self.row_versions[row as usize];
        *version = version.wrapping_add(1);
        true
    }
}

/// Version counters the renderer compares against to find stale GPU data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FieldVersions {
    /// Bumped by every successful build; positions and colors change only here.
    pub generation: u64,
    /// Alpha and size arrays.
    pub attributes: u64,
    /// Encoded state texture.
    pub state: u64,
    /// Highlight ring and pin labels.
    pub overlays: u64,
}

/// Per-point visual buffers for the whole entity sequence.
#[derive(Debug, Clone)]
pub struct PointField {
    style: PointStyle,
    palette: Palette,
    ring_inner_radius: f32,
    ring_outer_radius: f32,
    ring_color: [f32; 4],
    label_max_chars: usize,

    entities: Arc<[Entity]>,
    id_to_index: HashMap<EntityId, usize>,
    positions: Arc<[[f32; 2]]>,
    colors: Arc<[[f32; 3]]>,
    alphas: Arc<Vec<f32>>,
    sizes: Arc<Vec<f32>>,
    state: PointStateTexture,
    /// Pinned ids as last synced, diffed against on the next sync.
    pinned: HashSet<EntityId>,

    highlight: Option<HighlightRing>,
    pin_labels: IndexMap<EntityId, PinLabel>,

    versions: FieldVersions,
}

impl Default for PointField {
    fn default() -> Self {
        Self::new(&AtlasConfig::default())
    }
}

impl PointField {
    pub fn new(config: &AtlasConfig) -> Self {
        let [r, g, b] = config.ring_color;
        Self {
            style: PointStyle::from(config),
            palette: config.palette.clone(),
            ring_inner_radius: config.ring_inner_radius,
            ring_outer_radius: config.ring_outer_radius,
            ring_color: [
                r as f32 / 255.0,
                g as f32 / 255.0,
                b as f32 / 255.0,
                config.ring_opacity,
            ],
            label_max_chars: config.label_max_chars,
            entities: Arc::new([]),
            id_to_index: HashMap::new(),
            positions: Arc::new([]),
            colors: Arc::new([]),
            alphas: Arc::new(Vec::new()),
            sizes: Arc::new(Vec::new()),
            state: PointStateTexture::new(0),
            pinned: HashSet::new(),
            highlight: None,
            pin_labels: IndexMap::new(),
            versions: FieldVersions::default(),
        }
    }

    /// Replace every buffer with a fresh generation built from `entities`.
    ///
    /// An empty sequence is a no-op and returns `false`. Overlays and pin
    /// state of the previous generation are dropped; callers re-apply the
    /// current filter and pins afterwards.
    ///
    /// Ids must be unique. With duplicates the id maps to the last index
    /// holding it.
    pub fn build(&mut self, entities: impl Into<Arc<[Entity]>>) -> bool {
        let entities = entities.into();
        if entities.is_empty() {
            log::debug!("point field build skipped: empty entity sequence");
            return false;
        }

        self.dispose();

        let count = entities.len();
        let mut id_to_index = HashMap::with_capacity(count);
        let mut positions = Vec::with_capacity(count);
        let mut colors = Vec::with_capacity(count);

        for (index, entity) in entities.iter().enumerate() {
            let [x, y] = entity.world_position();
            positions.push([x as f32, y as f32]);
            colors.push(self.palette.rgb_f32(&entity.organization));
            if id_to_index.insert(entity.id, index).is_some() {
                log::warn!("duplicate entity id {}; keeping index {index}", entity.id);
            }
        }

        self.entities = entities;
        self.id_to_index = id_to_index;
        self.positions = positions.into();
        self.colors = colors.into();
        self.alphas = Arc::new(vec![self.style.active_opacity; count]);
        self.sizes = Arc::new(vec![self.style.size; count]);
        self.state = PointStateTexture::new(count);

        self.versions.generation = self.versions.generation.wrapping_add(1);
        self.bump_attributes();
        self.bump_state();
        log::debug!(
            "point field generation {} built with {count} points ({}x{} state texels)",
            self.versions.generation,
            self.state.width(),
            self.state.height()
        );
        true
    }

    /// Drop all buffers and overlays of the current generation.
    pub fn dispose(&mut self) {
        if self.entities.is_empty() && self.highlight.is_none() && self.pin_labels.is_empty() {
            return;
        }
        self.entities = Arc::new([]);
        self.id_to_index.clear();
        self.positions = Arc::new([]);
        self.colors = Arc::new([]);
        self.alphas = Arc::new(Vec::new());
        self.sizes = Arc::new(Vec::new());
        self.state = PointStateTexture::new(0);
        self.pinned.clear();
        self.clear_overlays();
        self.bump_attributes();
        self.bump_state();
    }

    /// Recompute alpha and size for every point from the filtered-id set.
    pub fn apply_filter(&mut self, filtered: &HashSet<EntityId>, has_active_search: bool) {
        let style = self.style;
        let alphas = Arc::make_mut(&mut self.alphas);
        let sizes = Arc::make_mut(&mut self.sizes);

        for (i, entity) in self.entities.iter().enumerate() {
            let active = filtered.contains(&entity.id);
            alphas[i] = if active {
                style.active_opacity
            } else {
                style.dimmed_opacity
            };
            sizes[i] = if active && has_active_search {
                style.size_highlight
            } else {
                style.size
            };
        }
        self.bump_attributes();
        log::debug!(
            "filter applied: {} of {} points active (search: {has_active_search})",
            filtered.len(),
            self.entities.len()
        );
    }

    /// Set or clear the pinned flag of one entity.
    ///
    /// Unknown ids are ignored. Returns whether the encoded state changed.
    pub fn set_pinned(&mut self, id: EntityId, pinned: bool) -> bool {
        if pinned {
            self.pinned.insert(id);
        } else {
            self.pinned.remove(&id);
        }
        let Some(&index) = self.id_to_index.get(&id) else {
            return false;
        };
        let changed = self.state.set_flag(index, STATE_FLAG_PINNED, pinned);
        if changed {
            self.bump_state();
        }
        changed
    }

    /// Bring the pinned flags in line with `pinned`, touching only the ids that
    /// entered or left the set since the previous sync.
    pub fn sync_pinned(&mut self, pinned: &IndexSet<EntityId>) {
        let mut changed = false;

        let added: Vec<EntityId> = pinned
            .iter()
            .filter(|id| !self.pinned.contains(*id))
            .copied()
            .collect();
        let removed: Vec<EntityId> = self
            .pinned
            .iter()
            .filter(|id| !pinned.contains(*id))
            .copied()
            .collect();

        for id in added {
            changed |= self.set_pinned(id, true);
        }
        for id in removed {
            changed |= self.set_pinned(id, false);
        }

        if changed {
            log::debug!("pinned flags synced: {} pinned", self.pinned.len());
        }
    }

    /// Place the highlight ring on an entity, or remove it with `None`.
    ///
    /// Ids missing from the current build are ignored. Returns whether the
    /// ring changed.
    pub fn set_highlight(&mut self, id: Option<EntityId>) -> bool {
        let ring = match id {
            None => None,
            Some(id) => {
                let Some(entity) = self.entity_by_id(id) else {
                    return false;
                };
                Some(HighlightRing {
                    entity: id,
                    center: entity.world_position().into(),
                    inner_radius: self.ring_inner_radius,
                    outer_radius: self.ring_outer_radius,
                    color: self.ring_color,
                })
            }
        };
        if ring == self.highlight {
            return false;
        }
        self.highlight = ring;
        self.bump_overlays();
        true
    }

    /// Create labels for newly pinned entities and remove labels of entities
    /// no longer pinned.
    pub fn sync_pins(&mut self, pinned: &IndexSet<EntityId>) {
        let before = self.pin_labels.len();
        self.pin_labels.retain(|id, _| pinned.contains(id));
        let mut changed = self.pin_labels.len() != before;

        for &id in pinned {
            if self.pin_labels.contains_key(&id) {
                continue;
            }
            let Some(&index) = self.id_to_index.get(&id) else {
                continue;
            };
            let label = PinLabel::new(&self.entities[index], self.label_max_chars);
            self.pin_labels.insert(id, label);
            changed = true;
        }

        if changed {
            self.bump_overlays();
        }
    }

    fn clear_overlays(&mut self) {
        if self.highlight.take().is_some() || !self.pin_labels.is_empty() {
            self.pin_labels.clear();
            self.bump_overlays();
        }
    }

    fn bump_attributes(&mut self) {
        self.versions.attributes = self.versions.attributes.wrapping_add(1);
    }

    fn bump_state(&mut self) {
        self.versions.state = self.versions.state.wrapping_add(1);
    }

    fn bump_overlays(&mut self) {
        self.versions.overlays = self.versions.overlays.wrapping_add(1);
    }

    // ---- accessors ----

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn versions(&self) -> FieldVersions {
        self.versions
    }

    pub fn generation(&self) -> u64 {
        self.versions.generation
    }

    pub fn style(&self) -> PointStyle {
        self.style
    }

    pub fn entities(&self) -> &Arc<[Entity]> {
        &self.entities
    }

    pub fn entity(&self, index: usize) -> Option<&Entity> {
        self.entities.get(index)
    }

    pub fn index_of(&self, id: EntityId) -> Option<usize> {
        self.id_to_index.get(&id).copied()
    }

    pub fn entity_by_id(&self, id: EntityId) -> Option<&Entity> {
        self.index_of(id).and_then(|index| self.entities.get(index))
    }

    pub fn positions(&self) -> &Arc<[[f32; 2]]> {
        &self.positions
    }

    pub fn colors(&self) -> &Arc<[[f32; 3]]> {
        &self.colors
    }

    pub fn alphas(&self) -> &Arc<Vec<f32>> {
        &self.alphas
    }

    pub fn sizes(&self) -> &Arc<Vec<f32>> {
        &self.sizes
    }

    pub fn state_texture(&self) -> &PointStateTexture {
        &self.state
    }

    pub fn is_pinned(&self, index: usize) -> bool {
        self.state.flags(index) & STATE_FLAG_PINNED != 0
    }

    /// Opacity the shader resolves for a point.
    pub fn final_alpha(&self, index: usize) -> Option<f32> {
        let base = *self.alphas.get(index)?;
        Some(if self.is_pinned(index) {
            self.style.pinned_opacity
        } else {
            base
        })
    }

    /// Diameter the shader resolves for a point.
    pub fn final_size(&self, index: usize) -> Option<f32> {
        let base = *self.sizes.get(index)?;
        Some(if self.is_pinned(index) {
            self.style.size_pinned
        } else {
            base
        })
    }

    pub fn highlight(&self) -> Option<&HighlightRing> {
        self.highlight.as_ref()
    }

    pub fn pin_labels(&self) -> impl Iterator<Item = &PinLabel> {
        self.pin_labels.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entities() -> Vec<Entity> {
        vec![
            Entity::new(10, "Systolic blood pressure", "NHLBI", 2018, 1.0, 2.0),
            Entity::new(20, "Seizure frequency", "NINDS", 2020, -5.0, 0.5),
            Entity::new(30, "Unknown steward element", "Nobody", 2016, 0.0, -3.0),
            Entity::new(
                40,
                "A very long element name that certainly exceeds the label limit",
                "NINDS",
                2023,
                8.0,
                8.0,
            ),
        ]
    }

    fn built() -> PointField {
        let mut field = PointField::default();
        assert!(field.build(entities()));
        field
    }

    fn ids(values: &[u32]) -> HashSet<EntityId> {
        values.iter().copied().map(EntityId).collect()
    }

    fn pins(values: &[u32]) -> IndexSet<EntityId> {
        values.iter().copied().map(EntityId).collect()
    }

    #[test]
    fn build_keeps_index_alignment() {
        let field = built();
        let input = entities();
        assert_eq!(field.len(), input.len());
        for (i, entity) in input.iter().enumerate() {
            assert_eq!(field.entity(i).unwrap().id, entity.id);
            assert_eq!(field.index_of(entity.id), Some(i));
            assert_eq!(field.positions()[i], [entity.x as f32, -entity.y as f32]);
            assert_eq!(
                field.colors()[i],
                Palette::default().rgb_f32(&entity.organization)
            );
        }
        assert_eq!(field.alphas().as_slice(), &[0.85; 4]);
        assert_eq!(field.sizes().as_slice(), &[4.0; 4]);
    }

    #[test]
    fn unknown_organization_gets_fallback_color() {
        let field = built();
        let [r, g, b] = field.colors()[2];
        assert!((r - 0.6).abs() < 1e-6 && (g - 0.6).abs() < 1e-6 && (b - 0.6).abs() < 1e-6);
    }

    #[test]
    fn empty_build_is_a_noop() {
        let mut field = built();
        let versions = field.versions();
        assert!(!field.build(Vec::new()));
        assert_eq!(field.len(), 4);
        assert_eq!(field.versions(), versions);
    }

    #[test]
    fn rebuild_replaces_generation_and_clears_overlays() {
        let mut field = built();
        field.set_pinned(EntityId(20), true);
        field.sync_pins(&pins(&[20]));
        field.set_highlight(Some(EntityId(10)));
        let first = field.generation();

        let next = vec![Entity::new(99, "Only one", "NLM", 2021, 0.0, 0.0)];
        assert!(field.build(next));

        assert!(field.generation() > first);
        assert_eq!(field.len(), 1);
        assert!(field.highlight().is_none());
        assert_eq!(field.pin_labels().count(), 0);
        assert_eq!(field.index_of(EntityId(20)), None);
        assert_eq!(field.state_texture().flags(0), 0);
    }

    #[test]
    fn apply_filter_sets_alpha_and_size() {
        let mut field = built();
        field.apply_filter(&ids(&[10, 30]), false);
        assert_eq!(field.alphas().as_slice(), &[0.85, 0.03, 0.85, 0.03]);
        assert_eq!(field.sizes().as_slice(), &[4.0; 4]);

        field.apply_filter(&ids(&[10, 30]), true);
        assert_eq!(field.sizes().as_slice(), &[7.0, 4.0, 7.0, 4.0]);
    }

    #[test]
    fn apply_filter_is_idempotent() {
        let mut field = built();
        field.apply_filter(&ids(&[20, 40]), true);
        let alphas = field.alphas().as_ref().clone();
        let sizes = field.sizes().as_ref().clone();
        let state = field.state_texture().clone();

        field.apply_filter(&ids(&[20, 40]), true);
        assert_eq!(field.alphas().as_ref(), &alphas);
        assert_eq!(field.sizes().as_ref(), &sizes);
        assert_eq!(field.state_texture(), &state);
    }

    #[test]
    fn apply_filter_ignores_unknown_ids() {
        let mut field = built();
        field.apply_filter(&ids(&[10, 12345]), false);
        assert_eq!(field.alphas().as_slice(), &[0.85, 0.03, 0.03, 0.03]);
    }

    #[test]
    fn pin_toggle_restores_state_byte() {
        let mut field = built();
        for entity in entities() {
            let index = field.index_of(entity.id).unwrap();
            let before = field.state_texture().flags(index);
            assert!(field.set_pinned(entity.id, true));
            assert_eq!(field.state_texture().flags(index), before | STATE_FLAG_PINNED);
            assert!(field.set_pinned(entity.id, false));
            assert_eq!(field.state_texture().flags(index), before);
        }
    }

    #[test]
    fn pinning_does_not_touch_base_attributes() {
        let mut field = built();
        field.apply_filter(&ids(&[10]), true);
        let attributes_version = field.versions().attributes;
        let alphas = field.alphas().as_ref().clone();

        field.set_pinned(EntityId(20), true);

        assert_eq!(field.versions().attributes, attributes_version);
        assert_eq!(field.alphas().as_ref(), &alphas);
        // The resolved values follow the pinned policy.
        assert_eq!(field.final_alpha(1), Some(1.0));
        assert_eq!(field.final_size(1), Some(8.0));
        assert_eq!(field.final_alpha(0), Some(0.85));
        assert_eq!(field.final_size(0), Some(7.0));
    }

    #[test]
    fn sync_pinned_diffs_against_previous_set() {
        let mut field = built();
        field.sync_pinned(&pins(&[10, 30]));
        assert!(field.is_pinned(0) && field.is_pinned(2));
        let state_version = field.versions().state;

        // Same set again: nothing to write.
        field.sync_pinned(&pins(&[30, 10]));
        assert_eq!(field.versions().state, state_version);

        field.sync_pinned(&pins(&[30, 40]));
        assert!(!field.is_pinned(0));
        assert!(field.is_pinned(2) && field.is_pinned(3));
        assert!(!field.is_pinned(1));
    }

    #[test]
    fn unknown_pin_is_ignored() {
        let mut field = built();
        let version = field.versions().state;
        assert!(!field.set_pinned(EntityId(777), true));
        assert_eq!(field.versions().state, version);
        field.sync_pins(&pins(&[777]));
        assert_eq!(field.pin_labels().count(), 0);
    }

    #[test]
    fn highlight_ring_follows_entity() {
        let mut field = built();
        assert!(field.set_highlight(Some(EntityId(20))));
        let ring = field.highlight().unwrap();
        assert_eq!(ring.entity, EntityId(20));
        assert_eq!(ring.center, glam::DVec2::new(-5.0, -0.5));
        assert_eq!(ring.inner_radius, 1.8);
        assert_eq!(ring.outer_radius, 2.4);

        // Same entity: no change.
        assert!(!field.set_highlight(Some(EntityId(20))));
        // Stale id: ignored, ring stays.
        assert!(!field.set_highlight(Some(EntityId(555))));
        assert_eq!(field.highlight().unwrap().entity, EntityId(20));

        // Another entity replaces the ring with a single overlay bump.
        let overlays = field.versions().overlays;
        assert!(field.set_highlight(Some(EntityId(10))));
        assert_eq!(field.highlight().unwrap().entity, EntityId(10));
        assert_eq!(field.versions().overlays, overlays + 1);

        assert!(field.set_highlight(None));
        assert!(field.highlight().is_none());
    }

    #[test]
    fn pin_labels_track_pinned_set() {
        let mut field = built();
        field.sync_pins(&pins(&[40, 10]));
        let labels: Vec<_> = field.pin_labels().collect();
        assert_eq!(labels.len(), 2);
        assert_eq!(labels[0].entity, EntityId(40));
        assert!(labels[0].text.ends_with("..."));
        assert_eq!(labels[0].text.chars().count(), 38);
        assert_eq!(labels[1].text, "Systolic blood pressure");
        assert_eq!(labels[1].anchor, glam::DVec2::new(1.0, -2.0));

        field.sync_pins(&pins(&[10]));
        let labels: Vec<_> = field.pin_labels().map(|l| l.entity).collect();
        assert_eq!(labels, [EntityId(10)]);
    }

    #[test]
    fn duplicate_ids_map_to_last_index() {
        let mut field = PointField::default();
        field.build(vec![
            Entity::new(1, "first", "NLM", 2020, 0.0, 0.0),
            Entity::new(1, "second", "NLM", 2020, 1.0, 1.0),
        ]);
        assert_eq!(field.index_of(EntityId(1)), Some(1));
        assert_eq!(field.entity_by_id(EntityId(1)).unwrap().name, "second");
    }

    #[test]
    fn state_texture_wraps_rows() {
        assert_eq!(PointStateTexture::dimensions_for(0), (1, 1));
        assert_eq!(PointStateTexture::dimensions_for(10), (10, 1));
        assert_eq!(PointStateTexture::dimensions_for(4096), (4096, 1));
        assert_eq!(PointStateTexture::dimensions_for(4097), (4096, 2));
        assert_eq!(PointStateTexture::dimensions_for(50_000), (4096, 13));

        let mut texture = PointStateTexture::new(5000);
        assert_eq!(texture.texel_of(4100), (4, 1));
        assert!(texture.set_flag(4100, STATE_FLAG_PINNED, true));
        assert_eq!(texture.row(1).unwrap()[4 * 4], STATE_FLAG_PINNED);
        assert!(!texture.set_flag(4100, STATE_FLAG_PINNED, true));
        assert!(!texture.set_flag(1_000_000, STATE_FLAG_PINNED, true));
    }

    #[test]
    fn flag_change_touches_only_its_row() {
        let mut texture = PointStateTexture::new(10_000);
        assert_eq!(texture.row_versions(), &[0, 0, 0]);
        // A frame still holding the previous rows.
        let snapshot = texture.clone();

        assert!(texture.set_flag(4100, STATE_FLAG_PINNED, true));
        assert_eq!(texture.row_versions(), &[0, 1, 0]);
        assert!(Arc::ptr_eq(&texture.shared_rows()[0], &snapshot.shared_rows()[0]));
        assert!(!Arc::ptr_eq(&texture.shared_rows()[1], &snapshot.shared_rows()[1]));
        assert!(Arc::ptr_eq(&texture.shared_rows()[2], &snapshot.shared_rows()[2]));
        assert_eq!(snapshot.flags(4100), 0);

        // Unchanged bytes leave the row version alone.
        assert!(!texture.set_flag(4100, STATE_FLAG_PINNED, true));
        assert!(texture.set_flag(4100, STATE_FLAG_PINNED, false));
        assert_eq!(texture.row_versions(), &[0, 2, 0]);
    }
}

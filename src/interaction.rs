//! Filters, selection, pins and view triggers shared between the app and the
//! atlas widget.
//!
//! Every mutation bumps a version counter. The atlas compares those counters
//! against the values it last applied and recomputes only what changed.
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use iced::Point;
use indexmap::{IndexMap, IndexSet};

use crate::config::AtlasConfig;
use crate::entity::{Entity, EntityId};
use crate::viewport::ZoomDirection;

/// Version counters of [`InteractionState`], one per observable concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InteractionVersions {
    pub data: u64,
    /// Filtered-id set or search-active flag.
    pub filter: u64,
    /// Selection list.
    pub selection: u64,
    /// Pinned-id set.
    pub pins: u64,
    /// Hover target or search highlight.
    pub highlight: u64,
    /// Focus requests.
    pub focus: u64,
    /// Reset requests.
    pub reset: u64,
    /// Zoom step requests.
    pub zoom_step: u64,
}

/// A pending request to ease the camera onto an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FocusRequest {
    pub id: u64,
    pub entity: EntityId,
}

/// A pending request to step the zoom in or out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoomStepRequest {
    pub id: u64,
    pub direction: ZoomDirection,
}

#[derive(Debug, Clone, PartialEq)]
struct ActiveSearch {
    query: String,
    ids: HashSet<EntityId>,
}

/// Application-level interaction state for one atlas.
#[derive(Debug, Clone)]
pub struct InteractionState {
    entities: Arc<[Entity]>,
    known_ids: HashMap<EntityId, usize>,

    year_bounds: (i32, i32),
    year_range: (i32, i32),
    hidden_orgs: HashSet<String>,
    search: Option<ActiveSearch>,
    filtered: HashSet<EntityId>,

    selection: Vec<EntityId>,
    pinned: IndexSet<EntityId>,
    hovered: Option<EntityId>,
    /// Widget-local pointer position over the hovered entity.
    hover_position: Option<Point>,
    search_highlight: Option<EntityId>,
    focus: Option<FocusRequest>,
    zoom_step: Option<ZoomStepRequest>,
    request_counter: u64,

    org_counts: IndexMap<String, usize>,
    year_histogram: BTreeMap<i32, usize>,

    versions: InteractionVersions,
}

impl Default for InteractionState {
    fn default() -> Self {
        Self::new(&AtlasConfig::default())
    }
}

impl InteractionState {
    pub fn new(config: &AtlasConfig) -> Self {
        let year_bounds = (
            config.year_min.min(config.year_max),
            config.year_min.max(config.year_max),
        );
        Self {
            entities: Arc::new([]),
            known_ids: HashMap::new(),
            year_bounds,
            year_range: year_bounds,
            hidden_orgs: HashSet::new(),
            search: None,
            filtered: HashSet::new(),
            selection: Vec::new(),
            pinned: IndexSet::new(),
            hovered: None,
            hover_position: None,
            search_highlight: None,
            focus: None,
            zoom_step: None,
            request_counter: 0,
            org_counts: IndexMap::new(),
            year_histogram: empty_histogram(year_bounds),
            versions: InteractionVersions::default(),
        }
    }

    /// Replace the entity sequence. Selection, pins, hover and search from the
    /// previous data set are dropped; year range and hidden organizations are
    /// kept.
    pub fn load(&mut self, entities: impl Into<Arc<[Entity]>>) {
        self.entities = entities.into();
        self.known_ids = self
            .entities
            .iter()
            .enumerate()
            .map(|(index, entity)| (entity.id, index))
            .collect();

        self.org_counts.clear();
        self.year_histogram = empty_histogram(self.year_bounds);
        for entity in self.entities.iter() {
            *self
                .org_counts
                .entry(entity.organization.clone())
                .or_default() += 1;
            if let Some(count) = self.year_histogram.get_mut(&entity.year) {
                *count += 1;
            }
        }
        self.org_counts.sort_by(|a_org, a, b_org, b| b.cmp(a).then(a_org.cmp(b_org)));

        self.search = None;
        self.selection.clear();
        self.pinned.clear();
        self.hovered = None;
        self.hover_position = None;
        self.search_highlight = None;
        self.focus = None;
        self.zoom_step = None;

        self.versions.data += 1;
        self.versions.selection += 1;
        self.versions.pins += 1;
        self.versions.highlight += 1;
        self.recompute_filter();
        log::debug!(
            "interaction state loaded {} entities from {} organizations",
            self.entities.len(),
            self.org_counts.len()
        );
    }

    pub fn entities(&self) -> &Arc<[Entity]> {
        &self.entities
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.known_ids
            .get(&id)
            .and_then(|&index| self.entities.get(index))
    }

    pub fn versions(&self) -> InteractionVersions {
        self.versions
    }

    // ---- filters ----

    fn recompute_filter(&mut self) {
        let (min, max) = self.year_range;
        let filtered: HashSet<EntityId> = self
            .entities
            .iter()
            .filter(|entity| entity.year >= min && entity.year <= max)
            .filter(|entity| !self.hidden_orgs.contains(&entity.organization))
            .filter(|entity| {
                self.search
                    .as_ref()
                    .is_none_or(|search| search.ids.contains(&entity.id))
            })
            .map(|entity| entity.id)
            .collect();
        self.filtered = filtered;
        self.versions.filter += 1;
    }

    /// Inclusive year range. Bounds given in reverse order are swapped.
    pub fn set_year_range(&mut self, min: i32, max: i32) {
        let range = (min.min(max), min.max(max));
        if range == self.year_range {
            return;
        }
        self.year_range = range;
        self.recompute_filter();
    }

    pub fn year_range(&self) -> (i32, i32) {
        self.year_range
    }

    /// Configured year bounds covered by the histogram.
    pub fn year_bounds(&self) -> (i32, i32) {
        self.year_bounds
    }

    /// Hide a visible organization or show a hidden one.
    pub fn toggle_org(&mut self, organization: &str) {
        if !self.hidden_orgs.remove(organization) {
            self.hidden_orgs.insert(organization.to_string());
        }
        self.recompute_filter();
    }

    pub fn show_all_orgs(&mut self) {
        if self.hidden_orgs.is_empty() {
            return;
        }
        self.hidden_orgs.clear();
        self.recompute_filter();
    }

    pub fn is_org_hidden(&self, organization: &str) -> bool {
        self.hidden_orgs.contains(organization)
    }

    pub fn hidden_orgs(&self) -> &HashSet<String> {
        &self.hidden_orgs
    }

    /// Restrict the filtered set to `ids`, the matches of `query`.
    pub fn set_search_results(&mut self, query: impl Into<String>, ids: HashSet<EntityId>) {
        self.search = Some(ActiveSearch {
            query: query.into(),
            ids,
        });
        self.recompute_filter();
    }

    pub fn clear_search(&mut self) {
        let had_highlight = self.search_highlight.take().is_some();
        if self.search.take().is_some() {
            self.recompute_filter();
        }
        if had_highlight {
            self.versions.highlight += 1;
        }
    }

    pub fn has_active_search(&self) -> bool {
        self.search.is_some()
    }

    pub fn search_query(&self) -> Option<&str> {
        self.search.as_ref().map(|search| search.query.as_str())
    }

    pub fn search_ids(&self) -> Option<&HashSet<EntityId>> {
        self.search.as_ref().map(|search| &search.ids)
    }

    /// Ids passing the year, organization and search filters.
    pub fn filtered_ids(&self) -> &HashSet<EntityId> {
        &self.filtered
    }

    pub fn is_filtered_in(&self, id: EntityId) -> bool {
        self.filtered.contains(&id)
    }

    // ---- selection and pins ----

    /// Append `id` to the selection (once), pin it and request focus on it.
    ///
    /// Unknown ids are ignored. Returns whether the selection changed.
    pub fn select(&mut self, id: EntityId) -> bool {
        if !self.known_ids.contains_key(&id) {
            return false;
        }
        let added = !self.selection.contains(&id);
        if added {
            self.selection.push(id);
            self.versions.selection += 1;
        }
        self.pin(id);
        self.request_focus(id);
        added
    }

    /// Remove `id` from the selection and unpin it.
    pub fn deselect(&mut self, id: EntityId) -> bool {
        let Some(position) = self.selection.iter().position(|&selected| selected == id) else {
            return false;
        };
        self.selection.remove(position);
        self.versions.selection += 1;
        self.unpin(id);
        true
    }

    /// Empty the selection and every pin.
    pub fn clear_selection(&mut self) {
        if !self.selection.is_empty() {
            self.selection.clear();
            self.versions.selection += 1;
        }
        if !self.pinned.is_empty() {
            self.pinned.clear();
            self.versions.pins += 1;
        }
    }

    pub fn selection(&self) -> &[EntityId] {
        &self.selection
    }

    pub fn is_selected(&self, id: EntityId) -> bool {
        self.selection.contains(&id)
    }

    pub fn pin(&mut self, id: EntityId) -> bool {
        if !self.known_ids.contains_key(&id) || !self.pinned.insert(id) {
            return false;
        }
        self.versions.pins += 1;
        true
    }

    pub fn unpin(&mut self, id: EntityId) -> bool {
        if !self.pinned.shift_remove(&id) {
            return false;
        }
        self.versions.pins += 1;
        true
    }

    /// Flip the pin of `id`. Returns whether it is pinned afterwards.
    pub fn toggle_pin(&mut self, id: EntityId) -> bool {
        if self.pinned.contains(&id) {
            self.unpin(id);
            false
        } else {
            self.pin(id)
        }
    }

    /// Pinned ids in pin order.
    pub fn pinned(&self) -> &IndexSet<EntityId> {
        &self.pinned
    }

    pub fn is_pinned(&self, id: EntityId) -> bool {
        self.pinned.contains(&id)
    }

    // ---- hover and highlight ----

    pub fn set_hovered(&mut self, id: Option<EntityId>) -> bool {
        if self.hovered == id {
            return false;
        }
        self.hovered = id;
        if id.is_none() {
            self.hover_position = None;
        }
        self.versions.highlight += 1;
        true
    }

    pub fn hovered(&self) -> Option<EntityId> {
        self.hovered
    }

    /// Record where the pointer is over the hovered entity, in widget-local
    /// logical pixels. Ignored while nothing is hovered.
    pub fn set_hover_position(&mut self, position: Point) -> bool {
        if self.hovered.is_none() || self.hover_position == Some(position) {
            return false;
        }
        self.hover_position = Some(position);
        true
    }

    /// Pointer position of the current hover, for placing a tooltip.
    pub fn hover_position(&self) -> Option<Point> {
        self.hover_position
    }

    /// Highlight a search candidate (e.g. the suggestion under the keyboard
    /// cursor) without hovering it.
    pub fn set_search_highlight(&mut self, id: Option<EntityId>) -> bool {
        if self.search_highlight == id {
            return false;
        }
        self.search_highlight = id;
        self.versions.highlight += 1;
        true
    }

    /// Entity the hover ring is drawn around. The pointer hover takes
    /// precedence over the search highlight.
    pub fn highlight_target(&self) -> Option<EntityId> {
        self.hovered.or(self.search_highlight)
    }

    // ---- view triggers ----

    fn next_request_id(&mut self) -> u64 {
        self.request_counter += 1;
        self.request_counter
    }

    /// Ask the viewport to ease onto `entity`. Replaces any pending request.
    pub fn request_focus(&mut self, entity: EntityId) -> u64 {
        let id = self.next_request_id();
        self.focus = Some(FocusRequest { id, entity });
        self.versions.focus += 1;
        id
    }

    pub fn focus_request(&self) -> Option<FocusRequest> {
        self.focus
    }

    /// Clear the focus request `id` once the viewport has finished it. Older
    /// ids are ignored so a newer pending request survives.
    pub fn acknowledge_focus(&mut self, id: u64) -> bool {
        if self.focus.is_some_and(|focus| focus.id == id) {
            self.focus = None;
            return true;
        }
        false
    }

    /// Ask the viewport to ease back to the default view.
    pub fn request_reset(&mut self) {
        self.versions.reset += 1;
    }

    /// Number of reset requests so far.
    pub fn reset_counter(&self) -> u64 {
        self.versions.reset
    }

    pub fn request_zoom_step(&mut self, direction: ZoomDirection) -> u64 {
        let id = self.next_request_id();
        self.zoom_step = Some(ZoomStepRequest { id, direction });
        self.versions.zoom_step += 1;
        id
    }

    pub fn zoom_step_request(&self) -> Option<ZoomStepRequest> {
        self.zoom_step
    }

    pub fn acknowledge_zoom_step(&mut self, id: u64) -> bool {
        if self.zoom_step.is_some_and(|step| step.id == id) {
            self.zoom_step = None;
            return true;
        }
        false
    }

    // ---- statistics ----

    /// Entities per organization over the unfiltered data, most frequent first.
    pub fn org_counts(&self) -> &IndexMap<String, usize> {
        &self.org_counts
    }

    /// Entities per year over the unfiltered data, covering the configured
    /// year bounds. Years outside the bounds are not counted.
    pub fn year_histogram(&self) -> &BTreeMap<i32, usize> {
        &self.year_histogram
    }
}

fn empty_histogram((min, max): (i32, i32)) -> BTreeMap<i32, usize> {
    (min..=max).map(|year| (year, 0)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<Entity> {
        vec![
            Entity::new(1, "Heart rate", "NHLBI", 2016, 0.0, 0.0),
            Entity::new(2, "Seizure type", "NINDS", 2019, 1.0, 1.0),
            Entity::new(3, "Seizure onset", "NINDS", 2022, 2.0, 2.0),
            Entity::new(4, "Old element", "NCI", 2009, 3.0, 3.0),
        ]
    }

    fn loaded() -> InteractionState {
        let mut state = InteractionState::default();
        state.load(sample());
        state
    }

    fn ids(values: &[u32]) -> HashSet<EntityId> {
        values.iter().copied().map(EntityId).collect()
    }

    #[test]
    fn filter_is_intersection_of_year_org_and_search() {
        let mut state = loaded();
        // Year 2009 falls outside the default 2015..=2024 range.
        assert_eq!(state.filtered_ids(), &ids(&[1, 2, 3]));

        state.set_year_range(2018, 2024);
        assert_eq!(state.filtered_ids(), &ids(&[2, 3]));

        state.toggle_org("NINDS");
        assert!(state.filtered_ids().is_empty());
        state.toggle_org("NINDS");
        assert_eq!(state.filtered_ids(), &ids(&[2, 3]));

        state.set_search_results("onset", ids(&[3, 1]));
        assert!(state.has_active_search());
        assert_eq!(state.filtered_ids(), &ids(&[3]));

        state.clear_search();
        assert_eq!(state.filtered_ids(), &ids(&[2, 3]));
    }

    #[test]
    fn year_range_accepts_reversed_bounds() {
        let mut state = loaded();
        state.set_year_range(2020, 2015);
        assert_eq!(state.year_range(), (2015, 2020));
        assert_eq!(state.filtered_ids(), &ids(&[1, 2]));
    }

    #[test]
    fn filter_version_bumps_on_change_only() {
        let mut state = loaded();
        let version = state.versions().filter;
        state.set_year_range(2015, 2024);
        assert_eq!(state.versions().filter, version);
        state.show_all_orgs();
        assert_eq!(state.versions().filter, version);
        state.toggle_org("NCI");
        assert!(state.versions().filter > version);
    }

    #[test]
    fn statistics_cover_unfiltered_data() {
        let mut state = loaded();
        state.toggle_org("NINDS");
        assert_eq!(state.org_counts().get("NINDS"), Some(&2));
        assert_eq!(state.org_counts().first(), Some((&"NINDS".to_string(), &2)));
        assert_eq!(state.year_histogram().len(), 10);
        assert_eq!(state.year_histogram()[&2016], 1);
        assert_eq!(state.year_histogram()[&2020], 0);
        assert!(!state.year_histogram().contains_key(&2009));
    }

    #[test]
    fn select_appends_once_pins_and_focuses() {
        let mut state = loaded();
        assert!(state.select(EntityId(2)));
        assert!(!state.select(EntityId(2)));
        assert!(state.select(EntityId(1)));

        assert_eq!(state.selection(), &[EntityId(2), EntityId(1)]);
        assert!(state.is_pinned(EntityId(2)) && state.is_pinned(EntityId(1)));
        assert_eq!(state.focus_request().unwrap().entity, EntityId(1));
    }

    #[test]
    fn select_ignores_unknown_ids() {
        let mut state = loaded();
        assert!(!state.select(EntityId(99)));
        assert!(state.selection().is_empty());
        assert!(state.pinned().is_empty());
        assert!(state.focus_request().is_none());
    }

    #[test]
    fn deselect_and_clear_unpin() {
        let mut state = loaded();
        state.select(EntityId(1));
        state.select(EntityId(3));
        assert!(state.deselect(EntityId(1)));
        assert!(!state.is_pinned(EntityId(1)));
        assert!(!state.deselect(EntityId(1)));

        state.clear_selection();
        assert!(state.selection().is_empty());
        assert!(state.pinned().is_empty());
    }

    #[test]
    fn toggle_pin_is_symmetric() {
        let mut state = loaded();
        assert!(state.toggle_pin(EntityId(4)));
        assert!(state.is_pinned(EntityId(4)));
        assert!(!state.toggle_pin(EntityId(4)));
        assert!(state.pinned().is_empty());
    }

    #[test]
    fn hover_takes_precedence_over_search_highlight() {
        let mut state = loaded();
        state.set_search_highlight(Some(EntityId(3)));
        assert_eq!(state.highlight_target(), Some(EntityId(3)));
        state.set_hovered(Some(EntityId(1)));
        assert_eq!(state.highlight_target(), Some(EntityId(1)));
        state.set_hovered(None);
        assert_eq!(state.highlight_target(), Some(EntityId(3)));
        state.clear_search();
        assert_eq!(state.highlight_target(), None);
    }

    #[test]
    fn acknowledging_a_stale_focus_keeps_the_newer_one() {
        let mut state = loaded();
        let first = state.request_focus(EntityId(1));
        let second = state.request_focus(EntityId(2));
        assert!(!state.acknowledge_focus(first));
        assert_eq!(state.focus_request().unwrap().entity, EntityId(2));
        assert!(state.acknowledge_focus(second));
        assert!(state.focus_request().is_none());
    }

    #[test]
    fn hover_position_follows_the_hover() {
        let mut state = loaded();
        assert!(!state.set_hover_position(Point::new(4.0, 5.0)));
        assert_eq!(state.hover_position(), None);

        state.set_hovered(Some(EntityId(2)));
        assert!(state.set_hover_position(Point::new(4.0, 5.0)));
        assert!(!state.set_hover_position(Point::new(4.0, 5.0)));
        // Moving to another entity keeps the last position until the next report.
        state.set_hovered(Some(EntityId(3)));
        assert_eq!(state.hover_position(), Some(Point::new(4.0, 5.0)));

        state.set_hovered(None);
        assert_eq!(state.hover_position(), None);

        state.set_hovered(Some(EntityId(1)));
        state.set_hover_position(Point::new(1.0, 1.0));
        state.load(sample());
        assert_eq!(state.hover_position(), None);
    }

    #[test]
    fn zoom_step_and_reset_triggers() {
        let mut state = loaded();
        let reset = state.reset_counter();
        state.request_reset();
        assert_eq!(state.reset_counter(), reset + 1);

        let id = state.request_zoom_step(ZoomDirection::Out);
        assert_eq!(state.zoom_step_request().unwrap().direction, ZoomDirection::Out);
        assert!(state.acknowledge_zoom_step(id));
        assert!(state.zoom_step_request().is_none());
    }

    #[test]
    fn reload_drops_previous_selection() {
        let mut state = loaded();
        state.select(EntityId(1));
        state.set_search_results("heart", ids(&[1]));
        state.load(vec![Entity::new(10, "New", "NLM", 2020, 0.0, 0.0)]);
        assert!(state.selection().is_empty());
        assert!(state.pinned().is_empty());
        assert!(!state.has_active_search());
        assert_eq!(state.filtered_ids(), &ids(&[10]));
    }
}

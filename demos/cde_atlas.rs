//! Explore a CDE atlas loaded from a TSV file, or synthetic clusters when no
//! file is given.
//!
//! ```sh
//! cargo run --example cde_atlas -- path/to/cde_embedding.tsv
//! ```
use cde_atlas::{
    AtlasConfig, AtlasMessage, CdeAtlas, Entity, EntityId, SearchResults, ZoomDirection, load_tsv,
};
use iced::widget::{Column, button, column, container, mouse_area, row, scrollable, text, text_input};
use iced::{Element, Length};

use rand_distr::{Distribution, Normal};

fn main() -> iced::Result {
    env_logger::init();
    iced::application(App::new, App::update, App::view).run()
}

#[derive(Debug, Clone)]
enum Message {
    Atlas(AtlasMessage),
    Query(String),
    HighlightSuggestion(Option<EntityId>),
    Select(EntityId),
    Deselect(EntityId),
    ClearSelection,
    ToggleOrg(String),
    ShiftYears { min: i32, max: i32 },
    ResetView,
    Zoom(ZoomDirection),
}

struct App {
    atlas: CdeAtlas,
    query: String,
    results: Option<SearchResults>,
}

impl App {
    fn new() -> Self {
        let entities = match std::env::args().nth(1) {
            Some(path) => load_tsv(&path).unwrap_or_else(|err| {
                log::error!("{err}; falling back to synthetic data");
                synthetic_entities()
            }),
            None => synthetic_entities(),
        };
        log::info!("showing {} entities", entities.len());

        Self {
            atlas: CdeAtlas::new().with_entities(entities),
            query: String::new(),
            results: None,
        }
    }

    fn update(&mut self, message: Message) {
        match message {
            Message::Atlas(msg) => self.atlas.update(msg),
            Message::Query(query) => {
                self.results = self.atlas.search(&query);
                self.query = query;
            }
            Message::HighlightSuggestion(id) => {
                self.atlas
                    .with_interaction(|interaction| interaction.set_search_highlight(id));
            }
            Message::Select(id) => {
                self.atlas.select(id);
            }
            Message::Deselect(id) => {
                self.atlas.deselect(id);
            }
            Message::ClearSelection => self.atlas.clear_selection(),
            Message::ToggleOrg(org) => {
                self.atlas
                    .with_interaction(|interaction| interaction.toggle_org(&org));
            }
            Message::ShiftYears { min, max } => {
                self.atlas
                    .with_interaction(|interaction| interaction.set_year_range(min, max));
            }
            Message::ResetView => self.atlas.reset_view(),
            Message::Zoom(direction) => {
                self.atlas.zoom_step(direction);
            }
        }
    }

    fn view(&self) -> Element<'_, Message> {
        let sidebar = column![
            text_input("Search data elements...", &self.query).on_input(Message::Query),
            self.view_suggestions(),
            self.view_selection(),
            self.view_years(),
            self.view_orgs(),
        ]
        .spacing(12)
        .padding(10)
        .width(320);

        let controls = row![
            button(text("+")).on_press(Message::Zoom(ZoomDirection::In)),
            button(text("-")).on_press(Message::Zoom(ZoomDirection::Out)),
            button(text("Reset")).on_press(Message::ResetView),
        ]
        .spacing(4);

        let atlas = column![
            controls,
            container(self.atlas.view().map(Message::Atlas))
                .width(Length::Fill)
                .height(Length::Fill),
        ]
        .spacing(6)
        .padding(6);

        row![scrollable(sidebar), atlas].into()
    }

    fn view_suggestions(&self) -> Element<'_, Message> {
        let Some(results) = &self.results else {
            return column![].into();
        };
        let header = text(format!("{} matches", results.total)).size(12);
        let items = results.preview.iter().map(|suggestion| {
            mouse_area(
                button(text(format!(
                    "{} ({}, {})",
                    suggestion.name, suggestion.organization, suggestion.year
                )))
                .width(Length::Fill)
                .on_press(Message::Select(suggestion.id)),
            )
            .on_enter(Message::HighlightSuggestion(Some(suggestion.id)))
            .on_exit(Message::HighlightSuggestion(None))
            .into()
        });
        column![header, Column::with_children(items).spacing(2)]
            .spacing(4)
            .into()
    }

    fn view_selection(&self) -> Element<'_, Message> {
        let interaction = self.atlas.interaction();
        if interaction.selection().is_empty() {
            return column![].into();
        }
        let items = interaction.selection().iter().filter_map(|&id| {
            let entity = interaction.entity(id)?;
            Some(
                row![
                    text(&entity.name).width(Length::Fill),
                    button(text("x")).on_press(Message::Deselect(id)),
                ]
                .spacing(4)
                .into(),
            )
        });
        column![
            row![
                text(format!("Selected ({})", interaction.selection().len())).width(Length::Fill),
                button(text("Clear")).on_press(Message::ClearSelection),
            ],
            Column::with_children(items).spacing(2),
        ]
        .spacing(4)
        .into()
    }

    fn view_years(&self) -> Element<'_, Message> {
        let interaction = self.atlas.interaction();
        let (min, max) = interaction.year_range();
        let (lower, upper) = interaction.year_bounds();

        let bars = interaction.year_histogram().iter().map(|(year, count)| {
            text(format!("{year}: {count}"))
                .size(11)
                .into()
        });
        column![
            row![
                button(text("<")).on_press(Message::ShiftYears {
                    min: (min - 1).max(lower),
                    max,
                }),
                button(text(">")).on_press(Message::ShiftYears {
                    min: (min + 1).min(max),
                    max,
                }),
                text(format!("{min} - {max}")).width(Length::Fill),
                button(text("<")).on_press(Message::ShiftYears {
                    min,
                    max: (max - 1).max(min),
                }),
                button(text(">")).on_press(Message::ShiftYears {
                    min,
                    max: (max + 1).min(upper),
                }),
            ]
            .spacing(4),
            Column::with_children(bars),
        ]
        .spacing(4)
        .into()
    }

    fn view_orgs(&self) -> Element<'_, Message> {
        let interaction = self.atlas.interaction();
        let items = interaction.org_counts().iter().map(|(org, count)| {
            let mark = if interaction.is_org_hidden(org) {
                "[ ]"
            } else {
                "[x]"
            };
            button(text(format!("{mark} {org} ({count})")).size(12))
                .style(button::text)
                .on_press(Message::ToggleOrg(org.clone()))
                .into()
        });
        Column::with_children(items).into()
    }
}

/// Gaussian clusters, one per organization, spread over the configured years.
fn synthetic_entities() -> Vec<Entity> {
    const PER_ORG: usize = 4_000;
    let config = AtlasConfig::default();
    let orgs: Vec<&str> = config.palette.organizations().take(8).collect();

    let mut rng = rand::rng();
    let spread = Normal::new(0.0f64, 6.0f64).unwrap();
    let years = (config.year_max - config.year_min + 1) as usize;

    let mut entities = Vec::with_capacity(orgs.len() * PER_ORG);
    for (cluster, org) in orgs.iter().enumerate() {
        let angle = cluster as f64 / orgs.len() as f64 * std::f64::consts::TAU;
        let center = [angle.cos() * 60.0, angle.sin() * 60.0];
        for i in 0..PER_ORG {
            let id = entities.len() as u32 + 1;
            let year = config.year_min + ((i * 7 + cluster) % years) as i32;
            entities.push(
                Entity::new(
                    id,
                    format!("{org} element {i}"),
                    *org,
                    year,
                    center[0] + spread.sample(&mut rng),
                    center[1] + spread.sample(&mut rng),
                )
                .with_description(format!("Synthetic data element {i} of cluster {cluster}")),
            );
        }
    }
    entities
}

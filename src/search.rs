//! Small in-memory full-text index over entity names and descriptions.
//!
//! Query terms are matched exactly, as prefixes and with a bounded edit
//! distance. A document matching any term is a result; scores add up across
//! terms and fields.
use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::entity::{Entity, EntityId};

const EXACT_WEIGHT: f64 = 1.0;
const PREFIX_WEIGHT: f64 = 0.375;
const FUZZY_WEIGHT: f64 = 0.45;
const MAX_FUZZY_DISTANCE: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Field {
    Name,
    Description,
}

/// Tuning of [`SearchIndex`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchOptions {
    /// Score multiplier of name matches. Description matches weigh 1.
    pub name_boost: f64,
    /// Match index terms starting with a query term.
    pub prefix: bool,
    /// Allowed edit distance as a fraction of the query term length.
    /// Zero disables fuzzy matching.
    pub fuzzy: f64,
    /// Trimmed queries shorter than this (in characters) clear the search.
    pub min_query_chars: usize,
    /// Number of ranked suggestions kept in [`SearchResults::preview`].
    pub max_preview: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            name_boost: 3.0,
            prefix: true,
            fuzzy: 0.2,
            min_query_chars: 2,
            max_preview: 20,
        }
    }
}

/// One ranked suggestion.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchSuggestion {
    pub id: EntityId,
    pub name: String,
    pub organization: String,
    pub year: i32,
    pub score: f64,
}

/// Matches of one query.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResults {
    /// Trimmed query.
    pub query: String,
    /// Every matching id.
    pub ids: HashSet<EntityId>,
    /// Best matches, highest score first.
    pub preview: Vec<SearchSuggestion>,
    /// Number of matches, equal to `ids.len()`.
    pub total: usize,
}

#[derive(Debug, Clone, Copy)]
struct Posting {
    doc: u32,
    field: Field,
    frequency: u32,
}

#[derive(Debug, Clone)]
struct Document {
    id: EntityId,
    name: String,
    organization: String,
    year: i32,
}

/// Inverted index of entity names and descriptions.
#[derive(Debug, Clone, Default)]
pub struct SearchIndex {
    options: SearchOptions,
    documents: Vec<Document>,
    terms: BTreeMap<String, Vec<Posting>>,
}

impl SearchIndex {
    pub fn new(options: SearchOptions) -> Self {
        Self {
            options,
            documents: Vec::new(),
            terms: BTreeMap::new(),
        }
    }

    /// Index `entities` with default options.
    pub fn from_entities<'a>(entities: impl IntoIterator<Item = &'a Entity>) -> Self {
        let mut index = Self::default();
        index.add_all(entities);
        index
    }

    pub fn options(&self) -> &SearchOptions {
        &self.options
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn add_all<'a>(&mut self, entities: impl IntoIterator<Item = &'a Entity>) {
        for entity in entities {
            self.add(entity);
        }
        log::debug!(
            "search index holds {} documents and {} terms",
            self.documents.len(),
            self.terms.len()
        );
    }

    fn add(&mut self, entity: &Entity) {
        let doc = self.documents.len() as u32;
        self.documents.push(Document {
            id: entity.id,
            name: entity.name.clone(),
            organization: entity.organization.clone(),
            year: entity.year,
        });
        for (field, text) in [
            (Field::Name, &entity.name),
            (Field::Description, &entity.description),
        ] {
            let mut frequencies: HashMap<String, u32> = HashMap::new();
            for token in tokenize(text) {
                *frequencies.entry(token).or_default() += 1;
            }
            for (term, frequency) in frequencies {
                self.terms.entry(term).or_default().push(Posting {
                    doc,
                    field,
                    frequency,
                });
            }
        }
    }

    /// Run `query`. Returns `None` when the trimmed query is too short, which
    /// callers treat as "no active search".
    pub fn search(&self, query: &str) -> Option<SearchResults> {
        let query = query.trim();
        if query.chars().count() < self.options.min_query_chars {
            return None;
        }

        let mut scores: HashMap<u32, f64> = HashMap::new();
        for query_term in tokenize(query) {
            for (term, weight) in self.expand(&query_term) {
                let Some(postings) = self.terms.get(term) else {
                    continue;
                };
                let idf = self.inverse_document_frequency(postings);
                for posting in postings {
                    let boost = match posting.field {
                        Field::Name => self.options.name_boost,
                        Field::Description => 1.0,
                    };
                    let tf = (posting.frequency as f64).sqrt();
                    *scores.entry(posting.doc).or_default() += weight * boost * idf * tf;
                }
            }
        }

        let mut ranked: Vec<(u32, f64)> = scores.into_iter().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

        let ids: HashSet<EntityId> = ranked
            .iter()
            .map(|&(doc, _)| self.documents[doc as usize].id)
            .collect();
        let preview = ranked
            .iter()
            .take(self.options.max_preview)
            .map(|&(doc, score)| {
                let document = &self.documents[doc as usize];
                SearchSuggestion {
                    id: document.id,
                    name: document.name.clone(),
                    organization: document.organization.clone(),
                    year: document.year,
                    score,
                }
            })
            .collect();

        log::trace!("search {query:?}: {} matches", ids.len());
        Some(SearchResults {
            query: query.to_string(),
            total: ids.len(),
            ids,
            preview,
        })
    }

    fn inverse_document_frequency(&self, postings: &[Posting]) -> f64 {
        let docs: HashSet<u32> = postings.iter().map(|p| p.doc).collect();
        (1.0 + self.documents.len() as f64 / docs.len().max(1) as f64).ln()
    }

    /// Index terms matched by one query term, with their match weight. Each
    /// index term appears once with its best weight.
    fn expand<'a>(&'a self, query_term: &str) -> Vec<(&'a str, f64)> {
        let mut matches: HashMap<&'a str, f64> = HashMap::new();
        let mut offer = |term: &'a str, weight: f64| {
            let best = matches.entry(term).or_insert(0.0);
            *best = best.max(weight);
        };

        if let Some((term, _)) = self.terms.get_key_value(query_term) {
            offer(term.as_str(), EXACT_WEIGHT);
        }

        if self.options.prefix {
            let query_len = query_term.chars().count() as f64;
            for (term, _) in self
                .terms
                .range::<str, _>((std::ops::Bound::Excluded(query_term), std::ops::Bound::Unbounded))
                .take_while(|(term, _)| term.starts_with(query_term))
            {
                let term_len = term.chars().count() as f64;
                offer(term.as_str(), PREFIX_WEIGHT * query_len / term_len);
            }
        }

        let max_distance =
            ((query_term.chars().count() as f64 * self.options.fuzzy).round() as usize)
                .min(MAX_FUZZY_DISTANCE);
        if max_distance > 0 {
            for term in self.terms.keys() {
                if let Some(distance) = fuzzy_distance(query_term, term, max_distance)
                    && distance > 0
                {
                    let query_len = query_term.chars().count() as f64;
                    offer(term.as_str(), FUZZY_WEIGHT * query_len / (query_len + distance as f64));
                }
            }
        }

        matches.into_iter().collect()
    }
}

/// Lowercased alphanumeric tokens of `text`.
fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
}

/// Edit distance between `a` and `b`, or `None` when it exceeds `max`.
fn fuzzy_distance(a: &str, b: &str, max: usize) -> Option<usize> {
    // Length difference is a lower bound of the distance.
    if a.chars().count().abs_diff(b.chars().count()) > max {
        return None;
    }
    let distance = strsim::levenshtein(a, b);
    (distance <= max).then_some(distance)
}

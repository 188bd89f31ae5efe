//! Tab-separated entity loader.
//!
//! Expected columns: `tinyid, name, year, description, organization, x, y`.
//! The first line is a header. Each entity takes the index of its line in the
//! file as id, so the first data row has id 1.
use std::path::{Path, PathBuf};

use crate::entity::{Entity, EntityId};

/// Number of columns a data row must have.
pub const TSV_COLUMNS: usize = 7;

#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("failed to read dataset {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("dataset has {lines} lines but no valid rows")]
    NoValidRows { lines: usize },
}

/// Outcome of parsing a TSV document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedDataset {
    pub entities: Vec<Entity>,
    /// Non-blank data lines dropped for missing columns or unparsable numbers.
    pub skipped: usize,
}

/// Parse TSV text into entities, dropping malformed rows.
pub fn parse_tsv(text: &str) -> ParsedDataset {
    let mut parsed = ParsedDataset::default();

    for (line_index, line) in text.lines().enumerate().skip(1) {
        if line.trim().is_empty() {
            continue;
        }
        match parse_row(line_index, line) {
            Some(entity) => parsed.entities.push(entity),
            None => {
                parsed.skipped += 1;
                log::trace!("skipping malformed dataset line {line_index}");
            }
        }
    }

    if parsed.skipped > 0 {
        log::warn!("skipped {} malformed dataset rows", parsed.skipped);
    }
    parsed
}

fn parse_row(line_index: usize, line: &str) -> Option<Entity> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() < TSV_COLUMNS {
        return None;
    }

    let year = parse_leading_int(fields[2])?;
    let x = fields[5].trim().parse::<f64>().ok().filter(|v| v.is_finite())?;
    let y = fields[6].trim().parse::<f64>().ok().filter(|v| v.is_finite())?;
    let id = u32::try_from(line_index).ok()?;

    Some(
        Entity::new(EntityId(id), fields[1], fields[4], year, x, y)
            .with_tiny_id(fields[0])
            .with_description(fields[3]),
    )
}

/// Parse a year the way lenient integer parsers do: optional sign followed by
/// leading digits, ignoring anything after them (`"2019.0"` is 2019).
fn parse_leading_int(field: &str) -> Option<i32> {
    let field = field.trim();
    let digits_start = usize::from(field.starts_with(['-', '+']));
    let digits_end = field[digits_start..]
        .find(|c: char| !c.is_ascii_digit())
        .map_or(field.len(), |offset| digits_start + offset);
    if digits_end == digits_start {
        return None;
    }
    field[..digits_end].parse().ok()
}

/// Read and parse a TSV file.
///
/// Fails when the file cannot be read or contains data lines but none of them
/// parse.
pub fn load_tsv(path: impl AsRef<Path>) -> Result<Vec<Entity>, DatasetError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| DatasetError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let parsed = parse_tsv(&text);
    if parsed.entities.is_empty() && parsed.skipped > 0 {
        return Err(DatasetError::NoValidRows {
            lines: text.lines().count(),
        });
    }
    log::debug!(
        "loaded {} entities from {}",
        parsed.entities.len(),
        path.display()
    );
    Ok(parsed.entities)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "tinyid\tname\tyear\tdescription\torganization\tx\ty";

    #[test]
    fn parses_rows_and_uses_line_index_as_id() {
        let text = format!(
            "{HEADER}\n\
             abc\tHeart rate\t2018\tBeats per minute\tNHLBI\t1.5\t-2.25\n\
             def\tSeizure type\t2020\t\tNINDS\t-3\t4\n"
        );
        let parsed = parse_tsv(&text);
        assert_eq!(parsed.skipped, 0);
        assert_eq!(parsed.entities.len(), 2);

        let first = &parsed.entities[0];
        assert_eq!(first.id, EntityId(1));
        assert_eq!(first.tiny_id, "abc");
        assert_eq!(first.name, "Heart rate");
        assert_eq!(first.year, 2018);
        assert_eq!(first.description, "Beats per minute");
        assert_eq!(first.organization, "NHLBI");
        assert_eq!((first.x, first.y), (1.5, -2.25));

        assert_eq!(parsed.entities[1].id, EntityId(2));
        assert_eq!(parsed.entities[1].description, "");
    }

    #[test]
    fn skips_blank_short_and_non_numeric_rows() {
        let text = format!(
            "{HEADER}\n\
             \n\
             a\tshort row\t2019\n\
             b\tbad year\tunknown\td\tNCI\t1\t1\n\
             c\tbad x\t2019\td\tNCI\tNaN\t1\n\
             d\tgood\t2019\td\tNCI\t0\t0\n"
        );
        let parsed = parse_tsv(&text);
        assert_eq!(parsed.skipped, 3);
        assert_eq!(parsed.entities.len(), 1);
        // Blank and skipped lines still consume an id.
        assert_eq!(parsed.entities[0].id, EntityId(5));
    }

    #[test]
    fn header_only_is_empty() {
        assert_eq!(parse_tsv(HEADER), ParsedDataset::default());
        assert_eq!(parse_tsv(""), ParsedDataset::default());
    }

    #[test]
    fn lenient_year_parsing() {
        assert_eq!(parse_leading_int("2019"), Some(2019));
        assert_eq!(parse_leading_int(" 2019.0 "), Some(2019));
        assert_eq!(parse_leading_int("-12abc"), Some(-12));
        assert_eq!(parse_leading_int("abc"), None);
        assert_eq!(parse_leading_int("-"), None);
    }

    #[test]
    fn extra_columns_are_ignored() {
        let text = format!("{HEADER}\nx\tname\t2021\tdesc\tNLM\t1\t2\textra\n");
        let parsed = parse_tsv(&text);
        assert_eq!(parsed.entities.len(), 1);
        assert_eq!(parsed.entities[0].y, 2.0);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = load_tsv("/definitely/not/here.tsv").unwrap_err();
        assert!(matches!(err, DatasetError::Io { .. }));
    }
}

//! Organization color palette.
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::Color;

/// Color used for organizations missing from the palette (`#999999`).
pub const FALLBACK_COLOR: [u8; 3] = [0x99, 0x99, 0x99];

/// Categorical palette mapping organization names to RGB colors.
///
/// Insertion order is kept so that legends can list organizations in the
/// order they were configured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Palette {
    colors: IndexMap<String, [u8; 3]>,
    fallback: [u8; 3],
}

impl Default for Palette {
    fn default() -> Self {
        // Ordered by dataset frequency, most common first.
        const ORGS: [(&str, u32); 19] = [
            ("NINDS", 0x7B68EE),
            ("LOINC", 0x2ECC71),
            ("NHLBI", 0xF39C12),
            ("PROMIS / Neuro-QOL", 0x27AE60),
            ("ADRC", 0xE74C3C),
            ("NLM", 0xE88DA0),
            ("NICHD", 0xC0392B),
            ("RADx-UP", 0x95A5A6),
            ("NEI", 0x6D4C41),
            ("Project 5 (COVID-19)", 0x1565C0),
            ("NCI", 0xAED6F1),
            ("NINR", 0xF8BBD0),
            ("GRDR", 0xCE93D8),
            ("ScHARe", 0x42A5F5),
            ("SBE CCC", 0xFF8A65),
            ("Women's CRN", 0xA1887F),
            ("ONC", 0xB0BEC5),
            ("TEST", 0xCFD8DC),
            ("NIDA", 0xDCE775),
        ];

        let colors = ORGS
            .iter()
            .map(|&(name, hex)| (name.to_string(), rgb_from_hex(hex)))
            .collect();

        Self {
            colors,
            fallback: FALLBACK_COLOR,
        }
    }
}

impl Palette {
    /// Create an empty palette. Every organization maps to the fallback color.
    pub fn empty() -> Self {
        Self {
            colors: IndexMap::new(),
            fallback: FALLBACK_COLOR,
        }
    }

    /// Add or replace the color of an organization.
    pub fn with_color(mut self, organization: impl Into<String>, rgb: [u8; 3]) -> Self {
        self.colors.insert(organization.into(), rgb);
        self
    }

    /// Change the color used for unknown organizations.
    pub fn with_fallback(mut self, rgb: [u8; 3]) -> Self {
        self.fallback = rgb;
        self
    }

    /// RGB bytes for an organization, falling back to neutral gray.
    pub fn rgb(&self, organization: &str) -> [u8; 3] {
        self.colors
            .get(organization)
            .copied()
            .unwrap_or(self.fallback)
    }

    /// Normalized RGB triple in `0.0..=1.0`, ready for upload.
    pub fn rgb_f32(&self, organization: &str) -> [f32; 3] {
        let [r, g, b] = self.rgb(organization);
        [r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0]
    }

    /// Iced color for an organization.
    pub fn color(&self, organization: &str) -> Color {
        let [r, g, b] = self.rgb(organization);
        Color::from_rgb8(r, g, b)
    }

    /// Known organizations in palette order.
    pub fn organizations(&self) -> impl Iterator<Item = &str> {
        self.colors.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }
}

fn rgb_from_hex(hex: u32) -> [u8; 3] {
    [(hex >> 16) as u8, (hex >> 8) as u8, hex as u8]
}

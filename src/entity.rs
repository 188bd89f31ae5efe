use core::fmt;

/// Unique identifier of an entity in the loaded dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub u32);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CDE({})", self.0)
    }
}

impl From<u32> for EntityId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// One plotted item: a common data element with a 2D embedding coordinate.
///
/// Entities are immutable once loaded. The atlas only ever filters or derives
/// from the loaded sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    /// Unique identifier.
    pub id: EntityId,
    /// Short identifier from the source registry (may be empty).
    pub tiny_id: String,
    /// Display name.
    pub name: String,
    /// Owning organization, used for color assignment.
    pub organization: String,
    /// Registration year.
    pub year: i32,
    /// Free-text description.
    pub description: String,
    /// Data-space x coordinate.
    pub x: f64,
    /// Data-space y coordinate.
    pub y: f64,
}

impl Entity {
    pub fn new(
        id: impl Into<EntityId>,
        name: impl Into<String>,
        organization: impl Into<String>,
        year: i32,
        x: f64,
        y: f64,
    ) -> Self {
        Self {
            id: id.into(),
            tiny_id: String::new(),
            name: name.into(),
            organization: organization.into(),
            year,
            description: String::new(),
            x,
            y,
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the registry tiny id.
    pub fn with_tiny_id(mut self, tiny_id: impl Into<String>) -> Self {
        self.tiny_id = tiny_id.into();
        self
    }

    /// Position in render space. The y axis is flipped so the plot matches the
    /// orientation of the source layout.
    pub fn world_position(&self) -> [f64; 2] {
        [self.x, -self.y]
    }
}

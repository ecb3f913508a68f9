// 🏥 Place Model - Public-service locations and category filtering
//
// A place is a value: it is never field-mutated, the whole record is
// replaced on refresh keyed by its id.

use crate::geo::{format_distance, GeoPoint};
use serde::{Deserialize, Serialize};

// ============================================================================
// CATEGORY
// ============================================================================

/// Known place categories. Any other label is carried verbatim as `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Category {
    Hospital,
    Police,
    Library,
    Other(String),
}

impl Category {
    /// Parse a category label. Matching is exact and case-sensitive:
    /// `"hospital"` is an `Other`, not a `Hospital`.
    pub fn from_label(label: &str) -> Self {
        match label {
            "Hospital" => Category::Hospital,
            "Police" => Category::Police,
            "Library" => Category::Library,
            other => Category::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Category::Hospital => "Hospital",
            Category::Police => "Police",
            Category::Library => "Library",
            Category::Other(label) => label.as_str(),
        }
    }
}

/// The toggleable categories, in display order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryKind {
    Hospital,
    Police,
    Library,
}

impl CategoryKind {
    pub const ALL: [CategoryKind; 3] = [CategoryKind::Hospital, CategoryKind::Police, CategoryKind::Library];

    pub fn label(&self) -> &'static str {
        match self {
            CategoryKind::Hospital => "Hospital",
            CategoryKind::Police => "Police",
            CategoryKind::Library => "Library",
        }
    }

    /// Toggle key in the terminal UI
    pub fn key(&self) -> char {
        match self {
            CategoryKind::Hospital => 'h',
            CategoryKind::Police => 'p',
            CategoryKind::Library => 'l',
        }
    }

    pub fn from_key(key: char) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.key() == key)
    }
}

// ============================================================================
// CATEGORY FILTER
// ============================================================================

/// One inclusion toggle per known category.
///
/// Places whose category is not one of the known labels always pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryFilter {
    #[serde(default = "default_true")]
    pub hospitals: bool,

    #[serde(default = "default_true")]
    pub police: bool,

    #[serde(default = "default_true")]
    pub libraries: bool,
}

fn default_true() -> bool {
    true
}

impl Default for CategoryFilter {
    fn default() -> Self {
        CategoryFilter {
            hospitals: true,
            police: true,
            libraries: true,
        }
    }
}

impl CategoryFilter {
    pub fn allows(&self, category: &Category) -> bool {
        match category {
            Category::Hospital => self.hospitals,
            Category::Police => self.police,
            Category::Library => self.libraries,
            Category::Other(_) => true,
        }
    }

    pub fn allows_place(&self, place: &Place) -> bool {
        self.allows(&place.category())
    }

    pub fn is_enabled(&self, kind: CategoryKind) -> bool {
        match kind {
            CategoryKind::Hospital => self.hospitals,
            CategoryKind::Police => self.police,
            CategoryKind::Library => self.libraries,
        }
    }

    pub fn set(&mut self, kind: CategoryKind, enabled: bool) {
        match kind {
            CategoryKind::Hospital => self.hospitals = enabled,
            CategoryKind::Police => self.police = enabled,
            CategoryKind::Library => self.libraries = enabled,
        }
    }

    pub fn toggle(&mut self, kind: CategoryKind) {
        let current = self.is_enabled(kind);
        self.set(kind, !current);
    }

    /// Keep only places this filter allows, preserving order
    pub fn apply(&self, places: &[Place]) -> Vec<Place> {
        places.iter().filter(|p| self.allows_place(p)).cloned().collect()
    }
}

// ============================================================================
// PLACE
// ============================================================================

/// A named, categorized point of interest with fixed coordinates.
///
/// Field names match the JSON record shape served by the place endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub id: i64,
    pub name: String,
    pub category: String,
    pub latitude: f64,
    pub longitude: f64,
    pub address: String,
}

impl Place {
    pub fn new(
        id: i64,
        name: &str,
        category: &str,
        latitude: f64,
        longitude: f64,
        address: &str,
    ) -> Self {
        Place {
            id,
            name: name.to_string(),
            category: category.to_string(),
            latitude,
            longitude,
            address: address.to_string(),
        }
    }

    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }

    pub fn category(&self) -> Category {
        Category::from_label(&self.category)
    }
}

// ============================================================================
// RANKED PLACE
// ============================================================================

/// A place as presented: with its distance from the user, when known.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedPlace {
    pub place: Place,
    pub distance_meters: Option<f64>,
}

impl RankedPlace {
    pub fn unranked(place: Place) -> Self {
        RankedPlace {
            place,
            distance_meters: None,
        }
    }

    pub fn with_distance(place: Place, distance_meters: f64) -> Self {
        RankedPlace {
            place,
            distance_meters: Some(distance_meters),
        }
    }

    /// Formatted distance, or `None` without a user position
    pub fn distance_label(&self) -> Option<String> {
        self.distance_meters.map(format_distance)
    }
}

// ============================================================================
// TESTS
// ============================================================================

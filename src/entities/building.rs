// 🏢 Building Entity - Stable identity + enumerated attributes
//
// "Building name is a VALUE (can change), Building UUID is IDENTITY (never changes)"
//
// The same shape is used for live catalog records and for pending additions.
// A pending addition is keyed by name for matching, a live record by id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// BUILDING TYPE (zone + wealth)
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BuildingType {
    #[serde(rename = "R-$")]
    ResidentialLow,
    #[serde(rename = "R-$$")]
    ResidentialMedium,
    #[serde(rename = "R-$$$")]
    ResidentialHigh,
    #[serde(rename = "CS-$")]
    CommercialServiceLow,
    #[serde(rename = "CS-$$")]
    CommercialServiceMedium,
    #[serde(rename = "CS-$$$")]
    CommercialServiceHigh,
    #[serde(rename = "CO-$$")]
    CommercialOfficeMedium,
    #[serde(rename = "CO-$$$")]
    CommercialOfficeHigh,
    #[serde(rename = "I-AG")]
    Agriculture,
    #[serde(rename = "I-D")]
    DirtyIndustry,
    #[serde(rename = "I-M")]
    Manufacturing,
    #[serde(rename = "I-HT")]
    HighTech,
}

impl BuildingType {
    pub const ALL: [BuildingType; 12] = [
        BuildingType::ResidentialLow,
        BuildingType::ResidentialMedium,
        BuildingType::ResidentialHigh,
        BuildingType::CommercialServiceLow,
        BuildingType::CommercialServiceMedium,
        BuildingType::CommercialServiceHigh,
        BuildingType::CommercialOfficeMedium,
        BuildingType::CommercialOfficeHigh,
        BuildingType::Agriculture,
        BuildingType::DirtyIndustry,
        BuildingType::Manufacturing,
        BuildingType::HighTech,
    ];

    /// Wire code, also the stored value
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildingType::ResidentialLow => "R-$",
            BuildingType::ResidentialMedium => "R-$$",
            BuildingType::ResidentialHigh => "R-$$$",
            BuildingType::CommercialServiceLow => "CS-$",
            BuildingType::CommercialServiceMedium => "CS-$$",
            BuildingType::CommercialServiceHigh => "CS-$$$",
            BuildingType::CommercialOfficeMedium => "CO-$$",
            BuildingType::CommercialOfficeHigh => "CO-$$$",
            BuildingType::Agriculture => "I-AG",
            BuildingType::DirtyIndustry => "I-D",
            BuildingType::Manufacturing => "I-M",
            BuildingType::HighTech => "I-HT",
        }
    }
}

impl FromStr for BuildingType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BuildingType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("Unknown building type: {}", s))
    }
}

impl fmt::Display for BuildingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// TILE (footprint code, width x depth)
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Tile {
    #[serde(rename = "1x1")]
    T1x1,
    #[serde(rename = "1x2")]
    T1x2,
    #[serde(rename = "1x3")]
    T1x3,
    #[serde(rename = "1x4")]
    T1x4,
    #[serde(rename = "2x1")]
    T2x1,
    #[serde(rename = "2x2")]
    T2x2,
    #[serde(rename = "2x3")]
    T2x3,
    #[serde(rename = "2x4")]
    T2x4,
    #[serde(rename = "3x1")]
    T3x1,
    #[serde(rename = "3x2")]
    T3x2,
    #[serde(rename = "3x3")]
    T3x3,
    #[serde(rename = "3x4")]
    T3x4,
    #[serde(rename = "4x1")]
    T4x1,
    #[serde(rename = "4x2")]
    T4x2,
    #[serde(rename = "4x3")]
    T4x3,
    #[serde(rename = "4x4")]
    T4x4,
}

impl Tile {
    pub const ALL: [Tile; 16] = [
        Tile::T1x1, Tile::T1x2, Tile::T1x3, Tile::T1x4,
        Tile::T2x1, Tile::T2x2, Tile::T2x3, Tile::T2x4,
        Tile::T3x1, Tile::T3x2, Tile::T3x3, Tile::T3x4,
        Tile::T4x1, Tile::T4x2, Tile::T4x3, Tile::T4x4,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tile::T1x1 => "1x1",
            Tile::T1x2 => "1x2",
            Tile::T1x3 => "1x3",
            Tile::T1x4 => "1x4",
            Tile::T2x1 => "2x1",
            Tile::T2x2 => "2x2",
            Tile::T2x3 => "2x3",
            Tile::T2x4 => "2x4",
            Tile::T3x1 => "3x1",
            Tile::T3x2 => "3x2",
            Tile::T3x3 => "3x3",
            Tile::T3x4 => "3x4",
            Tile::T4x1 => "4x1",
            Tile::T4x2 => "4x2",
            Tile::T4x3 => "4x3",
            Tile::T4x4 => "4x4",
        }
    }
}

impl FromStr for Tile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tile::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("Unknown tile: {}", s))
    }
}

// ============================================================================
// STYLE (architectural era)
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Style {
    #[serde(rename = "None")]
    Unstyled,
    #[serde(rename = "1890 Chicago")]
    Chicago1890,
    #[serde(rename = "1940 New York")]
    NewYork1940,
    #[serde(rename = "1990 Houston")]
    Houston1990,
    #[serde(rename = "Euro Contemporary")]
    EuroContemporary,
}

impl Style {
    pub const ALL: [Style; 5] = [
        Style::Unstyled,
        Style::Chicago1890,
        Style::NewYork1940,
        Style::Houston1990,
        Style::EuroContemporary,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Style::Unstyled => "None",
            Style::Chicago1890 => "1890 Chicago",
            Style::NewYork1940 => "1940 New York",
            Style::Houston1990 => "1990 Houston",
            Style::EuroContemporary => "Euro Contemporary",
        }
    }
}

impl FromStr for Style {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Style::ALL
            .iter()
            .copied()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| format!("Unknown style: {}", s))
    }
}

// ============================================================================
// BUILDING ENTITY
// ============================================================================

/// Building record - live catalog entry or pending addition
///
/// Identity: `id` (UUID, never changes once assigned)
/// Values: everything else (replaced wholesale on each approved update)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Building {
    pub id: String,
    pub name: String,
    pub occupancy: u16,
    #[serde(rename = "type")]
    pub building_type: BuildingType,
    /// Footprint codes, kept as a set so resubmitted duplicates collapse
    pub tiles: BTreeSet<Tile>,
    pub style: Style,
    #[serde(rename = "lastUpdated")]
    pub last_updated: DateTime<Utc>,
    /// Base64-encoded image, empty string when none was ever uploaded
    #[serde(default)]
    pub image: String,
}

/// Pending additions share the record shape; only the matching key differs.
pub type PendingAddition = Building;

impl Building {
    /// Build a record from validated field values under a fresh identity
    pub fn new(fields: BuildingFields, last_updated: DateTime<Utc>) -> Self {
        Self::with_id(new_building_id(), fields, last_updated)
    }

    /// Build a record under an existing identity
    pub fn with_id(id: String, fields: BuildingFields, last_updated: DateTime<Utc>) -> Self {
        Building {
            id,
            name: fields.name,
            occupancy: fields.occupancy,
            building_type: fields.building_type,
            tiles: fields.tiles,
            style: fields.style,
            last_updated,
            image: String::new(),
        }
    }
}

/// The mutable attributes of a building, as carried by a submission
#[derive(Debug, Clone, PartialEq)]
pub struct BuildingFields {
    pub name: String,
    pub occupancy: u16,
    pub building_type: BuildingType,
    pub tiles: BTreeSet<Tile>,
    pub style: Style,
}

pub fn new_building_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn city_hall() -> BuildingFields {
        BuildingFields {
            name: "City Hall".to_string(),
            occupancy: 500,
            building_type: BuildingType::CommercialOfficeMedium,
            tiles: [Tile::T2x2].into_iter().collect(),
            style: Style::Unstyled,
        }
    }

    #[test]
    fn test_building_creation_assigns_uuid() {
        let building = Building::new(city_hall(), Utc::now());

        assert_eq!(building.id.len(), 36);
        assert!(uuid::Uuid::parse_str(&building.id).is_ok());
        assert_eq!(building.name, "City Hall");
        assert!(building.image.is_empty());
    }

    #[test]
    fn test_wire_codes_round_trip_through_from_str() {
        for t in BuildingType::ALL {
            assert_eq!(t.as_str().parse::<BuildingType>().unwrap(), t);
        }
        for tile in Tile::ALL {
            assert_eq!(tile.as_str().parse::<Tile>().unwrap(), tile);
        }
        for style in Style::ALL {
            assert_eq!(style.as_str().parse::<Style>().unwrap(), style);
        }
        assert!("X-$".parse::<BuildingType>().is_err());
        assert!("5x5".parse::<Tile>().is_err());
        assert!("Art Deco".parse::<Style>().is_err());
    }

    #[test]
    fn test_json_uses_wire_names() {
        let building = Building::with_id(
            "2f1c7a0e-8d3b-4b7e-9a51-0c4d7e2b9f10".to_string(),
            city_hall(),
            Utc::now(),
        );
        let json = serde_json::to_value(&building).unwrap();

        assert_eq!(json["type"], "CO-$$");
        assert_eq!(json["style"], "None");
        assert_eq!(json["tiles"], serde_json::json!(["2x2"]));
        assert!(json.get("lastUpdated").is_some());
    }

    #[test]
    fn test_tiles_collapse_duplicates() {
        let mut fields = city_hall();
        fields.tiles.insert(Tile::T2x2);
        fields.tiles.insert(Tile::T1x1);
        let building = Building::new(fields, Utc::now());

        assert_eq!(building.tiles.len(), 2);
        assert_eq!(building.tiles.iter().next(), Some(&Tile::T1x1));
    }
}

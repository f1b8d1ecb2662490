//! Wire types shared by skyloc services
//!
//! `LocatedImage` is the unit delivered to subscribers. Its JSON shape is
//! consumed by the web client as-is: coordinates stay in the provider's decimal
//! string form and the extraction metadata uses underscore-prefixed keys.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Category tag attached to an extracted text span
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EntityKind {
    /// Geo-political entity (countries, cities, states)
    Gpe,
    /// Facility (buildings, bridges, airports)
    Fac,
    /// Non-GPE location (mountains, bodies of water)
    Loc,
    /// Any other tag; carried through but never geocoded
    Other(String),
}

impl EntityKind {
    pub fn as_str(&self) -> &str {
        match self {
            EntityKind::Gpe => "GPE",
            EntityKind::Fac => "FAC",
            EntityKind::Loc => "LOC",
            EntityKind::Other(tag) => tag,
        }
    }
}

impl From<String> for EntityKind {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "GPE" => EntityKind::Gpe,
            "FAC" => EntityKind::Fac,
            "LOC" => EntityKind::Loc,
            _ => EntityKind::Other(tag),
        }
    }
}

impl From<&str> for EntityKind {
    fn from(tag: &str) -> Self {
        EntityKind::from(tag.to_string())
    }
}

impl From<EntityKind> for String {
    fn from(kind: EntityKind) -> Self {
        match kind {
            EntityKind::Other(tag) => tag,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed, positioned substring produced by entity extraction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextSpan {
    #[serde(rename = "type")]
    pub kind: EntityKind,
    pub text: String,
    pub start_char: usize,
    pub end_char: usize,
}

impl TextSpan {
    pub fn new(kind: impl Into<EntityKind>, text: impl Into<String>, start_char: usize, end_char: usize) -> Self {
        Self {
            kind: kind.into(),
            text: text.into(),
            start_char,
            end_char,
        }
    }
}

/// Place record returned by the geocoding provider (Nominatim jsonv2 shape)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OsmPlace {
    /// "node", "way" or "relation"
    pub osm_type: String,
    pub osm_id: u64,
    pub lat: String,
    pub lon: String,
    #[serde(default)]
    pub category: String,
    #[serde(rename = "type", default)]
    pub place_type: String,
    #[serde(default)]
    pub name: String,
    pub display_name: String,
    /// `[min_lat, max_lat, min_lon, max_lon]` as decimal strings
    #[serde(default)]
    pub boundingbox: Vec<String>,
}

impl OsmPlace {
    pub fn latitude(&self) -> Option<f64> {
        self.lat.trim().parse().ok()
    }

    pub fn longitude(&self) -> Option<f64> {
        self.lon.trim().parse().ok()
    }

    /// Parsed bounding box, if the provider sent all four corners
    pub fn bounding_box(&self) -> Option<[f64; 4]> {
        if self.boundingbox.len() != 4 {
            return None;
        }
        let mut bbox = [0.0; 4];
        for (slot, raw) in bbox.iter_mut().zip(&self.boundingbox) {
            *slot = raw.trim().parse().ok()?;
        }
        Some(bbox)
    }
}

/// Anchor span bound to the place it resolved to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocatedEntity {
    pub text: String,
    pub start_char: usize,
    pub end_char: usize,
    #[serde(rename = "_nlp_type")]
    pub nlp_type: EntityKind,
    /// Nearest GPE appended to the query for disambiguation
    #[serde(rename = "_closest_gpe")]
    pub closest_gpe: Option<String>,
    pub osm: OsmPlace,
}

/// Result broadcast to subscribers: one located image and where it came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocatedImage {
    pub entity: LocatedEntity,
    /// Image attachment whose alt text was located
    pub image: serde_json::Value,
    /// Full upstream event carrying the image
    pub event: serde_json::Value,
}

impl LocatedImage {
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn golden_gate() -> OsmPlace {
        OsmPlace {
            osm_type: "way".to_string(),
            osm_id: 24_078_834,
            lat: "37.8199".to_string(),
            lon: "-122.4783".to_string(),
            category: "man_made".to_string(),
            place_type: "bridge".to_string(),
            name: "Golden Gate Bridge".to_string(),
            display_name: "Golden Gate Bridge, San Francisco, California, United States".to_string(),
            boundingbox: vec![
                "37.8085".to_string(),
                "37.8324".to_string(),
                "-122.4799".to_string(),
                "-122.4771".to_string(),
            ],
        }
    }

    #[test]
    fn test_entity_kind_tags() {
        assert_eq!(EntityKind::from("GPE"), EntityKind::Gpe);
        assert_eq!(EntityKind::from("FAC"), EntityKind::Fac);
        assert_eq!(EntityKind::from("LOC"), EntityKind::Loc);
        assert_eq!(EntityKind::from("PERSON"), EntityKind::Other("PERSON".to_string()));
        assert_eq!(String::from(EntityKind::Other("ORG".to_string())), "ORG");
    }

    #[test]
    fn test_text_span_wire_names() {
        let span: TextSpan = serde_json::from_value(json!({
            "type": "FAC",
            "text": "Golden Gate Bridge",
            "start_char": 15,
            "end_char": 33
        }))
        .unwrap();

        assert_eq!(span, TextSpan::new("FAC", "Golden Gate Bridge", 15, 33));
    }

    #[test]
    fn test_osm_place_coordinates() {
        let place = golden_gate();
        assert_eq!(place.latitude(), Some(37.8199));
        assert_eq!(place.longitude(), Some(-122.4783));
        assert_eq!(
            place.bounding_box(),
            Some([37.8085, 37.8324, -122.4799, -122.4771])
        );
    }

    #[test]
    fn test_osm_place_tolerates_missing_optional_fields() {
        let place: OsmPlace = serde_json::from_value(json!({
            "osm_type": "node",
            "osm_id": 1,
            "lat": "1.5",
            "lon": "2.5",
            "display_name": "Somewhere"
        }))
        .unwrap();

        assert!(place.name.is_empty());
        assert!(place.bounding_box().is_none());
    }

    #[test]
    fn test_located_image_wire_shape() {
        let located = LocatedImage {
            entity: LocatedEntity {
                text: "Golden Gate Bridge".to_string(),
                start_char: 15,
                end_char: 33,
                nlp_type: EntityKind::Fac,
                closest_gpe: Some("San Francisco".to_string()),
                osm: golden_gate(),
            },
            image: json!({"alt": "Sunset over the Golden Gate Bridge, San Francisco"}),
            event: json!({"kind": "commit"}),
        };

        let value: serde_json::Value = serde_json::from_str(&located.to_json().unwrap()).unwrap();
        assert_eq!(value["entity"]["_nlp_type"], "FAC");
        assert_eq!(value["entity"]["_closest_gpe"], "San Francisco");
        assert_eq!(value["entity"]["osm"]["type"], "bridge");
        assert_eq!(value["entity"]["osm"]["lat"], "37.8199");
        assert_eq!(value["event"]["kind"], "commit");
    }

    #[test]
    fn test_missing_closest_gpe_serializes_as_null() {
        let entity = LocatedEntity {
            text: "Paris".to_string(),
            start_char: 0,
            end_char: 5,
            nlp_type: EntityKind::Gpe,
            closest_gpe: None,
            osm: golden_gate(),
        };

        let value = serde_json::to_value(&entity).unwrap();
        assert!(value["_closest_gpe"].is_null());
    }
}

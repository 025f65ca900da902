use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One physical parking facility and its current occupancy.
///
/// `available` is written only by the refresh task; `last_updated` by the
/// refresh and heartbeat tasks. Capacity is not enforced against
/// `available`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationRecord {
    pub id: String,
    pub name: String,
    pub location_label: String,
    pub total_spaces: u32,
    pub available: u32,
    pub last_updated: Option<DateTime<Utc>>,
}

impl LocationRecord {
    /// Build a record, deriving `name` when none is supplied.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        name: Option<String>,
        location_label: impl Into<String>,
        total_spaces: u32,
    ) -> Self {
        let id = id.into();
        let location_label = location_label.into();
        let name = name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| default_lot_name(&id, &location_label));
        Self {
            id,
            name,
            location_label,
            total_spaces,
            available: 0,
            last_updated: None,
        }
    }
}

/// Name used for a lot that was provisioned without one.
///
/// Falls back to the location label, then to `Parking Lot <id>`.
#[must_use]
pub fn default_lot_name(id: &str, location_label: &str) -> String {
    if location_label.trim().is_empty() {
        format!("Parking Lot {id}")
    } else {
        location_label.to_string()
    }
}

/// A single object reported by an inference backend.
///
/// Geometry is the box centre plus size in image pixels, as returned by
/// Roboflow-style detection endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class: String,
    #[serde(default)]
    pub class_id: Option<u32>,
    pub confidence: f64,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub width: f64,
    #[serde(default)]
    pub height: f64,
}

impl Detection {
    /// A detection with no geometry. Mostly useful in tests.
    #[must_use]
    pub fn new(class: impl Into<String>, confidence: f64) -> Self {
        Self {
            class: class.into(),
            class_id: None,
            confidence,
            x: 0.0,
            y: 0.0,
            width: 0.0,
            height: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Distance {
    pub text: String,
    /// Meters.
    pub value: f64,
}

/// One row of an externally ranked distance list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistanceEntry {
    #[serde(alias = "parkingLotId")]
    pub location_id: String,
    pub distance: Distance,
}

/// A stored lot annotated with the distance entry that selected it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedResult {
    #[serde(flatten)]
    pub lot: LocationRecord,
    pub distance: Distance,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_record_derives_name_from_label() {
        let lot = LocationRecord::new("49", None, "North Garage", 120);
        assert_eq!(lot.name, "North Garage");
        assert_eq!(lot.available, 0);
        assert!(lot.last_updated.is_none());
    }

    #[test]
    fn new_record_falls_back_to_id_when_label_blank() {
        let lot = LocationRecord::new("2A", Some("   ".to_string()), "", 10);
        assert_eq!(lot.name, "Parking Lot 2A");
    }

    #[test]
    fn new_record_keeps_explicit_name() {
        let lot = LocationRecord::new("1", Some("Lot One".to_string()), "Main St", 10);
        assert_eq!(lot.name, "Lot One");
    }

    #[test]
    fn distance_entry_accepts_legacy_parking_lot_id() {
        let entry: DistanceEntry = serde_json::from_value(serde_json::json!({
            "parkingLotId": "7",
            "distance": { "text": "0.4 mi", "value": 640.0 }
        }))
        .expect("deserialize");
        assert_eq!(entry.location_id, "7");
        assert!((entry.distance.value - 640.0).abs() < f64::EPSILON);
    }

    #[test]
    fn merged_result_flattens_lot_fields() {
        let merged = MergedResult {
            lot: LocationRecord::new("A", None, "Main St", 50),
            distance: Distance {
                text: "1 mi".to_string(),
                value: 1600.0,
            },
        };
        let json = serde_json::to_value(&merged).expect("serialize");
        assert_eq!(json["id"], "A");
        assert_eq!(json["locationLabel"], "Main St");
        assert_eq!(json["totalSpaces"], 50);
        assert_eq!(json["distance"]["text"], "1 mi");
    }

    #[test]
    fn detection_defaults_missing_geometry() {
        let det: Detection =
            serde_json::from_str(r#"{"class":"empty","confidence":0.9}"#).expect("deserialize");
        assert_eq!(det.class, "empty");
        assert!(det.class_id.is_none());
        assert!(det.width.abs() < f64::EPSILON);
    }
}

//! Flat persistence records for track items.
//!
//! One [`ItemRecord`] holds every column any item type may use; the type tag
//! decides which of the optional columns are read.

use serde::{Deserialize, Serialize};

use crate::{error::RecordError, geometry::Point};

use super::item::{parse_speed, validate_speed, ItemKind, SignalState, TiId, TrackItem};

/// Persisted form of a [`TrackItem`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRecord {
    /// Item id.
    #[serde(rename = "tiid")]
    pub id: TiId,
    /// Type tag, see [`ItemKind::tag`].
    #[serde(rename = "titype")]
    pub tag: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Id of the item whose reservation excludes this one.
    #[serde(rename = "conflicttiid", default)]
    pub conflict: Option<TiId>,
    /// Origin abscissa.
    pub x: f64,
    /// Origin ordinate.
    pub y: f64,
    /// End abscissa of resizable items.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xf: Option<f64>,
    /// End ordinate of resizable items.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub yf: Option<f64>,
    /// Length in metres of resizable items.
    #[serde(rename = "reallength", default, skip_serializing_if = "Option::is_none")]
    pub real_length: Option<f64>,
    /// Raw speed limit; older files store it as text, possibly empty.
    #[serde(rename = "maxspeed", default)]
    pub max_speed: Option<SpeedField>,
    /// Previous neighbour, `null` when unset.
    #[serde(rename = "ptiid", default)]
    pub previous: Option<TiId>,
    /// Next neighbour, `null` when unset.
    #[serde(rename = "ntiid", default)]
    pub next: Option<TiId>,
    /// Place code of platforms.
    #[serde(rename = "placecode", default, skip_serializing_if = "Option::is_none")]
    pub place_code: Option<String>,
    /// Track code of platforms.
    #[serde(rename = "trackcode", default, skip_serializing_if = "Option::is_none")]
    pub track_code: Option<String>,
    /// Signal type name.
    #[serde(rename = "signaltype", default, skip_serializing_if = "Option::is_none")]
    pub signal_type: Option<String>,
    /// Signal switching timer.
    #[serde(rename = "timersw", default, skip_serializing_if = "Option::is_none")]
    pub timer_sw: Option<f64>,
    /// Signal wait-cancel timer.
    #[serde(rename = "timerwc", default, skip_serializing_if = "Option::is_none")]
    pub timer_wc: Option<f64>,
    /// Whether a signal faces backwards.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reverse: Option<bool>,
}

/// Speed column, either numeric or textual.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SpeedField {
    /// Plain number.
    Number(f64),
    /// Text form, the empty string standing for `0`.
    Text(String),
}

impl TrackItem {
    /// Build an item from its record. Links are copied as ids; checking that
    /// they resolve is up to the network.
    pub fn from_record(record: &ItemRecord) -> Result<Self, RecordError> {
        let id = record.id;
        let origin = finite_point(id, ("x", record.x), ("y", record.y))?;

        let kind = match record.tag.as_str() {
            "0" => ItemKind::Plain,
            "L" => ItemKind::Line,
            "LI" => ItemKind::InvisibleLink,
            "LP" => ItemKind::Platform {
                place_code: non_empty(record.place_code.as_deref()),
                track_code: non_empty(record.track_code.as_deref()),
            },
            "S" => ItemKind::Signal(SignalState {
                signal_type: record.signal_type.clone().unwrap_or_default(),
                reverse: record.reverse.unwrap_or(false),
                timer_sw: timer(id, "timersw", record.timer_sw)?,
                timer_wc: timer(id, "timerwc", record.timer_wc)?,
                next_active_route: None,
            }),
            "E" => ItemKind::End,
            other => {
                return Err(RecordError::UnknownType {
                    item: id,
                    tag: other.to_string(),
                })
            }
        };

        let item = if kind.is_resizable() {
            let (xf, yf) = record
                .xf
                .zip(record.yf)
                .ok_or(RecordError::MissingEnd { item: id })?;
            let end = finite_point(id, ("xf", xf), ("yf", yf))?;
            let real_length = record
                .real_length
                .unwrap_or_else(|| origin.distance_to(end));
            TrackItem::resizable(id, record.name.clone(), kind, origin, end, real_length)?
        } else {
            TrackItem::new(id, record.name.clone(), kind, origin)
        };

        let max_speed = match &record.max_speed {
            None => 0.0,
            Some(SpeedField::Number(value)) => validate_speed(id, *value)?,
            Some(SpeedField::Text(value)) => parse_speed(id, value)?,
        };

        let mut item = item.with_max_speed(max_speed)?;
        item.set_previous_item(record.previous);
        item.set_next_item(record.next);
        item.set_conflict_item(record.conflict);
        Ok(item)
    }

    /// Record holding everything needed to rebuild this item.
    pub fn save_record(&self) -> ItemRecord {
        let resizable = self.kind().is_resizable();
        let mut record = ItemRecord {
            id: self.id(),
            tag: self.kind().tag().to_string(),
            name: self.name().to_string(),
            conflict: self.conflict_item(),
            x: self.origin().x,
            y: self.origin().y,
            xf: resizable.then(|| self.end().x),
            yf: resizable.then(|| self.end().y),
            real_length: resizable.then(|| self.real_length()),
            max_speed: Some(SpeedField::Number(self.raw_max_speed())),
            previous: self.previous_item(),
            next: self.next_item(),
            place_code: None,
            track_code: None,
            signal_type: None,
            timer_sw: None,
            timer_wc: None,
            reverse: None,
        };
        match self.kind() {
            ItemKind::Platform {
                place_code,
                track_code,
            } => {
                record.place_code = place_code.clone();
                record.track_code = track_code.clone();
            }
            ItemKind::Signal(signal) => {
                record.signal_type = Some(signal.signal_type.clone());
                record.reverse = Some(signal.reverse);
                record.timer_sw = signal.timer_sw;
                record.timer_wc = signal.timer_wc;
            }
            _ => {}
        }
        record
    }
}

fn finite_point(
    item: TiId,
    (x_field, x): (&'static str, f64),
    (y_field, y): (&'static str, f64),
) -> Result<Point, RecordError> {
    for (field, value) in [(x_field, x), (y_field, y)] {
        if !value.is_finite() {
            return Err(RecordError::NonFinite { item, field, value });
        }
    }
    Ok(Point::new(x, y))
}

fn timer(item: TiId, field: &'static str, value: Option<f64>) -> Result<Option<f64>, RecordError> {
    match value {
        Some(value) if !value.is_finite() => Err(RecordError::NonFinite { item, field, value }),
        Some(value) if value < 0.0 => Err(RecordError::NegativeTimer { item, field, value }),
        other => Ok(other),
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn parse(value: Value) -> Result<TrackItem, RecordError> {
        let record: ItemRecord = serde_json::from_value(value).expect("record should deserialize");
        TrackItem::from_record(&record)
    }

    #[test]
    fn loads_line_with_geometric_length() -> Result<(), RecordError> {
        let item = parse(json!({
            "tiid": 3, "titype": "L", "name": "", "x": 0.0, "y": 0.0,
            "xf": 30.0, "yf": 40.0, "maxspeed": "", "ptiid": 2, "ntiid": 4
        }))?;
        assert_eq!(item.real_length(), 50.0);
        assert_eq!(item.raw_max_speed(), 0.0);
        assert_eq!(item.previous_item(), Some(TiId(2)));
        assert_eq!(item.next_item(), Some(TiId(4)));
        Ok(())
    }

    #[test]
    fn signal_record_survives_a_save() -> Result<(), RecordError> {
        let item = parse(json!({
            "tiid": 7, "titype": "S", "name": "S7", "x": 10.0, "y": 5.0,
            "maxspeed": 12.5, "signaltype": "UK_3_ASPECTS", "reverse": true,
            "timersw": 2.0, "conflicttiid": 9, "ptiid": null, "ntiid": 8
        }))?;
        let record = item.save_record();
        assert_eq!(record.signal_type.as_deref(), Some("UK_3_ASPECTS"));
        assert_eq!(record.reverse, Some(true));
        assert_eq!(record.conflict, Some(TiId(9)));
        assert_eq!(TrackItem::from_record(&record)?, item);
        Ok(())
    }

    #[test]
    fn unset_links_are_saved_as_null() {
        let item = TrackItem::new(TiId(1), "lonely", ItemKind::End, Point::default());
        let value = serde_json::to_value(item.save_record()).expect("record serializes");
        assert_eq!(value["ptiid"], Value::Null);
        assert_eq!(value["ntiid"], Value::Null);
        assert!(value.get("xf").is_none());
    }

    #[test]
    fn rejects_invalid_records() {
        let cases = [
            (
                json!({"tiid": 1, "titype": "Q", "x": 0.0, "y": 0.0}),
                RecordError::UnknownType {
                    item: TiId(1),
                    tag: "Q".to_string(),
                },
            ),
            (
                json!({"tiid": 2, "titype": "L", "x": 0.0, "y": 0.0, "xf": 5.0}),
                RecordError::MissingEnd { item: TiId(2) },
            ),
            (
                json!({"tiid": 3, "titype": "L", "x": 0.0, "y": 0.0, "xf": 0.0, "yf": 0.0}),
                RecordError::NonPositiveLength {
                    item: TiId(3),
                    value: 0.0,
                },
            ),
            (
                json!({"tiid": 4, "titype": "0", "x": 0.0, "y": 0.0, "maxspeed": -3.0}),
                RecordError::NegativeSpeed {
                    item: TiId(4),
                    value: -3.0,
                },
            ),
            (
                json!({"tiid": 5, "titype": "0", "x": 0.0, "y": 0.0, "maxspeed": "fast"}),
                RecordError::InvalidSpeed {
                    item: TiId(5),
                    value: "fast".to_string(),
                },
            ),
            (
                json!({"tiid": 6, "titype": "S", "x": 0.0, "y": 0.0, "timerwc": -1.0}),
                RecordError::NegativeTimer {
                    item: TiId(6),
                    field: "timerwc",
                    value: -1.0,
                },
            ),
        ];
        for (value, expected) in cases {
            assert_eq!(parse(value), Err(expected));
        }
    }
}

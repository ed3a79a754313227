use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Format used when sending dates back to the API.
pub const WIRE_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
/// Calendar-day key used by the grouped view.
pub const DAY_KEY_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("activity record has an empty id")]
    EmptyId,
    #[error("unparsable activity date '{0}'")]
    InvalidDate(String),
    #[error("invalid coordinates: lat={lat}, lng={lng}")]
    InvalidCoordinates { lat: String, lng: String },
    #[error("coordinates need both latitude and longitude")]
    PartialCoordinates,
}

// --- Typed ID ---

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActivityId(String);

impl ActivityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActivityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ActivityId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Validated lat/lng
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    lat: f64,
    lng: f64,
}

impl LatLon {
    pub fn new(lat: f64, lng: f64) -> Result<Self, RecordError> {
        if !lat.is_finite()
            || !lng.is_finite()
            || !(-90.0..=90.0).contains(&lat)
            || !(-180.0..=180.0).contains(&lng)
        {
            return Err(RecordError::InvalidCoordinates {
                lat: lat.to_string(),
                lng: lng.to_string(),
            });
        }
        Ok(Self { lat, lng })
    }

    pub fn lat(&self) -> f64 {
        self.lat
    }

    pub fn lng(&self) -> f64 {
        self.lng
    }
}

/// An activity as held by the cache. `date` is a point in time, never a string.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: ActivityId,
    pub title: String,
    pub category: String,
    pub description: String,
    pub date: NaiveDateTime,
    pub city: String,
    pub venue: String,
    pub coordinates: Option<LatLon>,
}

impl Activity {
    /// `yyyy-MM-dd` of the activity's date.
    pub fn day_key(&self) -> String {
        self.date.format(DAY_KEY_FORMAT).to_string()
    }
}

/// Everything the user fills in before the activity has an identifier.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActivityDraft {
    pub title: String,
    pub category: String,
    pub description: String,
    pub date: NaiveDateTime,
    pub city: String,
    pub venue: String,
    pub coordinates: Option<LatLon>,
}

impl ActivityDraft {
    pub fn new(title: impl Into<String>, date: NaiveDateTime) -> Self {
        Self {
            title: title.into(),
            category: String::new(),
            description: String::new(),
            date,
            city: String::new(),
            venue: String::new(),
            coordinates: None,
        }
    }

    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn with_location(mut self, city: impl Into<String>, venue: impl Into<String>) -> Self {
        self.city = city.into();
        self.venue = venue.into();
        self
    }

    #[must_use]
    pub fn with_coordinates(mut self, coordinates: LatLon) -> Self {
        self.coordinates = Some(coordinates);
        self
    }

    pub fn into_activity(self, id: ActivityId) -> Activity {
        Activity {
            id,
            title: self.title,
            category: self.category,
            description: self.description,
            date: self.date,
            city: self.city,
            venue: self.venue,
            coordinates: self.coordinates,
        }
    }
}

/// Activity as it travels over the wire.
///
/// Text fields treat `null` like a missing field. An empty `id` or `date`
/// is caught when the record is normalized.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRecord {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub category: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub date: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub city: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub venue: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl TryFrom<ActivityRecord> for Activity {
    type Error = RecordError;

    fn try_from(record: ActivityRecord) -> Result<Self, Self::Error> {
        if record.id.trim().is_empty() {
            return Err(RecordError::EmptyId);
        }

        let coordinates = match (record.latitude, record.longitude) {
            (Some(lat), Some(lng)) => Some(LatLon::new(lat, lng)?),
            (None, None) => None,
            _ => return Err(RecordError::PartialCoordinates),
        };

        Ok(Self {
            id: ActivityId::new(record.id),
            title: record.title,
            category: record.category,
            description: record.description,
            date: parse_wire_date(&record.date)?,
            city: record.city,
            venue: record.venue,
            coordinates,
        })
    }
}

impl From<&Activity> for ActivityRecord {
    fn from(activity: &Activity) -> Self {
        Self {
            id: activity.id.as_str().to_string(),
            title: activity.title.clone(),
            category: activity.category.clone(),
            description: activity.description.clone(),
            date: format_wire_date(&activity.date),
            city: activity.city.clone(),
            venue: activity.venue.clone(),
            latitude: activity.coordinates.map(|c| c.lat()),
            longitude: activity.coordinates.map(|c| c.lng()),
        }
    }
}

/// Accepts RFC 3339 (converted to UTC), a local `yyyy-MM-ddTHH:mm:ss[.fff]`,
/// or a bare `yyyy-MM-dd` taken as midnight.
pub fn parse_wire_date(raw: &str) -> Result<NaiveDateTime, RecordError> {
    let raw = raw.trim();

    if let Ok(with_offset) = DateTime::parse_from_rfc3339(raw) {
        return Ok(with_offset.naive_utc());
    }

    if let Ok(local) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(local);
    }

    NaiveDate::parse_from_str(raw, DAY_KEY_FORMAT)
        .ok()
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .ok_or_else(|| RecordError::InvalidDate(raw.to_string()))
}

pub fn format_wire_date(date: &NaiveDateTime) -> String {
    date.format(WIRE_DATE_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    fn record(id: &str, date: &str) -> ActivityRecord {
        ActivityRecord {
            id: id.into(),
            title: "Run".into(),
            category: "sport".into(),
            description: "Morning run".into(),
            date: date.into(),
            city: "London".into(),
            venue: "Hyde Park".into(),
            latitude: None,
            longitude: None,
        }
    }

    #[test]
    fn parses_local_timestamp() {
        let date = parse_wire_date("2024-01-05T08:00:00").unwrap();
        assert_eq!((date.year(), date.month(), date.day()), (2024, 1, 5));
        assert_eq!(date.hour(), 8);
    }

    #[test]
    fn parses_fractional_seconds() {
        let date = parse_wire_date("2024-01-05T08:00:00.1234567").unwrap();
        assert_eq!(date.minute(), 0);
        assert_eq!(date.day(), 5);
    }

    #[test]
    fn rfc3339_is_converted_to_utc() {
        let date = parse_wire_date("2024-01-05T08:00:00+02:00").unwrap();
        assert_eq!(date.hour(), 6);
    }

    #[test]
    fn bare_day_is_midnight() {
        let date = parse_wire_date("2024-01-05").unwrap();
        assert_eq!(date.hour(), 0);
        assert_eq!(date.day(), 5);
    }

    #[test]
    fn rejects_garbage_date() {
        assert_eq!(
            parse_wire_date("next tuesday"),
            Err(RecordError::InvalidDate("next tuesday".into()))
        );
    }

    #[test]
    fn record_normalizes_into_activity() {
        let activity = Activity::try_from(record("a1", "2024-01-05T08:00:00")).unwrap();
        assert_eq!(activity.id.as_str(), "a1");
        assert_eq!(activity.day_key(), "2024-01-05");
        assert!(activity.coordinates.is_none());
    }

    #[test]
    fn empty_id_is_rejected() {
        let result = Activity::try_from(record("  ", "2024-01-05T08:00:00"));
        assert_eq!(result, Err(RecordError::EmptyId));
    }

    #[test]
    fn half_coordinates_are_rejected() {
        let mut r = record("a1", "2024-01-05T08:00:00");
        r.latitude = Some(51.5);
        assert_eq!(Activity::try_from(r), Err(RecordError::PartialCoordinates));
    }

    #[test]
    fn out_of_range_coordinates_are_rejected() {
        let mut r = record("a1", "2024-01-05T08:00:00");
        r.latitude = Some(91.0);
        r.longitude = Some(0.0);
        assert!(matches!(
            Activity::try_from(r),
            Err(RecordError::InvalidCoordinates { .. })
        ));
    }

    #[test]
    fn latlon_rejects_non_finite() {
        assert!(LatLon::new(f64::NAN, 0.0).is_err());
        assert!(LatLon::new(0.0, f64::INFINITY).is_err());
        assert!(LatLon::new(-90.0, 180.0).is_ok());
    }

    #[test]
    fn activity_formats_back_to_wire() {
        let mut r = record("a1", "2024-01-05T08:30:00.000");
        r.latitude = Some(51.5);
        r.longitude = Some(-0.12);
        let activity = Activity::try_from(r).unwrap();

        let wire = ActivityRecord::from(&activity);
        assert_eq!(wire.date, "2024-01-05T08:30:00");
        assert_eq!(wire.latitude, Some(51.5));
        assert_eq!(wire.longitude, Some(-0.12));
    }

    #[test]
    fn record_uses_camel_case_and_defaults() {
        let json = r#"{"id":"a1","title":"Run","date":"2024-01-05T08:00:00"}"#;
        let parsed: ActivityRecord = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.city, "");
        assert_eq!(parsed.latitude, None);

        let out = serde_json::to_value(&parsed).unwrap();
        assert!(out.get("latitude").is_none());
    }

    #[test]
    fn null_text_fields_become_empty() {
        let json = r#"{"id":"a1","title":"Run","category":null,"description":null,
            "date":"2024-01-05T08:00:00","city":null,"venue":null,"latitude":null}"#;
        let parsed: ActivityRecord = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.description, "");
        assert_eq!(parsed.venue, "");
        assert!(Activity::try_from(parsed).is_ok());
    }

    #[test]
    fn null_date_fails_normalization_not_decoding() {
        let json = r#"[{"id":"a1","title":"Run","date":null},
            {"id":"a2","title":"Swim","description":null,"date":"2024-01-05T08:00:00"}]"#;
        let parsed: Vec<ActivityRecord> = serde_json::from_str(json).unwrap();

        assert_eq!(parsed.len(), 2);
        assert_eq!(
            Activity::try_from(parsed[0].clone()),
            Err(RecordError::InvalidDate(String::new()))
        );
        assert!(Activity::try_from(parsed[1].clone()).is_ok());
    }

    #[test]
    fn draft_takes_the_given_id() {
        let date = parse_wire_date("2024-01-05T08:00:00").unwrap();
        let activity = ActivityDraft::new("Run", date)
            .with_category("sport")
            .with_location("London", "Hyde Park")
            .into_activity(ActivityId::new("fixed"));

        assert_eq!(activity.id, ActivityId::new("fixed"));
        assert_eq!(activity.venue, "Hyde Park");
        assert_eq!(activity.category, "sport");
    }

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(ActivityId::generate(), ActivityId::generate());
    }
}

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{lenient_datetime, merge_opt, Entity, EntityKind, Record};
use crate::error::FetchError;
use crate::normalize::Extracted;

/// Per-timeline read position. The record id is the timeline name
/// ("home", "notifications").
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Marker {
    pub id: String,
    pub last_read_id: Option<String>,
    pub version: Option<u64>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Entity for Marker {
    const KIND: EntityKind = EntityKind::Marker;

    fn id(&self) -> &str {
        &self.id
    }

    fn merge_from(&mut self, newer: Self) {
        merge_opt(&mut self.last_read_id, newer.last_read_id);
        merge_opt(&mut self.version, newer.version);
        merge_opt(&mut self.updated_at, newer.updated_at);
    }

    fn into_record(self) -> Record {
        Record::Marker(self)
    }

    fn from_record(record: Record) -> Option<Self> {
        match record {
            Record::Marker(marker) => Some(marker),
            _ => None,
        }
    }

    fn as_record_ref(record: &Record) -> Option<&Self> {
        match record {
            Record::Marker(marker) => Some(marker),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawMarker {
    pub(crate) timeline: String,
    #[serde(default)]
    pub(crate) last_read_id: Option<String>,
    #[serde(default)]
    pub(crate) version: Option<u64>,
    #[serde(default, deserialize_with = "lenient_datetime")]
    pub(crate) updated_at: Option<DateTime<Utc>>,
}

pub(crate) fn parse(value: serde_json::Value, sink: &mut Extracted) -> Result<String, FetchError> {
    let raw: RawMarker =
        serde_json::from_value(value).map_err(|e| FetchError::Validation(e.to_string()))?;
    if raw.timeline.is_empty() {
        return Err(FetchError::Validation("marker timeline is empty".into()));
    }
    let id = raw.timeline;
    if !sink.enter(EntityKind::Marker, &id) {
        return Ok(id);
    }
    sink.push(Record::Marker(Marker {
        id: id.clone(),
        last_read_id: raw.last_read_id,
        version: raw.version,
        updated_at: raw.updated_at,
    }));
    Ok(id)
}

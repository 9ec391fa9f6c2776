use serde::Deserialize;

use super::{merge_opt, Entity, EntityKind, Record};
use crate::error::FetchError;
use crate::normalize::Extracted;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    pub id: String,
    pub title: Option<String>,
    pub context: Vec<String>,
}

impl Entity for Filter {
    const KIND: EntityKind = EntityKind::Filter;

    fn id(&self) -> &str {
        &self.id
    }

    fn merge_from(&mut self, newer: Self) {
        merge_opt(&mut self.title, newer.title);
        if !newer.context.is_empty() {
            self.context = newer.context;
        }
    }

    fn into_record(self) -> Record {
        Record::Filter(self)
    }

    fn from_record(record: Record) -> Option<Self> {
        match record {
            Record::Filter(filter) => Some(filter),
            _ => None,
        }
    }

    fn as_record_ref(record: &Record) -> Option<&Self> {
        match record {
            Record::Filter(filter) => Some(filter),
            _ => None,
        }
    }
}

// Accepts both the v2 shape (title) and the v1 shape (phrase).
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawFilter {
    pub(crate) id: String,
    #[serde(default)]
    pub(crate) title: Option<String>,
    #[serde(default)]
    pub(crate) phrase: Option<String>,
    #[serde(default)]
    pub(crate) context: Vec<String>,
}

pub(crate) fn parse(value: serde_json::Value, sink: &mut Extracted) -> Result<String, FetchError> {
    let raw: RawFilter =
        serde_json::from_value(value).map_err(|e| FetchError::Validation(e.to_string()))?;
    if raw.id.is_empty() {
        return Err(FetchError::Validation("filter id is empty".into()));
    }
    let id = raw.id;
    if !sink.enter(EntityKind::Filter, &id) {
        return Ok(id);
    }
    sink.push(Record::Filter(Filter {
        id: id.clone(),
        title: raw.title.or(raw.phrase),
        context: raw.context,
    }));
    Ok(id)
}

//! Key derivation for entity buffers and flush jobs.
//!
//! A [`FlushKey`] is a structured composite of
//! `project:category:entity:batch_timestamp`. Components are
//! percent-escaped (`%` and `:`) so distinct tuples never render to the same
//! key, even when ids contain the separator. A [`BufferKey`] is the flush key
//! behind a fixed prefix, which lets a flush worker go from the job id it was
//! handed to the buffer it must drain without any lookup.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use spool_model::{EntityId, EventCategory, IngestionEvent, ProjectId};
use std::{fmt, str::FromStr};

use crate::error::{IngestError, Result};

pub const BUFFER_KEY_PREFIX: &str = "ingestion-buffer:";

const SEPARATOR: char = ':';
const FLUSH_KEY_COMPONENTS: usize = 4;

/// Single time marker shared by every event of one enqueue call, in Unix
/// milliseconds.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct BatchTimestamp(i64);

impl BatchTimestamp {
    pub fn now() -> Self {
        Self(Utc::now().timestamp_millis())
    }

    pub fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    pub fn as_millis(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for BatchTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of one batch window's worth of buffered events for one
/// entity/category. Doubles as the flush job's dedupe id.
#[derive(
    Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct FlushKey(String);

impl FlushKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Recovers the components the key was derived from.
    pub fn parts(&self) -> Result<FlushKeyParts> {
        FlushKeyParts::parse(&self.0)
    }

    pub fn from_buffer_key(buffer_key: &BufferKey) -> Self {
        buffer_key.flush_key()
    }
}

impl fmt::Display for FlushKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for FlushKey {
    type Err = IngestError;

    fn from_str(raw: &str) -> Result<Self> {
        FlushKeyParts::parse(raw)?;
        Ok(Self(raw.to_string()))
    }
}

impl TryFrom<String> for FlushKey {
    type Error = IngestError;

    fn try_from(raw: String) -> Result<Self> {
        FlushKeyParts::parse(&raw)?;
        Ok(Self(raw))
    }
}

impl From<FlushKey> for String {
    fn from(key: FlushKey) -> Self {
        key.0
    }
}

/// Decoded components of a [`FlushKey`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlushKeyParts {
    pub project_id: ProjectId,
    pub category: EventCategory,
    pub entity_id: EntityId,
    pub batch_timestamp: BatchTimestamp,
}

impl FlushKeyParts {
    fn parse(raw: &str) -> Result<Self> {
        let segments: Vec<&str> = raw.split(SEPARATOR).collect();
        if segments.len() != FLUSH_KEY_COMPONENTS {
            return Err(IngestError::InvalidKey(format!(
                "flush key must have {FLUSH_KEY_COMPONENTS} components: {raw}"
            )));
        }

        let project_id = ProjectId::new(unescape(segments[0])?);
        let category = EventCategory::parse(&unescape(segments[1])?);
        let entity_id = EntityId::try_new(unescape(segments[2])?).ok_or_else(
            || IngestError::InvalidKey(format!("empty entity id in {raw}")),
        )?;
        let batch_timestamp = segments[3]
            .parse::<i64>()
            .map(BatchTimestamp::from_millis)
            .map_err(|e| {
                IngestError::InvalidKey(format!(
                    "bad batch timestamp in {raw}: {e}"
                ))
            })?;

        Ok(Self {
            project_id,
            category,
            entity_id,
            batch_timestamp,
        })
    }
}

/// Store key under which one flush window's serialized events accumulate.
#[derive(
    Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct BufferKey(String);

impl BufferKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn flush_key(&self) -> FlushKey {
        let flush = self.0.strip_prefix(BUFFER_KEY_PREFIX).unwrap_or(&self.0);
        FlushKey(flush.to_string())
    }
}

impl fmt::Display for BufferKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for BufferKey {
    type Err = IngestError;

    fn from_str(raw: &str) -> Result<Self> {
        let flush = raw.strip_prefix(BUFFER_KEY_PREFIX).ok_or_else(|| {
            IngestError::InvalidKey(format!(
                "buffer key must start with {BUFFER_KEY_PREFIX}: {raw}"
            ))
        })?;
        FlushKeyParts::parse(flush)?;
        Ok(Self(raw.to_string()))
    }
}

impl TryFrom<String> for BufferKey {
    type Error = IngestError;

    fn try_from(raw: String) -> Result<Self> {
        raw.parse()
    }
}

impl From<BufferKey> for String {
    fn from(key: BufferKey) -> Self {
        key.0
    }
}

pub fn derive_event_category(event: &IngestionEvent) -> EventCategory {
    event.category()
}

pub fn derive_flush_key(
    project_id: &ProjectId,
    entity_id: &EntityId,
    category: &EventCategory,
    batch_timestamp: BatchTimestamp,
) -> FlushKey {
    FlushKey(format!(
        "{}{SEPARATOR}{}{SEPARATOR}{}{SEPARATOR}{}",
        escape(project_id.as_str()),
        escape(category.as_str()),
        escape(entity_id.as_str()),
        batch_timestamp,
    ))
}

pub fn derive_buffer_key(flush_key: &FlushKey) -> BufferKey {
    BufferKey(format!("{BUFFER_KEY_PREFIX}{}", flush_key.as_str()))
}

fn escape(component: &str) -> String {
    let mut out = String::with_capacity(component.len());
    for ch in component.chars() {
        match ch {
            '%' => out.push_str("%25"),
            ':' => out.push_str("%3A"),
            other => out.push(other),
        }
    }
    out
}

fn unescape(component: &str) -> Result<String> {
    let mut out = String::with_capacity(component.len());
    let mut chars = component.chars();
    while let Some(ch) = chars.next() {
        if ch != '%' {
            out.push(ch);
            continue;
        }
        let code: String = chars.by_ref().take(2).collect();
        match code.as_str() {
            "25" => out.push('%'),
            "3A" => out.push(':'),
            _ => {
                return Err(IngestError::InvalidKey(format!(
                    "bad escape sequence %{code} in {component}"
                )));
            }
        }
    }
    Ok(out)
}

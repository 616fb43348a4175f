//! Wire model for ingestion events and the payload written to buffers.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

use crate::ids::{EntityId, ProjectId};

/// Event discriminator as sent by SDKs in the `type` field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventType {
    TraceCreate,
    ScoreCreate,
    SpanCreate,
    SpanUpdate,
    GenerationCreate,
    GenerationUpdate,
    EventCreate,
    ObservationCreate,
    ObservationUpdate,
    SdkLog,
    /// Unknown discriminators are carried through untouched.
    Other(String),
}

impl EventType {
    pub fn as_str(&self) -> &str {
        match self {
            EventType::TraceCreate => "trace-create",
            EventType::ScoreCreate => "score-create",
            EventType::SpanCreate => "span-create",
            EventType::SpanUpdate => "span-update",
            EventType::GenerationCreate => "generation-create",
            EventType::GenerationUpdate => "generation-update",
            EventType::EventCreate => "event-create",
            EventType::ObservationCreate => "observation-create",
            EventType::ObservationUpdate => "observation-update",
            EventType::SdkLog => "sdk-log",
            EventType::Other(raw) => raw.as_str(),
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "trace-create" => EventType::TraceCreate,
            "score-create" => EventType::ScoreCreate,
            "span-create" => EventType::SpanCreate,
            "span-update" => EventType::SpanUpdate,
            "generation-create" => EventType::GenerationCreate,
            "generation-update" => EventType::GenerationUpdate,
            "event-create" => EventType::EventCreate,
            "observation-create" => EventType::ObservationCreate,
            "observation-update" => EventType::ObservationUpdate,
            "sdk-log" => EventType::SdkLog,
            other => EventType::Other(other.to_string()),
        }
    }

    /// Coarse category used to partition buffers. Creates and updates of
    /// the same entity share a category so they land in one buffer.
    pub fn category(&self) -> EventCategory {
        match self {
            EventType::TraceCreate => EventCategory::Trace,
            EventType::ScoreCreate => EventCategory::Score,
            EventType::SpanCreate
            | EventType::SpanUpdate
            | EventType::GenerationCreate
            | EventType::GenerationUpdate
            | EventType::EventCreate
            | EventType::ObservationCreate
            | EventType::ObservationUpdate => EventCategory::Observation,
            EventType::SdkLog => EventCategory::Other("sdk-log".to_string()),
            EventType::Other(raw) => {
                let stem = raw
                    .rsplit_once('-')
                    .map(|(stem, _)| stem)
                    .filter(|stem| !stem.is_empty())
                    .unwrap_or(raw);
                EventCategory::Other(stem.to_string())
            }
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for EventType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventType {
    fn deserialize<D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(EventType::parse(&raw))
    }
}

/// Buffer partition for an event.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventCategory {
    Trace,
    Observation,
    Score,
    Other(String),
}

impl EventCategory {
    pub fn as_str(&self) -> &str {
        match self {
            EventCategory::Trace => "trace",
            EventCategory::Observation => "observation",
            EventCategory::Score => "score",
            EventCategory::Other(raw) => raw.as_str(),
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "trace" => EventCategory::Trace,
            "observation" => EventCategory::Observation,
            "score" => EventCategory::Score,
            other => EventCategory::Other(other.to_string()),
        }
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single ingestion event as accepted from upstream.
///
/// The body is kept opaque; only `body.id` is inspected to attribute the
/// event to an entity buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionEvent {
    pub id: String,
    pub timestamp: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    pub body: Value,
}

impl IngestionEvent {
    /// The entity this event mutates, if the body names one.
    pub fn entity_id(&self) -> Option<EntityId> {
        self.body
            .get("id")
            .and_then(Value::as_str)
            .and_then(EntityId::try_new)
    }

    pub fn category(&self) -> EventCategory {
        self.event_type.category()
    }
}

/// Payload appended to a buffer: the original event plus its owning project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BufferedEvent {
    #[serde(flatten)]
    pub event: IngestionEvent,
    pub project_id: ProjectId,
}

impl BufferedEvent {
    pub fn new(project_id: ProjectId, event: IngestionEvent) -> Self {
        Self { event, project_id }
    }
}

use chrono::NaiveDateTime;
use serde::Deserialize;
use serde_json::Value;

/// Timestamp format used by all Hive API responses (naive UTC).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
}

/// A root post as returned by `bridge.get_account_posts` (sort=posts).
#[derive(Debug, Clone, Deserialize)]
pub struct Post {
    pub author: String,
    pub permlink: String,
    pub category: String,
    pub created: String,
    pub body: String,
    pub title: String,
    #[serde(default)]
    pub beneficiaries: Vec<Beneficiary>,
}

impl Post {
    pub fn created_at(&self) -> Result<NaiveDateTime, chrono::ParseError> {
        parse_timestamp(&self.created)
    }
}

/// Reward beneficiary attached to a post. Weight is in basis points.
#[derive(Debug, Clone, Deserialize)]
pub struct Beneficiary {
    pub account: String,
    pub weight: u32,
}

impl Beneficiary {
    pub fn percent(&self) -> u32 {
        self.weight / 100
    }
}

/// A comment as returned by `bridge.get_account_posts` (sort=comments).
#[derive(Debug, Clone, Deserialize)]
pub struct Comment {
    pub author: String,
    pub created: String,
    pub body: String,
    pub parent_author: String,
    pub children: u32,
    #[serde(default)]
    pub community: Option<String>,
}

impl Comment {
    pub fn created_at(&self) -> Result<NaiveDateTime, chrono::ParseError> {
        parse_timestamp(&self.created)
    }
}

/// Envelope around one operation in `condenser_api.get_account_history`.
/// The raw wire shape is `[sequence, {timestamp, op: [name, payload]}]`.
#[derive(Debug, Clone, Deserialize)]
pub struct OpEnvelope {
    pub timestamp: String,
    pub op: (String, Value),
}

/// One decoded account-history operation.
#[derive(Debug, Clone)]
pub struct HistoryOp {
    pub sequence: u64,
    pub timestamp: NaiveDateTime,
    pub name: String,
    pub payload: Value,
}

impl HistoryOp {
    /// Decode a raw history entry. Entries that deviate from the expected
    /// shape yield `None` so the caller can skip them instead of panicking
    /// on a missing index or key.
    pub fn decode(raw: &Value) -> Option<Self> {
        let (sequence, envelope): (u64, OpEnvelope) = serde_json::from_value(raw.clone()).ok()?;
        let timestamp = parse_timestamp(&envelope.timestamp).ok()?;
        let (name, payload) = envelope.op;
        Some(Self {
            sequence,
            timestamp,
            name,
            payload,
        })
    }

    /// The `id` field of a custom_json payload, if present.
    pub fn custom_json_id(&self) -> Option<&str> {
        self.payload.get("id")?.as_str()
    }
}

//! Record types shared by the fetcher, merger, and snapshot store.

use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, de};

/// One verified knowledge unit, as validated at the fetch boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct KnowledgeRecord {
   pub id:           String,
   pub title:        String,
   pub content:      String,
   pub embedding:    Vec<f32>,
   pub content_type: Option<String>,
   pub category:     Option<String>,
   pub updated_at:   Option<DateTime<Utc>>,
}

impl KnowledgeRecord {
   /// Metadata entry for this record (everything but the embedding).
   pub fn meta(&self) -> RecordMeta {
      RecordMeta {
         id:           self.id.clone(),
         title:        self.title.clone(),
         content:      self.content.clone(),
         content_type: self.content_type.clone(),
         category:     self.category.clone(),
         updated_at:   self.updated_at,
      }
   }

   /// Rejoins a metadata entry with its matrix row.
   pub fn from_parts(meta: RecordMeta, embedding: Vec<f32>) -> Self {
      Self {
         id: meta.id,
         title: meta.title,
         content: meta.content,
         embedding,
         content_type: meta.content_type,
         category: meta.category,
         updated_at: meta.updated_at,
      }
   }
}

/// A metadata file entry. Row order matches the embedding matrix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMeta {
   pub id:           String,
   #[serde(default)]
   pub title:        String,
   #[serde(default)]
   pub content:      String,
   #[serde(default)]
   pub content_type: Option<String>,
   #[serde(default)]
   pub category:     Option<String>,
   #[serde(default)]
   pub updated_at:   Option<DateTime<Utc>>,
}

/// Embedding as sent by the remote: a JSON array, or pgvector text `"[0.1,0.2]"`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum EmbeddingValue {
   Vector(Vec<f32>),
   Text(String),
}

impl EmbeddingValue {
   pub fn into_vec(self) -> Result<Vec<f32>, String> {
      match self {
         Self::Vector(v) => Ok(v),
         Self::Text(text) => {
            let trimmed = text.trim();
            let inner = trimmed
               .strip_prefix('[')
               .and_then(|s| s.strip_suffix(']'))
               .ok_or_else(|| format!("expected bracketed vector, got {} bytes", trimmed.len()))?;
            if inner.trim().is_empty() {
               return Ok(Vec::new());
            }
            inner
               .split(',')
               .map(|part| {
                  part
                     .trim()
                     .parse::<f32>()
                     .map_err(|e| format!("invalid component {part:?}: {e}"))
               })
               .collect()
         },
      }
   }
}

/// A row as returned by the remote query, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RemoteRow {
   #[serde(default, deserialize_with = "deserialize_id")]
   pub id:           Option<String>,
   #[serde(default)]
   pub title:        Option<String>,
   #[serde(default)]
   pub content:      Option<String>,
   #[serde(default)]
   pub embedding:    Option<EmbeddingValue>,
   #[serde(default)]
   pub content_type: Option<String>,
   #[serde(default)]
   pub category:     Option<String>,
   #[serde(default, deserialize_with = "deserialize_timestamp")]
   pub updated_at:   Option<DateTime<Utc>>,
}

/// Why a remote row was kept out of the snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowRejection {
   MissingId,
   MissingEmbedding { id: String },
   EmptyEmbedding { id: String },
   MalformedEmbedding { id: String, reason: String },
   NonFiniteEmbedding { id: String },
   /// The row did not decode into the expected shape.
   Malformed { id: Option<String>, reason: String },
}

/// A page element: a decoded row, or the reason it could not be decoded.
pub type DecodedRow = Result<RemoteRow, RowRejection>;

impl fmt::Display for RowRejection {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      match self {
         Self::MissingId => write!(f, "row has no id"),
         Self::MissingEmbedding { id } => write!(f, "record {id} has no embedding"),
         Self::EmptyEmbedding { id } => write!(f, "record {id} has an empty embedding"),
         Self::MalformedEmbedding { id, reason } => {
            write!(f, "record {id} has a malformed embedding: {reason}")
         },
         Self::NonFiniteEmbedding { id } => {
            write!(f, "record {id} has a non-finite embedding component")
         },
         Self::Malformed { id: Some(id), reason } => {
            write!(f, "record {id} could not be decoded: {reason}")
         },
         Self::Malformed { id: None, reason } => write!(f, "row could not be decoded: {reason}"),
      }
   }
}

impl RemoteRow {
   /// Validates required fields. Rows missing `id` or a usable `embedding`
   /// are rejected so they never reach the matrix.
   pub fn into_record(self) -> Result<KnowledgeRecord, RowRejection> {
      let id = self
         .id
         .map(|id| id.trim().to_string())
         .filter(|id| !id.is_empty())
         .ok_or(RowRejection::MissingId)?;

      let Some(raw) = self.embedding else {
         return Err(RowRejection::MissingEmbedding { id });
      };
      let embedding = match raw.into_vec() {
         Ok(v) => v,
         Err(reason) => return Err(RowRejection::MalformedEmbedding { id, reason }),
      };
      if embedding.is_empty() {
         return Err(RowRejection::EmptyEmbedding { id });
      }
      if embedding.iter().any(|v| !v.is_finite()) {
         return Err(RowRejection::NonFiniteEmbedding { id });
      }

      Ok(KnowledgeRecord {
         id,
         title: self.title.unwrap_or_default(),
         content: self.content.unwrap_or_default(),
         embedding,
         content_type: self.content_type,
         category: self.category,
         updated_at: self.updated_at,
      })
   }
}

/// Decodes a response body row by row.
///
/// Only a body that is not a JSON array fails; a bad element becomes a
/// [`RowRejection::Malformed`] in its position.
pub fn decode_rows(body: &[u8]) -> Result<Vec<DecodedRow>, String> {
   let values: Vec<serde_json::Value> = serde_json::from_slice(body).map_err(|e| e.to_string())?;
   Ok(values.into_iter().map(decode_row).collect())
}

fn decode_row(value: serde_json::Value) -> DecodedRow {
   let id = match value.get("id") {
      Some(serde_json::Value::String(s)) => Some(s.clone()),
      Some(serde_json::Value::Number(n)) => Some(n.to_string()),
      _ => None,
   };
   serde_json::from_value(value)
      .map_err(|e| RowRejection::Malformed { id, reason: e.to_string() })
}

/// Accepts string or integer ids; `null` becomes `None`.
fn deserialize_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
   D: Deserializer<'de>,
{
   let value = Option::<serde_json::Value>::deserialize(deserializer)?;
   match value {
      None | Some(serde_json::Value::Null) => Ok(None),
      Some(serde_json::Value::String(s)) => Ok(Some(s)),
      Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
      Some(other) => Err(de::Error::custom(format!("unsupported id value: {other}"))),
   }
}

/// Accepts RFC 3339 timestamps and offset-less ones (`timestamp` columns),
/// which are taken as UTC.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
   D: Deserializer<'de>,
{
   let Some(raw) = Option::<String>::deserialize(deserializer)? else {
      return Ok(None);
   };
   if let Ok(ts) = DateTime::parse_from_rfc3339(&raw) {
      return Ok(Some(ts.with_timezone(&Utc)));
   }
   NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
      .or_else(|_| NaiveDateTime::parse_from_str(&raw, "%Y-%m-%d %H:%M:%S%.f"))
      .map(|naive| Some(naive.and_utc()))
      .map_err(|e| de::Error::custom(format!("invalid timestamp {raw:?}: {e}")))
}

#[cfg(test)]
mod tests {
   use super::*;

   fn row(json: serde_json::Value) -> RemoteRow {
      serde_json::from_value(json).unwrap()
   }

   #[test]
   fn accepts_numeric_id_and_text_embedding() {
      let record = row(serde_json::json!({
         "id": 42,
         "title": "Soil pH",
         "content": "Keep it near neutral",
         "embedding": "[0.5, -1, 2.25]",
         "content_type": "faq",
         "category": null,
         "updated_at": "2024-05-01T10:00:00+00:00"
      }))
      .into_record()
      .unwrap();

      assert_eq!(record.id, "42");
      assert_eq!(record.embedding, vec![0.5, -1.0, 2.25]);
      assert_eq!(record.category, None);
      assert!(record.updated_at.is_some());
   }

   #[test]
   fn null_text_fields_become_empty() {
      let record = row(serde_json::json!({"id": "a", "title": null, "embedding": [1.0]}))
         .into_record()
         .unwrap();
      assert_eq!(record.title, "");
      assert_eq!(record.content, "");
   }

   #[test]
   fn offsetless_timestamp_is_utc() {
      let record = row(serde_json::json!({
         "id": "a",
         "embedding": [1.0],
         "updated_at": "2024-05-01T10:00:00.250"
      }))
      .into_record()
      .unwrap();
      let ts = record.updated_at.unwrap();
      assert_eq!(ts.to_rfc3339(), "2024-05-01T10:00:00.250+00:00");
   }

   #[test]
   fn rejects_missing_id() {
      let err = row(serde_json::json!({"embedding": [1.0]})).into_record().unwrap_err();
      assert_eq!(err, RowRejection::MissingId);
   }

   #[test]
   fn rejects_missing_and_empty_embedding() {
      let err = row(serde_json::json!({"id": "a"})).into_record().unwrap_err();
      assert_eq!(err, RowRejection::MissingEmbedding { id: "a".to_string() });

      let err = row(serde_json::json!({"id": "b", "embedding": "[]"}))
         .into_record()
         .unwrap_err();
      assert_eq!(err, RowRejection::EmptyEmbedding { id: "b".to_string() });
   }

   #[test]
   fn rejects_malformed_text_embedding() {
      let err = row(serde_json::json!({"id": "a", "embedding": "[1.0, x]"}))
         .into_record()
         .unwrap_err();
      assert!(matches!(err, RowRejection::MalformedEmbedding { .. }));
   }

   #[test]
   fn bad_element_does_not_sink_its_page() {
      let body = br#"[
         {"id": "a", "embedding": [1.0, 2.0], "updated_at": "2024-05-01T10:00:00Z"},
         {"id": "b", "embedding": [1.0, null]},
         {"id": 7, "embedding": [1.0, 2.0], "updated_at": "not a time"},
         {"id": {"x": 1}, "embedding": [1.0, 2.0]},
         "not an object"
      ]"#;
      let rows = decode_rows(body).unwrap();
      assert_eq!(rows.len(), 5);

      let first = rows[0].clone().unwrap().into_record().unwrap();
      assert_eq!(first.id, "a");
      assert!(matches!(&rows[1], Err(RowRejection::Malformed { id: Some(id), .. }) if id == "b"));
      assert!(matches!(&rows[2], Err(RowRejection::Malformed { id: Some(id), .. }) if id == "7"));
      assert!(matches!(&rows[3], Err(RowRejection::Malformed { id: None, .. })));
      assert!(matches!(&rows[4], Err(RowRejection::Malformed { id: None, .. })));
   }

   #[test]
   fn non_array_body_is_an_error() {
      assert!(decode_rows(br#"{"message": "JWT expired"}"#).is_err());
      assert!(decode_rows(b"[{\"id\": ").is_err());
   }

   #[test]
   fn meta_roundtrips_through_parts() {
      let record = row(serde_json::json!({"id": "a", "title": "t", "embedding": [1.0, 2.0]}))
         .into_record()
         .unwrap();
      let rebuilt = KnowledgeRecord::from_parts(record.meta(), record.embedding.clone());
      assert_eq!(rebuilt, record);
   }
}

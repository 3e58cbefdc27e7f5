//! Paged retrieval of verified records changed since a bound.

use std::{collections::HashMap, time::Duration};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::{
   Result,
   error::{ConfigError, FetchError},
   remote::{PageQuery, RemoteStore},
   types::{KnowledgeRecord, RemoteRow},
};

#[derive(Debug, Clone)]
pub struct FetchOptions {
   /// Inclusive `updated_at` lower bound; `None` fetches everything verified.
   pub since:     Option<DateTime<Utc>>,
   pub page_size: usize,
   pub deadline:  Option<Duration>,
}

/// Validated records from one fetch, deduplicated by id.
#[derive(Debug, Clone)]
pub struct FetchBatch {
   pub records:     Vec<KnowledgeRecord>,
   pub quarantined: usize,
   pub pages:       usize,
   pub started_at:  DateTime<Utc>,
}

impl FetchBatch {
   pub fn max_updated_at(&self) -> Option<DateTime<Utc>> {
      self.records.iter().filter_map(|r| r.updated_at).max()
   }
}

/// Pulls every page until a short one arrives.
///
/// Any page error aborts the whole fetch and discards what was already read.
pub async fn fetch_changes<R>(remote: &R, opts: &FetchOptions) -> Result<FetchBatch>
where
   R: RemoteStore + ?Sized,
{
   if opts.page_size == 0 {
      return Err(
         ConfigError::Invalid { field: "page_size", reason: "must be positive".to_string() }.into(),
      );
   }

   let started_at = Utc::now();
   let batch = match opts.deadline {
      Some(deadline) => tokio::time::timeout(deadline, fetch_pages(remote, opts, started_at))
         .await
         .map_err(|_| FetchError::Timeout { after_ms: deadline.as_millis() as u64 })??,
      None => fetch_pages(remote, opts, started_at).await?,
   };
   Ok(batch)
}

async fn fetch_pages<R>(
   remote: &R,
   opts: &FetchOptions,
   started_at: DateTime<Utc>,
) -> Result<FetchBatch, FetchError>
where
   R: RemoteStore + ?Sized,
{
   let mut records: Vec<KnowledgeRecord> = Vec::new();
   let mut positions: HashMap<String, usize> = HashMap::new();
   let mut quarantined = 0;
   let mut page = 0;

   loop {
      page += 1;
      let offset = (page - 1) * opts.page_size;
      let query = PageQuery { since: opts.since, offset, limit: opts.page_size };
      let rows = remote
         .fetch_page(&query)
         .await
         .map_err(|e| FetchError::Page { page, offset, source: Box::new(e) })?;
      let received = rows.len();
      debug!(page, offset, rows = received, "fetched page");

      for row in rows {
         match row.and_then(RemoteRow::into_record) {
            Ok(record) => match positions.get(&record.id) {
               Some(&pos) => records[pos] = record,
               None => {
                  positions.insert(record.id.clone(), records.len());
                  records.push(record);
               },
            },
            Err(rejection) => {
               warn!(page, "quarantined row: {rejection}");
               quarantined += 1;
            },
         }
      }

      if received < opts.page_size {
         break;
      }
   }

   Ok(FetchBatch { records, quarantined, pages: page, started_at })
}

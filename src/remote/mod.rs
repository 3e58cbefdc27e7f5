//! Remote knowledge store abstraction.

mod rest;

use chrono::{DateTime, Utc};

pub use rest::RestStore;

use crate::{error::FetchError, types::DecodedRow};

/// One page of the verified-records query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageQuery {
   /// Inclusive lower bound on `updated_at`; `None` fetches every verified row.
   pub since:  Option<DateTime<Utc>>,
   pub offset: usize,
   pub limit:  usize,
}

/// Source of verified knowledge rows, ordered by `(updated_at, id)`.
///
/// Implementations return at most `limit` rows; fewer means the end was reached.
/// A row that fails to decode still occupies its slot as a rejection.
#[async_trait::async_trait]
pub trait RemoteStore: Send + Sync {
   async fn fetch_page(&self, query: &PageQuery) -> Result<Vec<DecodedRow>, FetchError>;
}

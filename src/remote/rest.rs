//! PostgREST client for the hosted knowledge table.

use chrono::SecondsFormat;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};

use super::{PageQuery, RemoteStore};
use crate::{
   Result,
   config::RemoteSettings,
   error::{ConfigError, FetchError},
   types::{DecodedRow, decode_rows},
};

const SELECT_COLUMNS: &str = "id,title,content,embedding,content_type,category,updated_at";
const ORDER: &str = "updated_at.asc,id.asc";
const MAX_ERROR_BODY: usize = 512;

pub struct RestStore {
   client:   reqwest::Client,
   endpoint: String,
}

impl RestStore {
   pub fn new(settings: &RemoteSettings) -> Result<Self> {
      let invalid_key = |e: reqwest::header::InvalidHeaderValue| ConfigError::Invalid {
         field:  "service_key",
         reason: format!("not a valid header value: {e}"),
      };
      let mut headers = HeaderMap::new();
      let key = HeaderValue::from_str(&settings.service_key).map_err(invalid_key)?;
      let bearer =
         HeaderValue::from_str(&format!("Bearer {}", settings.service_key)).map_err(invalid_key)?;
      headers.insert("apikey", key);
      headers.insert(AUTHORIZATION, bearer);

      let client = reqwest::Client::builder()
         .default_headers(headers)
         .timeout(settings.request_timeout)
         .build()
         .map_err(FetchError::from)?;
      Ok(Self { client, endpoint: format!("{}/rest/v1/{}", settings.url, settings.table) })
   }

   pub fn endpoint(&self) -> &str {
      &self.endpoint
   }
}

fn query_params(query: &PageQuery) -> Vec<(&'static str, String)> {
   let mut params = vec![
      ("select", SELECT_COLUMNS.to_string()),
      ("verified", "eq.true".to_string()),
   ];
   if let Some(since) = query.since {
      let bound = since.to_rfc3339_opts(SecondsFormat::Micros, true);
      params.push(("updated_at", format!("gte.{bound}")));
   }
   params.push(("order", ORDER.to_string()));
   params.push(("offset", query.offset.to_string()));
   params.push(("limit", query.limit.to_string()));
   params
}

fn truncate_body(body: &str) -> String {
   if body.len() <= MAX_ERROR_BODY {
      return body.to_string();
   }
   let mut end = MAX_ERROR_BODY;
   while !body.is_char_boundary(end) {
      end -= 1;
   }
   format!("{}...", &body[..end])
}

#[async_trait::async_trait]
impl RemoteStore for RestStore {
   async fn fetch_page(&self, query: &PageQuery) -> Result<Vec<DecodedRow>, FetchError> {
      let response = self
         .client
         .get(&self.endpoint)
         .query(&query_params(query))
         .send()
         .await?;

      let status = response.status();
      if !status.is_success() {
         let body = response.text().await.unwrap_or_default();
         return Err(FetchError::Status { status: status.as_u16(), body: truncate_body(&body) });
      }

      let bytes = response.bytes().await?;
      decode_rows(&bytes).map_err(FetchError::Decode)
   }
}

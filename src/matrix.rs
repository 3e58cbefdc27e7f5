//! Stacks per-record embeddings into one dense row-major matrix.

use ndarray::Array2;

use crate::{Result, error::Error, types::KnowledgeRecord};

/// Builds an `(records, dimension)` matrix; row `i` is record `i`'s embedding.
///
/// Empty input yields a `(0, 0)` matrix. When `expected_dim` is set every
/// record, the first included, must match it; otherwise the first record
/// fixes the dimension. A mismatch is never coerced.
pub fn build_matrix(records: &[KnowledgeRecord], expected_dim: Option<usize>) -> Result<Array2<f32>> {
   let Some(first) = records.first() else {
      return Ok(Array2::zeros((0, 0)));
   };

   let dim = expected_dim.unwrap_or(first.embedding.len());
   if first.embedding.is_empty() {
      return Err(Error::EmptyEmbedding { id: first.id.clone() });
   }

   let mut data = Vec::with_capacity(records.len() * dim);
   for record in records {
      if record.embedding.len() != dim {
         return Err(Error::DimensionMismatch {
            id:       record.id.clone(),
            expected: dim,
            found:    record.embedding.len(),
         });
      }
      data.extend_from_slice(&record.embedding);
   }

   let rows = records.len();
   Array2::from_shape_vec((rows, dim), data).map_err(|_| Error::DimensionMismatch {
      id:       first.id.clone(),
      expected: dim,
      found:    first.embedding.len(),
   })
}

/// Splits a matrix back into owned row vectors.
pub fn matrix_rows(matrix: &Array2<f32>) -> Vec<Vec<f32>> {
   matrix.rows().into_iter().map(|row| row.to_vec()).collect()
}

#[cfg(test)]
mod tests {
   use super::*;

   fn record(id: &str, embedding: Vec<f32>) -> KnowledgeRecord {
      KnowledgeRecord {
         id: id.to_string(),
         title: String::new(),
         content: String::new(),
         embedding,
         content_type: None,
         category: None,
         updated_at: None,
      }
   }

   #[test]
   fn empty_input_is_zero_by_zero() {
      let matrix = build_matrix(&[], None).unwrap();
      assert_eq!(matrix.dim(), (0, 0));
   }

   #[test]
   fn rows_follow_record_order() {
      let records = vec![record("a", vec![1.0, 2.0]), record("b", vec![3.0, 4.0])];
      let matrix = build_matrix(&records, None).unwrap();
      assert_eq!(matrix.dim(), (2, 2));
      assert_eq!(matrix.row(1).to_vec(), vec![3.0, 4.0]);
      assert_eq!(matrix_rows(&matrix), vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
   }

   #[test]
   fn mismatch_names_offending_record() {
      let records = vec![record("a", vec![1.0, 2.0]), record("b", vec![3.0])];
      let err = build_matrix(&records, None).unwrap_err();
      match err {
         Error::DimensionMismatch { id, expected, found } => {
            assert_eq!(id, "b");
            assert_eq!(expected, 2);
            assert_eq!(found, 1);
         },
         other => panic!("unexpected error: {other}"),
      }
   }

   #[test]
   fn configured_dimension_checks_first_record() {
      let records = vec![record("a", vec![1.0, 2.0])];
      let err = build_matrix(&records, Some(3)).unwrap_err();
      assert!(matches!(err, Error::DimensionMismatch { expected: 3, found: 2, .. }));
   }

   #[test]
   fn empty_embedding_rejected() {
      let records = vec![record("a", Vec::new())];
      assert!(matches!(build_matrix(&records, None), Err(Error::EmptyEmbedding { .. })));
   }
}

//! NumPy `.npy` (v1.0) encoding for the embedding matrix.
//!
//! Only the shape this crate writes is supported on read: little-endian
//! `f32`, C order, two dimensions.

use ndarray::Array2;

const MAGIC: &[u8; 6] = b"\x93NUMPY";
const HEADER_ALIGN: usize = 64;
const PREAMBLE_V1: usize = MAGIC.len() + 2 + 2;
const PREAMBLE_V2: usize = MAGIC.len() + 2 + 4;

/// Serializes `matrix` as a complete `.npy` file.
pub fn encode(matrix: &Array2<f32>) -> Vec<u8> {
   let (rows, cols) = matrix.dim();
   let mut header =
      format!("{{'descr': '<f4', 'fortran_order': False, 'shape': ({rows}, {cols}), }}");
   let unpadded = PREAMBLE_V1 + header.len() + 1;
   let padding = (HEADER_ALIGN - unpadded % HEADER_ALIGN) % HEADER_ALIGN;
   header.extend(std::iter::repeat_n(' ', padding));
   header.push('\n');

   let mut out = Vec::with_capacity(PREAMBLE_V1 + header.len() + rows * cols * 4);
   out.extend_from_slice(MAGIC);
   out.extend_from_slice(&[1, 0]);
   out.extend_from_slice(&(header.len() as u16).to_le_bytes());
   out.extend_from_slice(header.as_bytes());
   for value in matrix {
      out.extend_from_slice(&value.to_le_bytes());
   }
   out
}

/// Parses a `.npy` file produced by [`encode`] (or numpy with the same dtype).
pub fn decode(data: &[u8]) -> Result<Array2<f32>, String> {
   if data.len() < PREAMBLE_V1 || &data[..MAGIC.len()] != MAGIC {
      return Err("missing npy magic".to_string());
   }
   let major = data[MAGIC.len()];
   let (header_len, header_start) = match major {
      1 => (u16::from_le_bytes([data[8], data[9]]) as usize, PREAMBLE_V1),
      2 | 3 => {
         if data.len() < PREAMBLE_V2 {
            return Err("truncated npy preamble".to_string());
         }
         let len = u32::from_le_bytes([data[8], data[9], data[10], data[11]]) as usize;
         (len, PREAMBLE_V2)
      },
      other => return Err(format!("unsupported npy version {other}")),
   };
   let body_start = header_start + header_len;
   if data.len() < body_start {
      return Err("truncated npy header".to_string());
   }
   let header = std::str::from_utf8(&data[header_start..body_start])
      .map_err(|e| format!("npy header is not utf-8: {e}"))?;

   let descr = dict_value(header, "descr").ok_or("npy header has no descr")?;
   if !matches!(descr.trim_matches(|c| c == '\'' || c == '"'), "<f4" | "=f4") {
      return Err(format!("unsupported dtype {descr}"));
   }
   let fortran = dict_value(header, "fortran_order").ok_or("npy header has no fortran_order")?;
   if fortran != "False" {
      return Err("fortran-ordered arrays are not supported".to_string());
   }
   let (rows, cols) = parse_shape(header)?;

   let body = &data[body_start..];
   let expected = rows
      .checked_mul(cols)
      .and_then(|n| n.checked_mul(4))
      .ok_or("npy shape overflows")?;
   if body.len() != expected {
      return Err(format!(
         "npy body has {} bytes, shape ({rows}, {cols}) needs {expected}",
         body.len()
      ));
   }

   let values = body
      .chunks_exact(4)
      .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
      .collect();
   Array2::from_shape_vec((rows, cols), values).map_err(|e| e.to_string())
}

/// Reads the raw value text of `'key': value` from the header dict.
fn dict_value<'a>(header: &'a str, key: &str) -> Option<&'a str> {
   let needle = format!("'{key}':");
   let start = header.find(&needle)? + needle.len();
   let rest = header[start..].trim_start();
   let end = rest.find(',').unwrap_or(rest.len());
   Some(rest[..end].trim())
}

fn parse_shape(header: &str) -> Result<(usize, usize), String> {
   let start = header.find("'shape':").ok_or("npy header has no shape")?;
   let rest = &header[start..];
   let open = rest.find('(').ok_or("npy shape is not a tuple")?;
   let close = rest.find(')').ok_or("npy shape is not a tuple")?;
   let dims: Vec<usize> = rest[open + 1..close]
      .split(',')
      .map(str::trim)
      .filter(|s| !s.is_empty())
      .map(|s| s.parse::<usize>().map_err(|e| format!("invalid shape entry {s:?}: {e}")))
      .collect::<Result<_, _>>()?;
   match dims.as_slice() {
      [rows, cols] => Ok((*rows, *cols)),
      [0] | [] => Ok((0, 0)),
      other => Err(format!("expected a 2-d array, got shape {other:?}")),
   }
}

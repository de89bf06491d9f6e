//! Safetensors I/O for fitted models and denoised arrays.
//!
//! Writer: [`StWriter`] collects F64/I32 tensors and writes them in one
//! go. Reader: [`load_f64`] returns every numeric tensor widened to `f64`.
use ndarray::{ArrayBase, ArrayD, Data, Dimension, IxDyn};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

use crate::error::{Error, Result};

// ── Low-level header parsing ──────────────────────────────────────────────────

fn parse_header(bytes: &[u8]) -> Result<(HashMap<String, Value>, usize)> {
    let Some(len) = bytes.get(..8) else {
        return Err(Error::config("safetensors file too small"));
    };
    let mut n = [0u8; 8];
    n.copy_from_slice(len);
    let n = u64::from_le_bytes(n) as usize;
    let header_bytes = bytes
        .get(8..8 + n)
        .ok_or_else(|| Error::config("safetensors header runs past end of file"))?;
    let header: HashMap<String, Value> = serde_json::from_slice(header_bytes)?;
    Ok((header, 8 + n))
}

fn usize_list(entry: &Value, key: &str) -> Result<Vec<usize>> {
    entry[key]
        .as_array()
        .ok_or_else(|| Error::config(format!("tensor entry missing '{key}'")))?
        .iter()
        .map(|v| {
            v.as_u64()
                .map(|x| x as usize)
                .ok_or_else(|| Error::config(format!("non-integer in '{key}'")))
        })
        .collect()
}

fn decode(dtype: &str, raw: &[u8]) -> Option<Vec<f64>> {
    let v = match dtype {
        "F32" => raw
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64)
            .collect(),
        "F64" => raw
            .chunks_exact(8)
            .map(|b| f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
            .collect(),
        "I32" => raw
            .chunks_exact(4)
            .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64)
            .collect(),
        _ => return None,
    };
    Some(v)
}

// ── Reader ───────────────────────────────────────────────────────────────────

/// Load every F32/F64/I32 tensor of a safetensors file as `f64`.
///
/// Other dtypes and the `__metadata__` entry are skipped.
pub fn load_f64(path: &Path) -> Result<HashMap<String, ArrayD<f64>>> {
    let bytes = std::fs::read(path)?;
    let (header, data_start) = parse_header(&bytes)?;

    let mut out = HashMap::new();
    for (name, entry) in &header {
        if name == "__metadata__" {
            continue;
        }
        let dtype = entry["dtype"].as_str().unwrap_or_default();
        let offsets = usize_list(entry, "data_offsets")?;
        let shape = usize_list(entry, "shape")?;
        let (s, e) = match offsets[..] {
            [s, e] if s <= e => (data_start + s, data_start + e),
            _ => return Err(Error::config(format!("bad data_offsets for '{name}'"))),
        };
        let raw = bytes
            .get(s..e)
            .ok_or_else(|| Error::ShortRead { expected: e, got: bytes.len() })?;
        let Some(vals) = decode(dtype, raw) else {
            continue;
        };
        let arr = ArrayD::from_shape_vec(IxDyn(&shape), vals)
            .map_err(|err| Error::config(format!("tensor '{name}': {err}")))?;
        out.insert(name.clone(), arr);
    }
    Ok(out)
}

// ── Writer ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dtype {
    F64,
    I32,
}

impl Dtype {
    fn tag(self) -> &'static str {
        match self {
            Dtype::F64 => "F64",
            Dtype::I32 => "I32",
        }
    }
}

#[derive(Debug)]
struct Tensor {
    name: String,
    dtype: Dtype,
    shape: Vec<usize>,
    bytes: Vec<u8>,
}

/// Collects fitted matrices and denoised data, then writes them as one
/// safetensors file. Tensors keep insertion order in the payload.
///
/// ```rust,no_run
/// use exg_spatial::io::StWriter;
/// use ndarray::array;
/// use std::path::Path;
/// let mut w = StWriter::new();
/// w.add_array("filters_target", &array![[1.0, 0.0], [0.0, 1.0]]);
/// w.add_i32("classes", &[1, 2]);
/// w.write(Path::new("/tmp/xdawn.safetensors")).unwrap();
/// ```
#[derive(Debug, Default)]
pub struct StWriter {
    tensors: Vec<Tensor>,
}

impl StWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Row-major copy of an `f64` array of any rank.
    pub fn add_array<S, D>(&mut self, name: &str, arr: &ArrayBase<S, D>)
    where
        S: Data<Elem = f64>,
        D: Dimension,
    {
        let bytes = arr.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.push(name, Dtype::F64, arr.shape().to_vec(), bytes);
    }

    /// One-dimensional `i32` tensor (event codes).
    pub fn add_i32(&mut self, name: &str, data: &[i32]) {
        let bytes = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.push(name, Dtype::I32, vec![data.len()], bytes);
    }

    fn push(&mut self, name: &str, dtype: Dtype, shape: Vec<usize>, bytes: Vec<u8>) {
        self.tensors.push(Tensor { name: name.to_string(), dtype, shape, bytes });
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// Full file image: `u64` header length, JSON header padded with spaces
    /// to a multiple of 8, then the tensor payloads.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut header = serde_json::Map::new();
        let mut offset = 0;
        for t in &self.tensors {
            let entry = serde_json::json!({
                "dtype": t.dtype.tag(),
                "shape": t.shape,
                "data_offsets": [offset, offset + t.bytes.len()],
            });
            if header.insert(t.name.clone(), entry).is_some() {
                return Err(Error::config(format!("duplicate tensor name '{}'", t.name)));
            }
            offset += t.bytes.len();
        }
        let mut hdr = serde_json::to_vec(&header)?;
        hdr.resize(hdr.len().next_multiple_of(8), b' ');

        let mut out = Vec::with_capacity(8 + hdr.len() + offset);
        out.extend_from_slice(&(hdr.len() as u64).to_le_bytes());
        out.extend_from_slice(&hdr);
        for t in &self.tensors {
            out.extend_from_slice(&t.bytes);
        }
        Ok(out)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_bytes()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn written_tensors_load_back_as_f64() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.safetensors");
        let mut w = StWriter::new();
        w.add_array("filters_aud", &array![[1.0, -2.0], [0.5, 4.0]]);
        w.add_array("denoised", &ndarray::Array3::<f64>::from_elem((2, 1, 3), 0.25));
        w.add_i32("classes", &[1, 2, 5]);
        w.write(&path).unwrap();

        let t = load_f64(&path).unwrap();
        assert_eq!(t["filters_aud"].shape(), &[2, 2]);
        assert_eq!(t["filters_aud"][[0, 1]], -2.0);
        assert_eq!(t["denoised"].shape(), &[2, 1, 3]);
        assert_eq!(t["denoised"][[1, 0, 2]], 0.25);
        assert_eq!(t["classes"].iter().copied().collect::<Vec<_>>(), vec![1.0, 2.0, 5.0]);
    }

    #[test]
    fn header_is_padded_to_eight_bytes() {
        let mut w = StWriter::new();
        w.add_i32("c", &[7]);
        let bytes = w.to_bytes().unwrap();
        let n = u64::from_le_bytes(bytes[..8].try_into().unwrap()) as usize;
        assert_eq!(n % 8, 0);
        assert_eq!(bytes.len(), 8 + n + 4);
        assert_eq!(&bytes[8 + n..], &7i32.to_le_bytes());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut w = StWriter::new();
        w.add_i32("classes", &[1]);
        w.add_i32("classes", &[2]);
        assert!(matches!(w.to_bytes(), Err(Error::Config(_))));
    }

    #[test]
    fn truncated_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.safetensors");
        std::fs::write(&path, [1u8, 0, 0]).unwrap();
        assert!(matches!(load_f64(&path), Err(Error::Config(_))));
    }
}

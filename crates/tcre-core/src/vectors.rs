//! word2vec vector file reader (binary and text formats, optionally gzipped).

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use flate2::read::GzDecoder;
use tracing::info;

use crate::error::{Result, TcreError};

/// Largest vector dimension accepted from a file header.
pub const MAX_DIM: usize = 1 << 16;

/// Values preallocated up front; larger files grow as they are read.
const PREALLOC_VALUES: usize = 1 << 22;

/// Dense word vectors in file order, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct WordVectors {
    pub words: Vec<String>,
    pub dim: usize,
    pub data: Vec<f32>,
}

impl WordVectors {
    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Vector of the `i`-th word.
    pub fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.dim..(i + 1) * self.dim]
    }

    /// Load at most `limit` vectors.
    ///
    /// Files ending in `.txt` or `.vec` (before an optional `.gz`) are read as
    /// text; anything else as word2vec binary.
    pub fn load<P: AsRef<Path>>(path: P, limit: usize) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading word vectors from {:?} with vocab limit {}", path, limit);

        let file = File::open(path)?;
        let name = path.to_string_lossy().to_lowercase();
        let (reader, name): (Box<dyn Read>, &str) = match name.strip_suffix(".gz") {
            Some(stem) => (Box::new(GzDecoder::new(file)), stem),
            None => (Box::new(file), name.as_str()),
        };
        let mut reader = BufReader::new(reader);

        let vectors = if name.ends_with(".txt") || name.ends_with(".vec") {
            Self::read_text(&mut reader, limit)?
        } else {
            Self::read_binary(&mut reader, limit)?
        };
        info!("Loaded {} word vectors of dimension {}", vectors.len(), vectors.dim);
        Ok(vectors)
    }

    fn read_header<R: BufRead>(reader: &mut R) -> Result<(usize, usize)> {
        let mut header = String::new();
        reader.read_line(&mut header)?;
        let mut parts = header.split_whitespace().map(str::parse::<usize>);
        match (parts.next(), parts.next()) {
            (Some(Ok(_)), Some(Ok(dim))) if dim > MAX_DIM => Err(TcreError::Vectors(format!(
                "vector dimension {dim} exceeds the maximum of {MAX_DIM}"
            ))),
            (Some(Ok(count)), Some(Ok(dim))) if dim > 0 => Ok((count, dim)),
            _ => Err(TcreError::Vectors(format!("bad header line {:?}", header.trim()))),
        }
    }

    /// Binary layout: `"<count> <dim>\n"`, then per word `"<word> "` followed by
    /// `dim` little-endian f32 values and an optional newline.
    pub fn read_binary<R: BufRead>(reader: &mut R, limit: usize) -> Result<Self> {
        let (count, dim) = Self::read_header(reader)?;
        let n = count.min(limit);
        let rows = n.min(PREALLOC_VALUES / dim);
        let mut words = Vec::with_capacity(rows);
        let mut data = Vec::with_capacity(rows * dim);
        let mut word = Vec::new();
        let mut raw = vec![0u8; dim * std::mem::size_of::<f32>()];

        for _ in 0..n {
            word.clear();
            reader.read_until(b' ', &mut word)?;
            let text = String::from_utf8_lossy(&word);
            let text = text.trim();
            if text.is_empty() {
                return Err(TcreError::Vectors(format!(
                    "expected {n} vectors, file ended after {}",
                    words.len()
                )));
            }
            words.push(text.to_string());
            reader.read_exact(&mut raw)?;
            data.extend(
                raw.chunks_exact(4)
                    .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]])),
            );
        }

        Ok(Self { words, dim, data })
    }

    /// Text layout: header line, then `"<word> v1 .. vdim"` per line.
    pub fn read_text<R: BufRead>(reader: &mut R, limit: usize) -> Result<Self> {
        let (count, dim) = Self::read_header(reader)?;
        let n = count.min(limit);
        let rows = n.min(PREALLOC_VALUES / dim);
        let mut words = Vec::with_capacity(rows);
        let mut data = Vec::with_capacity(rows * dim);

        for line in reader.lines() {
            if words.len() >= n {
                break;
            }
            let line = line?;
            let mut parts = line.split_whitespace();
            let Some(word) = parts.next() else {
                continue;
            };
            let values = parts
                .map(str::parse::<f32>)
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| TcreError::Vectors(format!("bad value for {word:?}: {e}")))?;
            if values.len() != dim {
                return Err(TcreError::Vectors(format!(
                    "{word:?} has {} values, expected {dim}",
                    values.len()
                )));
            }
            words.push(word.to_string());
            data.extend(values);
        }

        Ok(Self { words, dim, data })
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Write};

    use flate2::write::GzEncoder;
    use flate2::Compression;

    use super::*;

    fn binary_file() -> Vec<u8> {
        let mut bytes = b"3 2\n".to_vec();
        for (word, v) in [("il-2", [1.0f32, 2.0]), ("cell", [0.5, -0.5]), ("tf", [3.0, 4.0])] {
            bytes.extend_from_slice(word.as_bytes());
            bytes.push(b' ');
            for x in v {
                bytes.extend_from_slice(&x.to_le_bytes());
            }
            bytes.push(b'\n');
        }
        bytes
    }

    #[test]
    fn reads_binary_with_limit() {
        let vectors = WordVectors::read_binary(&mut Cursor::new(binary_file()), 2).unwrap();
        assert_eq!(vectors.words, vec!["il-2", "cell"]);
        assert_eq!(vectors.dim, 2);
        assert_eq!(vectors.row(1), &[0.5, -0.5]);
    }

    #[test]
    fn reads_text() {
        let text = "2 3\nfoo 0.1 0.2 0.3\nbar 1 2 3\n";
        let vectors = WordVectors::read_text(&mut Cursor::new(text), 10).unwrap();
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors.row(1), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn rejects_oversized_header_dimension() {
        for header in ["3 18446744073709551615\n", "1000000000000 70000\n"] {
            let err = WordVectors::read_binary(&mut Cursor::new(header.as_bytes().to_vec()), usize::MAX).unwrap_err();
            assert!(matches!(err, TcreError::Vectors(_)), "{header:?}");
        }
    }

    #[test]
    fn huge_declared_count_is_read_lazily() {
        let text = "1000000000000 2\nfoo 0.5 1.5\n";
        let vectors = WordVectors::read_text(&mut Cursor::new(text), usize::MAX).unwrap();
        assert_eq!(vectors.words, vec!["foo"]);
        assert_eq!(vectors.row(0), &[0.5, 1.5]);
    }

    #[test]
    fn rejects_ragged_text_rows() {
        let text = "1 3\nfoo 0.1 0.2\n";
        assert!(matches!(
            WordVectors::read_text(&mut Cursor::new(text), 10),
            Err(TcreError::Vectors(_))
        ));
    }

    #[test]
    fn loads_gzipped_binary_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.bin.gz");
        let mut encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        encoder.write_all(&binary_file()).unwrap();
        encoder.finish().unwrap();

        let vectors = WordVectors::load(&path, 50_000).unwrap();
        assert_eq!(vectors.len(), 3);
        assert_eq!(vectors.row(2), &[3.0, 4.0]);
    }
}

//! Numeric factor files.
//!
//! Layout: the 7-byte magic `SPLUNUM`, one format version byte, then a gzip
//! stream holding a bincode record of the factor arrays. The column
//! permutation of the symbolic analysis is stored alongside when the pair is
//! saved together.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use bincode::Options;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::backend::{NumericFactor, SymbolicFactor};
use super::lu::{LuNumeric, LuSymbolic};
use super::ordering::ColumnOrdering;
use super::sparse::{self, SparseCsc};

const MAGIC: &[u8; 7] = b"SPLUNUM";
const FORMAT_VERSION: u8 = 1;

/// Upper bound on a decoded record, so a corrupt length prefix cannot
/// trigger a huge allocation.
const MAX_RECORD_BYTES: u64 = 1 << 36;

#[derive(Error, Debug)]
pub enum PersistError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid factor file: {0}")]
    Format(String),
}

#[derive(Debug, Serialize, Deserialize)]
struct CscRecord {
    col_ptr: Vec<usize>,
    row_idx: Vec<usize>,
    values: Vec<f64>,
}

impl CscRecord {
    fn from_matrix(m: &SparseCsc) -> Self {
        Self {
            col_ptr: m.indptr().to_proper().into_owned(),
            row_idx: m.indices().to_vec(),
            values: m.data().to_vec(),
        }
    }

    fn into_matrix(self, n: usize, name: &str) -> Result<SparseCsc, PersistError> {
        sparse::csc_from_unsorted(n, self.col_ptr, self.row_idx, self.values)
            .map_err(|e| PersistError::Format(format!("{}: {}", name, e)))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct FactorRecord {
    n: usize,
    pinv: Vec<usize>,
    l: CscRecord,
    u: CscRecord,
    symbolic: Option<SymbolicRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SymbolicRecord {
    q: Vec<usize>,
    ordering: ColumnOrdering,
}

impl FactorRecord {
    fn from_numeric<N: NumericFactor + ?Sized>(numeric: &N) -> Self {
        Self {
            n: numeric.dim(),
            pinv: numeric.row_permutation_inverse().to_vec(),
            l: CscRecord::from_matrix(numeric.lower()),
            u: CscRecord::from_matrix(numeric.upper()),
            symbolic: None,
        }
    }

    fn into_numeric(self) -> Result<(LuNumeric, Option<SymbolicRecord>), PersistError> {
        if self.pinv.len() != self.n {
            return Err(PersistError::Format(format!(
                "row permutation has length {} for n = {}",
                self.pinv.len(),
                self.n
            )));
        }
        let l = self.l.into_matrix(self.n, "L")?;
        let u = self.u.into_matrix(self.n, "U")?;
        let numeric = LuNumeric::from_parts(self.pinv, l, u)
            .map_err(|e| PersistError::Format(e.to_string()))?;
        Ok((numeric, self.symbolic))
    }
}

fn options() -> impl Options {
    bincode::DefaultOptions::new().with_limit(MAX_RECORD_BYTES)
}

fn write_record(record: &FactorRecord, path: &Path) -> Result<(), PersistError> {
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(MAGIC)?;
    writer.write_all(&[FORMAT_VERSION])?;

    let mut encoder = GzEncoder::new(writer, Compression::default());
    options().serialize_into(&mut encoder, record).map_err(|e| match *e {
        bincode::ErrorKind::Io(io) => PersistError::Io(io),
        other => PersistError::Format(format!("encoding failed: {}", other)),
    })?;
    encoder.finish()?.flush()?;
    Ok(())
}

fn read_record(path: &Path) -> Result<FactorRecord, PersistError> {
    let mut reader = BufReader::new(File::open(path)?);

    let mut header = [0u8; 8];
    reader.read_exact(&mut header).map_err(|e| match e.kind() {
        std::io::ErrorKind::UnexpectedEof => {
            PersistError::Format("file too short for header".to_string())
        }
        _ => PersistError::Io(e),
    })?;
    if &header[..7] != MAGIC {
        return Err(PersistError::Format("bad magic".to_string()));
    }
    if header[7] != FORMAT_VERSION {
        return Err(PersistError::Format(format!(
            "unsupported format version {} (expected {})",
            header[7], FORMAT_VERSION
        )));
    }

    // Corrupt gzip data surfaces as an I/O error inside bincode; it is still
    // a format problem.
    let decoder = GzDecoder::new(reader);
    options()
        .deserialize_from(decoder)
        .map_err(|e| PersistError::Format(format!("decoding failed: {}", e)))
}

/// Write a numeric factorization to `path`.
pub fn save_numeric<N: NumericFactor + ?Sized>(
    numeric: &N,
    path: impl AsRef<Path>,
) -> Result<(), PersistError> {
    let path = path.as_ref();
    write_record(&FactorRecord::from_numeric(numeric), path)?;
    log::debug!("saved numeric factor (n = {}) to {}", numeric.dim(), path.display());
    Ok(())
}

/// Read a numeric factorization written by [`save_numeric`] or
/// [`save_factorization`].
pub fn load_numeric(path: impl AsRef<Path>) -> Result<LuNumeric, PersistError> {
    let (numeric, _) = read_record(path.as_ref())?.into_numeric()?;
    Ok(numeric)
}

/// Write a symbolic analysis and its numeric factorization together.
pub fn save_factorization<N>(
    symbolic: &LuSymbolic,
    numeric: &N,
    path: impl AsRef<Path>,
) -> Result<(), PersistError>
where
    N: NumericFactor + ?Sized,
{
    if symbolic.dim() != numeric.dim() {
        return Err(PersistError::Format(format!(
            "symbolic analysis is for n = {}, numeric factor for n = {}",
            symbolic.dim(),
            numeric.dim()
        )));
    }
    let path = path.as_ref();
    let mut record = FactorRecord::from_numeric(numeric);
    record.symbolic = Some(SymbolicRecord {
        q: symbolic.column_permutation().to_vec(),
        ordering: symbolic.ordering(),
    });
    write_record(&record, path)?;
    log::debug!("saved factorization (n = {}) to {}", numeric.dim(), path.display());
    Ok(())
}

/// Read a pair written by [`save_factorization`].
pub fn load_factorization(path: impl AsRef<Path>) -> Result<(LuSymbolic, LuNumeric), PersistError> {
    let (numeric, symbolic) = read_record(path.as_ref())?.into_numeric()?;
    let symbolic = symbolic
        .ok_or_else(|| PersistError::Format("file holds no symbolic analysis".to_string()))?;
    if symbolic.q.len() != numeric.dim() {
        return Err(PersistError::Format(format!(
            "column permutation has length {} for n = {}",
            symbolic.q.len(),
            numeric.dim()
        )));
    }
    let symbolic = LuSymbolic::from_permutation(symbolic.q, symbolic.ordering)
        .map_err(|e| PersistError::Format(e.to_string()))?;
    Ok((symbolic, numeric))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::backend::FactorizationBackend;
    use crate::linalg::lu::NativeLu;
    use crate::linalg::solve::solve;
    use crate::linalg::sparse::from_triplets;
    use tempfile::NamedTempFile;

    fn factored() -> (SparseCsc, LuSymbolic, LuNumeric) {
        let a = from_triplets(
            4,
            4,
            vec![
                (0, 0, 1e-2),
                (1, 0, 3.0),
                (1, 1, 2.0),
                (2, 1, -1.0),
                (2, 2, 5.0),
                (0, 3, 1.0),
                (3, 3, 4.0),
                (3, 2, 0.5),
            ],
        );
        let backend = NativeLu::new();
        let s = backend.analyze(&a, ColumnOrdering::ReverseCuthillMcKee).unwrap();
        let f = backend.factorize(&a, &s, 0.1).unwrap();
        (a, s, f)
    }

    #[test]
    fn test_numeric_round_trip() {
        let (_, _, f) = factored();
        let file = NamedTempFile::new().unwrap();
        save_numeric(&f, file.path()).unwrap();
        let loaded = load_numeric(file.path()).unwrap();
        assert_eq!(loaded.row_permutation_inverse(), f.row_permutation_inverse());
        assert_eq!(loaded.lower(), f.lower());
        assert_eq!(loaded.upper(), f.upper());
    }

    #[test]
    fn test_factorization_round_trip_solves_identically() {
        let (_, s, f) = factored();
        let file = NamedTempFile::new().unwrap();
        save_factorization(&s, &f, file.path()).unwrap();
        let (s2, f2) = load_factorization(file.path()).unwrap();
        assert_eq!(s2.column_permutation(), s.column_permutation());
        assert_eq!(s2.ordering(), ColumnOrdering::ReverseCuthillMcKee);

        let b = [1.0, -2.0, 3.0, 0.25];
        let mut x1 = vec![0.0; 4];
        let mut x2 = vec![0.0; 4];
        solve(&s, &f, 4, &b, &mut x1).unwrap();
        solve(&s2, &f2, 4, &b, &mut x2).unwrap();
        for (a, b) in x1.iter().zip(&x2) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }

    #[test]
    fn test_numeric_only_file_has_no_symbolic() {
        let (_, _, f) = factored();
        let file = NamedTempFile::new().unwrap();
        save_numeric(&f, file.path()).unwrap();
        assert!(matches!(load_factorization(file.path()), Err(PersistError::Format(_))));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.splu");
        assert!(matches!(load_numeric(&path), Err(PersistError::Io(_))));
    }

    #[test]
    fn test_bad_header() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"NOTAFACTORFILE").unwrap();
        assert!(matches!(load_numeric(file.path()), Err(PersistError::Format(_))));

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"SPL").unwrap();
        assert!(matches!(load_numeric(file.path()), Err(PersistError::Format(_))));

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(MAGIC).unwrap();
        file.write_all(&[FORMAT_VERSION + 1]).unwrap();
        assert!(matches!(load_numeric(file.path()), Err(PersistError::Format(_))));
    }

    #[test]
    fn test_corrupt_payload() {
        let (_, _, f) = factored();
        let file = NamedTempFile::new().unwrap();
        save_numeric(&f, file.path()).unwrap();

        let mut bytes = std::fs::read(file.path()).unwrap();
        bytes.truncate(bytes.len() / 2);
        std::fs::write(file.path(), &bytes).unwrap();
        assert!(matches!(load_numeric(file.path()), Err(PersistError::Format(_))));
    }

    #[test]
    fn test_non_triangular_factor_rejected() {
        let (_, _, f) = factored();
        let mut record = FactorRecord::from_numeric(&f);
        let lower = from_triplets(
            4,
            4,
            vec![(0, 0, 1.0), (1, 1, 1.0), (2, 2, 1.0), (3, 3, 1.0), (3, 0, 2.0)],
        );
        record.u = CscRecord::from_matrix(&lower);
        let file = NamedTempFile::new().unwrap();
        write_record(&record, file.path()).unwrap();
        assert!(matches!(load_numeric(file.path()), Err(PersistError::Format(_))));
    }
}

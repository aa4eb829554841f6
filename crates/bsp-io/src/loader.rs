//! File loaders
//!
//! Each loader turns one file into a `samples × channels` matrix. The
//! [`LoaderRegistry`] picks a loader by file extension.

use bsp_core::{BspError, BspResult, MatrixLoader};
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use ndarray::Array2;
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Delimited text: one row per sample, one column per channel
///
/// A first row containing anything that does not parse as a number is
/// treated as a header and skipped.
#[derive(Debug, Clone, Copy)]
pub struct DelimitedLoader {
    delimiter: u8,
}

impl DelimitedLoader {
    pub fn new(delimiter: u8) -> Self {
        Self { delimiter }
    }

    pub fn csv() -> Self {
        Self::new(b',')
    }

    pub fn tsv() -> Self {
        Self::new(b'\t')
    }
}

impl MatrixLoader for DelimitedLoader {
    fn load(&self, path: &Path) -> BspResult<Array2<f32>> {
        let file = File::open(path)?;
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(false)
            .trim(csv::Trim::All)
            .flexible(true)
            .comment(Some(b'#'))
            .from_reader(file);

        let mut values = Vec::new();
        let mut channels = None;
        for (line, record) in reader.records().enumerate() {
            let record = record.map_err(|e| BspError::Parse {
                reason: format!("{}: {}", path.display(), e),
            })?;
            let fields: Vec<&str> = record.iter().filter(|f| !f.is_empty()).collect();
            if fields.is_empty() {
                continue;
            }

            let parsed: Result<Vec<f32>, _> = fields.iter().map(|f| f.parse::<f32>()).collect();
            let row = match parsed {
                Ok(row) => row,
                Err(_) if channels.is_none() => {
                    debug!(path = %path.display(), "Skipping header row");
                    continue;
                }
                Err(e) => {
                    return Err(BspError::Parse {
                        reason: format!("{} line {}: {}", path.display(), line + 1, e),
                    })
                }
            };

            match channels {
                None => channels = Some(row.len()),
                Some(expected) if expected != row.len() => {
                    return Err(BspError::Parse {
                        reason: format!(
                            "{} line {}: expected {} columns, found {}",
                            path.display(),
                            line + 1,
                            expected,
                            row.len()
                        ),
                    })
                }
                Some(_) => {}
            }
            values.extend(row);
        }

        let channels = channels.ok_or_else(|| BspError::Empty {
            reason: format!("{} contains no numeric rows", path.display()),
        })?;
        to_matrix(values, channels)
    }
}

fn to_matrix(values: Vec<f32>, channels: usize) -> BspResult<Array2<f32>> {
    let samples = values.len() / channels;
    Array2::from_shape_vec((samples, channels), values).map_err(|e| BspError::Shape {
        expected: format!("({}, {})", samples, channels),
        actual: e.to_string(),
    })
}

/// NumPy `.npy` array blob (1-D or 2-D, float or integer)
#[derive(Debug, Clone, Copy, Default)]
pub struct NpyLoader;

const NPY_MAGIC: &[u8] = b"\x93NUMPY";

#[derive(Debug, PartialEq)]
struct NpyHeader {
    descr: String,
    fortran_order: bool,
    shape: Vec<usize>,
}

impl NpyHeader {
    fn parse(text: &str) -> BspResult<Self> {
        let descr = quoted_value(text, "descr")
            .ok_or_else(|| npy_error("header has no 'descr'"))?
            .to_string();
        let fortran_order = text
            .split("'fortran_order':")
            .nth(1)
            .map(|rest| rest.trim_start().starts_with("True"))
            .ok_or_else(|| npy_error("header has no 'fortran_order'"))?;

        let shape_text = text
            .split("'shape':")
            .nth(1)
            .and_then(|rest| {
                let open = rest.find('(')?;
                let close = rest.find(')')?;
                rest.get(open + 1..close)
            })
            .ok_or_else(|| npy_error("header has no 'shape'"))?;
        let shape = shape_text
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<usize>().map_err(|_| npy_error(format!("bad dimension '{}'", s))))
            .collect::<BspResult<Vec<_>>>()?;

        Ok(Self {
            descr,
            fortran_order,
            shape,
        })
    }
}

fn quoted_value<'t>(text: &'t str, key: &str) -> Option<&'t str> {
    let rest = text.split(&format!("'{}':", key)).nth(1)?;
    let start = rest.find('\'')? + 1;
    let len = rest[start..].find('\'')?;
    Some(&rest[start..start + len])
}

fn npy_error(reason: impl fmt::Display) -> BspError {
    BspError::Parse {
        reason: format!("npy: {}", reason),
    }
}

/// Decode `count` elements of dtype `descr` into f32
fn npy_values(descr: &str, data: &[u8], count: usize) -> BspResult<Vec<f32>> {
    if descr.len() < 3 || !descr.is_ascii() {
        return Err(npy_error(format!("unknown dtype '{}'", descr)));
    }
    let (order, kind) = descr.split_at(1);
    let little = match order {
        "<" | "|" | "=" => true,
        ">" => false,
        _ => return Err(npy_error(format!("unknown byte order in '{}'", descr))),
    };
    let width: usize = kind[1..].parse().map_err(|_| npy_error(format!("unknown dtype '{}'", descr)))?;
    if width == 0 {
        return Err(npy_error(format!("unsupported dtype '{}'", descr)));
    }
    let needed = count
        .checked_mul(width)
        .ok_or_else(|| npy_error(format!("shape of {} values overflows the address space", count)))?;
    if data.len() < needed {
        return Err(npy_error(format!("payload holds {} bytes, shape needs {}", data.len(), needed)));
    }

    let chunks = data.chunks_exact(width).take(count);
    let values = match (&kind[..1], width, little) {
        ("f", 4, true) => chunks.map(|b| LittleEndian::read_f32(b)).collect(),
        ("f", 4, false) => chunks.map(|b| BigEndian::read_f32(b)).collect(),
        ("f", 8, true) => chunks.map(|b| LittleEndian::read_f64(b) as f32).collect(),
        ("f", 8, false) => chunks.map(|b| BigEndian::read_f64(b) as f32).collect(),
        ("i", 2, true) => chunks.map(|b| LittleEndian::read_i16(b) as f32).collect(),
        ("i", 2, false) => chunks.map(|b| BigEndian::read_i16(b) as f32).collect(),
        ("i", 4, true) => chunks.map(|b| LittleEndian::read_i32(b) as f32).collect(),
        ("i", 4, false) => chunks.map(|b| BigEndian::read_i32(b) as f32).collect(),
        ("i", 8, true) => chunks.map(|b| LittleEndian::read_i64(b) as f32).collect(),
        ("i", 8, false) => chunks.map(|b| BigEndian::read_i64(b) as f32).collect(),
        _ => return Err(npy_error(format!("unsupported dtype '{}'", descr))),
    };
    Ok(values)
}

impl NpyLoader {
    /// Parse an in-memory `.npy` blob
    pub fn parse(bytes: &[u8]) -> BspResult<Array2<f32>> {
        if bytes.len() < 10 || &bytes[..6] != NPY_MAGIC {
            return Err(npy_error("missing magic string"));
        }
        let (header_len, header_start): (usize, usize) = match bytes[6] {
            1 => (LittleEndian::read_u16(&bytes[8..10]) as usize, 10),
            2 | 3 if bytes.len() >= 12 => (LittleEndian::read_u32(&bytes[8..12]) as usize, 12),
            version => return Err(npy_error(format!("unsupported format version {}", version))),
        };
        let header_end = header_start
            .checked_add(header_len)
            .ok_or_else(|| npy_error("truncated header"))?;
        let text = bytes
            .get(header_start..header_end)
            .and_then(|h| std::str::from_utf8(h).ok())
            .ok_or_else(|| npy_error("truncated header"))?;
        let header = NpyHeader::parse(text)?;

        let (samples, channels) = match header.shape.as_slice() {
            [n] => (*n, 1),
            [n, c] => (*n, *c),
            other => {
                return Err(BspError::Shape {
                    expected: "1- or 2-dimensional array".to_string(),
                    actual: format!("shape {:?}", other),
                })
            }
        };
        let count = samples
            .checked_mul(channels)
            .ok_or_else(|| npy_error(format!("shape ({}, {}) overflows the address space", samples, channels)))?;
        let values = npy_values(&header.descr, &bytes[header_end..], count)?;

        if header.fortran_order {
            // Column-major on disk
            let matrix = Array2::from_shape_vec((channels, samples), values)
                .map_err(|e| npy_error(e))?;
            Ok(matrix.reversed_axes().as_standard_layout().to_owned())
        } else {
            to_matrix(values, channels.max(1))
        }
    }
}

impl MatrixLoader for NpyLoader {
    fn load(&self, path: &Path) -> BspResult<Array2<f32>> {
        let bytes = std::fs::read(path)?;
        Self::parse(&bytes).map_err(|e| match e {
            BspError::Parse { reason } => BspError::Parse {
                reason: format!("{}: {}", path.display(), reason),
            },
            other => other,
        })
    }
}

/// Extension-dispatched set of loaders
#[derive(Clone)]
pub struct LoaderRegistry {
    loaders: HashMap<String, Arc<dyn MatrixLoader>>,
}

impl LoaderRegistry {
    /// Registry without any loader
    pub fn empty() -> Self {
        Self {
            loaders: HashMap::new(),
        }
    }

    /// Registry with the built-in loaders: `csv`, `tsv`, `txt`, `npy`
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register("csv", Arc::new(DelimitedLoader::csv()));
        registry.register("tsv", Arc::new(DelimitedLoader::tsv()));
        registry.register("txt", Arc::new(DelimitedLoader::tsv()));
        registry.register("npy", Arc::new(NpyLoader));
        registry
    }

    /// Add or replace the loader for an extension (case-insensitive)
    pub fn register(&mut self, extension: &str, loader: Arc<dyn MatrixLoader>) {
        self.loaders.insert(extension.to_lowercase(), loader);
    }

    pub fn supported_extensions(&self) -> Vec<&str> {
        let mut extensions: Vec<&str> = self.loaders.keys().map(String::as_str).collect();
        extensions.sort_unstable();
        extensions
    }

    pub fn is_supported(&self, path: &Path) -> bool {
        self.loader_for(path).is_ok()
    }

    /// Loader for a path, chosen by its extension
    pub fn loader_for(&self, path: &Path) -> BspResult<Arc<dyn MatrixLoader>> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();
        self.loaders
            .get(&extension)
            .cloned()
            .ok_or(BspError::UnsupportedFormat { extension })
    }

    pub fn load(&self, path: &Path) -> BspResult<Array2<f32>> {
        self.loader_for(path)?.load(path)
    }
}

impl Default for LoaderRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl fmt::Debug for LoaderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoaderRegistry")
            .field("extensions", &self.supported_extensions())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{tempdir, NamedTempFile};

    /// Build a version 1 `.npy` blob
    fn npy_blob(descr: &str, fortran: bool, shape: &str, payload: &[u8]) -> Vec<u8> {
        let mut header = format!(
            "{{'descr': '{}', 'fortran_order': {}, 'shape': {}, }}",
            descr,
            if fortran { "True" } else { "False" },
            shape
        );
        while (10 + header.len() + 1) % 64 != 0 {
            header.push(' ');
        }
        header.push('\n');

        let mut bytes = NPY_MAGIC.to_vec();
        bytes.extend_from_slice(&[1, 0]);
        bytes.extend_from_slice(&(header.len() as u16).to_le_bytes());
        bytes.extend_from_slice(header.as_bytes());
        bytes.extend_from_slice(payload);
        bytes
    }

    fn f32_payload(values: &[f32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn test_csv_with_header() {
        let mut file = NamedTempFile::with_suffix(".csv").unwrap();
        writeln!(file, "flexor, extensor").unwrap();
        writeln!(file, "1.0, 2.0").unwrap();
        writeln!(file, "# calibration pause").unwrap();
        writeln!(file, "3.5,-4").unwrap();

        let matrix = DelimitedLoader::csv().load(file.path()).unwrap();
        assert_eq!(matrix.dim(), (2, 2));
        assert_eq!(matrix[[1, 0]], 3.5);
        assert_eq!(matrix[[1, 1]], -4.0);
    }

    #[test]
    fn test_csv_ragged_rows_fail() {
        let mut file = NamedTempFile::with_suffix(".csv").unwrap();
        writeln!(file, "1,2\n3").unwrap();
        let result = DelimitedLoader::csv().load(file.path());
        assert!(result.is_err());

        let mut file = NamedTempFile::with_suffix(".csv").unwrap();
        writeln!(file, "a,b").unwrap();
        assert!(matches!(DelimitedLoader::csv().load(file.path()), Err(BspError::Empty { .. })));
    }

    #[test]
    fn test_tsv() {
        let mut file = NamedTempFile::with_suffix(".tsv").unwrap();
        writeln!(file, "1\t2\t3\n4\t5\t6").unwrap();
        let matrix = DelimitedLoader::tsv().load(file.path()).unwrap();
        assert_eq!(matrix.dim(), (2, 3));
        assert_eq!(matrix[[1, 2]], 6.0);
    }

    #[test]
    fn test_npy_row_major() {
        let bytes = npy_blob("<f4", false, "(3, 2)", &f32_payload(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]));
        let matrix = NpyLoader::parse(&bytes).unwrap();
        assert_eq!(matrix.dim(), (3, 2));
        assert_eq!(matrix[[2, 1]], 6.0);
    }

    #[test]
    fn test_npy_fortran_order_and_f64() {
        let payload: Vec<u8> = [1.0f64, 3.0, 5.0, 2.0, 4.0, 6.0]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let bytes = npy_blob("<f8", true, "(3, 2)", &payload);
        let matrix = NpyLoader::parse(&bytes).unwrap();
        assert_eq!(matrix.dim(), (3, 2));
        assert_eq!(matrix.row(0).to_vec(), vec![1.0, 2.0]);
        assert_eq!(matrix.row(2).to_vec(), vec![5.0, 6.0]);
    }

    #[test]
    fn test_npy_vector_and_errors() {
        let payload: Vec<u8> = [7i16, -8].iter().flat_map(|v| v.to_le_bytes()).collect();
        let matrix = NpyLoader::parse(&npy_blob("<i2", false, "(2,)", &payload)).unwrap();
        assert_eq!(matrix.dim(), (2, 1));
        assert_eq!(matrix[[1, 0]], -8.0);

        assert!(NpyLoader::parse(b"not numpy").is_err());
        let cube = npy_blob("<f4", false, "(1, 1, 1)", &f32_payload(&[0.0]));
        assert!(matches!(NpyLoader::parse(&cube), Err(BspError::Shape { .. })));
        let short = npy_blob("<f4", false, "(4, 2)", &f32_payload(&[0.0; 3]));
        assert!(matches!(NpyLoader::parse(&short), Err(BspError::Parse { .. })));
        let complex = npy_blob("<c8", false, "(1,)", &[0; 8]);
        assert!(NpyLoader::parse(&complex).is_err());
    }

    #[test]
    fn test_npy_oversized_shape_is_a_parse_error() {
        let shape = format!("({}, 2)", usize::MAX);
        let bytes = npy_blob("<f4", false, &shape, &f32_payload(&[0.0; 4]));
        assert!(matches!(NpyLoader::parse(&bytes), Err(BspError::Parse { .. })));

        let shape = format!("({},)", usize::MAX / 4);
        let bytes = npy_blob("<f8", false, &shape, &[0; 16]);
        assert!(matches!(NpyLoader::parse(&bytes), Err(BspError::Parse { .. })));

        let zero_width = npy_blob("<f0", false, "(2,)", &[]);
        assert!(matches!(NpyLoader::parse(&zero_width), Err(BspError::Parse { .. })));
    }

    #[test]
    fn test_registry_dispatch() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("RUN.CSV");
        std::fs::write(&path, "1,2\n3,4\n").unwrap();

        let registry = LoaderRegistry::with_defaults();
        assert_eq!(registry.supported_extensions(), vec!["csv", "npy", "tsv", "txt"]);
        assert_eq!(registry.load(&path).unwrap().dim(), (2, 2));

        let unknown = registry.load(&dir.path().join("run.edf"));
        assert!(matches!(unknown, Err(BspError::UnsupportedFormat { ref extension }) if extension == "edf"));
        assert!(!registry.is_supported(Path::new("noextension")));
    }

    #[test]
    fn test_registry_custom_loader() {
        struct Constant;
        impl MatrixLoader for Constant {
            fn load(&self, _path: &Path) -> BspResult<Array2<f32>> {
                Ok(Array2::ones((4, 1)))
            }
        }

        let mut registry = LoaderRegistry::empty();
        registry.register("BIN", Arc::new(Constant));
        assert_eq!(registry.load(Path::new("x.bin")).unwrap().dim(), (4, 1));
    }
}

//! NumPy bundle reader
//!
//! A `.npz` bundle is a zip archive whose members are `.npy` files, one per
//! array. Only the subset of the NPY format the dataset bundles use is
//! supported: C-ordered arrays of fixed-width numbers or strings.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use tracing::debug;
use zip::ZipArchive;

use crate::utils::error::{LangIdError, Result};

const NPY_MAGIC: &[u8] = b"\x93NUMPY";

/// Upper bound on the buffer reserved up front for one member
const MAX_PREALLOC: usize = 64 * 1024 * 1024;

/// Decoded array payload
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayData {
    /// Any numeric dtype, widened or narrowed to f32
    Numeric(Vec<f32>),
    /// Fixed-width unicode (`U`) or byte (`S`) strings
    Text(Vec<String>),
}

/// One array read from a bundle
#[derive(Debug, Clone)]
pub struct NpyArray {
    pub name: String,
    pub descr: String,
    pub shape: Vec<usize>,
    pub data: ArrayData,
}

impl NpyArray {
    /// Parse the bytes of a `.npy` file
    pub fn parse(name: &str, bytes: &[u8]) -> Result<Self> {
        let malformed = |reason: &str| LangIdError::MalformedArray {
            array: name.to_string(),
            reason: reason.to_string(),
        };

        if bytes.len() < 10 || &bytes[..6] != NPY_MAGIC {
            return Err(malformed("missing NPY magic string"));
        }

        let major = bytes[6];
        let (header_len, header_start) = match major {
            1 => (u16::from_le_bytes([bytes[8], bytes[9]]) as usize, 10),
            2 | 3 => {
                if bytes.len() < 12 {
                    return Err(malformed("truncated header length"));
                }
                let len = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
                (len as usize, 12)
            }
            v => return Err(malformed(&format!("unsupported NPY version {}", v))),
        };

        let header_end = header_start + header_len;
        if bytes.len() < header_end {
            return Err(malformed("truncated header"));
        }
        let header = std::str::from_utf8(&bytes[header_start..header_end])
            .map_err(|_| malformed("header is not valid UTF-8"))?;
        let header = NpyHeader::parse(header).map_err(|reason| malformed(&reason))?;

        if header.fortran_order {
            return Err(malformed("Fortran-ordered arrays are not supported"));
        }

        let dtype = Dtype::parse(&header.descr).ok_or_else(|| LangIdError::UnsupportedDtype {
            array: name.to_string(),
            descr: header.descr.clone(),
        })?;

        let expected = header
            .shape
            .iter()
            .try_fold(dtype.item_size(), |acc, &dim| acc.checked_mul(dim))
            .ok_or_else(|| malformed(&format!("shape {:?} overflows", header.shape)))?;
        let payload = &bytes[header_end..];
        if payload.len() != expected {
            return Err(malformed(&format!(
                "payload is {} bytes, shape {:?} of '{}' needs {}",
                payload.len(),
                header.shape,
                header.descr,
                expected
            )));
        }

        let data = dtype.decode(payload).map_err(|reason| malformed(&reason))?;
        debug!("Decoded array '{}' {:?} ({})", name, header.shape, header.descr);

        Ok(Self {
            name: name.to_string(),
            descr: header.descr,
            shape: header.shape,
            data,
        })
    }

    /// Length of the first axis
    pub fn len(&self) -> usize {
        self.shape.first().copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take the numeric payload, failing for string arrays
    pub fn into_numeric(self) -> Result<Vec<f32>> {
        match self.data {
            ArrayData::Numeric(values) => Ok(values),
            ArrayData::Text(_) => Err(LangIdError::MalformedArray {
                array: self.name,
                reason: "expected a numeric array, found strings".to_string(),
            }),
        }
    }

    /// Take the string payload, failing for numeric arrays
    pub fn into_text(self) -> Result<Vec<String>> {
        match self.data {
            ArrayData::Text(values) => Ok(values),
            ArrayData::Numeric(_) => Err(LangIdError::MalformedArray {
                array: self.name,
                reason: "expected a string array, found numbers".to_string(),
            }),
        }
    }
}

/// The dict stored in an NPY header
#[derive(Debug, Clone, PartialEq)]
struct NpyHeader {
    descr: String,
    fortran_order: bool,
    shape: Vec<usize>,
}

impl NpyHeader {
    /// Parse e.g. `{'descr': '<f4', 'fortran_order': False, 'shape': (3, 36864), }`
    fn parse(header: &str) -> std::result::Result<Self, String> {
        let descr = value_after(header, "descr")?;
        let descr = descr
            .strip_prefix('\'')
            .and_then(|rest| rest.split('\'').next())
            .ok_or_else(|| format!("descr is not a quoted string: {}", descr))?
            .to_string();

        let fortran = value_after(header, "fortran_order")?;
        let fortran_order = if fortran.starts_with("True") {
            true
        } else if fortran.starts_with("False") {
            false
        } else {
            return Err(format!("fortran_order is not a bool: {}", fortran));
        };

        let shape = value_after(header, "shape")?;
        let inner = shape
            .strip_prefix('(')
            .and_then(|rest| rest.split(')').next())
            .ok_or_else(|| format!("shape is not a tuple: {}", shape))?;
        let shape = inner
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.trim_end_matches('L').parse::<usize>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| format!("bad shape dimension: {}", e))?;

        Ok(Self {
            descr,
            fortran_order,
            shape,
        })
    }
}

/// Text following `'key':` in the header, leading whitespace removed
fn value_after<'a>(header: &'a str, key: &str) -> std::result::Result<&'a str, String> {
    let needle = format!("'{}':", key);
    let pos = header
        .find(&needle)
        .ok_or_else(|| format!("header has no '{}' key", key))?;
    Ok(header[pos + needle.len()..].trim_start())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endian {
    Little,
    Big,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Float,
    Int,
    Uint,
    Unicode,
    Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Dtype {
    endian: Endian,
    kind: Kind,
    /// Bytes per element for numbers, characters per element for strings
    width: usize,
}

impl Dtype {
    fn parse(descr: &str) -> Option<Self> {
        let mut chars = descr.chars();
        let endian = match chars.next()? {
            '<' => Endian::Little,
            '>' => Endian::Big,
            '|' | '=' => {
                if cfg!(target_endian = "big") {
                    Endian::Big
                } else {
                    Endian::Little
                }
            }
            _ => return None,
        };
        let kind = match chars.next()? {
            'f' => Kind::Float,
            'i' => Kind::Int,
            'u' => Kind::Uint,
            'U' => Kind::Unicode,
            'S' => Kind::Bytes,
            _ => return None,
        };
        let width: usize = chars.as_str().parse().ok()?;

        let valid = match kind {
            Kind::Float => matches!(width, 4 | 8),
            Kind::Int | Kind::Uint => matches!(width, 1 | 2 | 4 | 8),
            Kind::Unicode | Kind::Bytes => width > 0,
        };
        valid.then_some(Self { endian, kind, width })
    }

    fn item_size(&self) -> usize {
        match self.kind {
            Kind::Unicode => self.width * 4,
            _ => self.width,
        }
    }

    fn decode(&self, payload: &[u8]) -> std::result::Result<ArrayData, String> {
        let size = self.item_size();
        let chunks = payload.chunks_exact(size);

        macro_rules! numbers {
            ($ty:ty) => {
                chunks
                    .map(|c| {
                        let mut buf = [0u8; std::mem::size_of::<$ty>()];
                        buf.copy_from_slice(c);
                        let v = match self.endian {
                            Endian::Little => <$ty>::from_le_bytes(buf),
                            Endian::Big => <$ty>::from_be_bytes(buf),
                        };
                        v as f32
                    })
                    .collect()
            };
        }

        let data = match (self.kind, self.width) {
            (Kind::Float, 4) => ArrayData::Numeric(numbers!(f32)),
            (Kind::Float, 8) => ArrayData::Numeric(numbers!(f64)),
            (Kind::Uint, 1) => ArrayData::Numeric(payload.iter().map(|&b| b as f32).collect()),
            (Kind::Int, 1) => ArrayData::Numeric(payload.iter().map(|&b| b as i8 as f32).collect()),
            (Kind::Uint, 2) => ArrayData::Numeric(numbers!(u16)),
            (Kind::Int, 2) => ArrayData::Numeric(numbers!(i16)),
            (Kind::Uint, 4) => ArrayData::Numeric(numbers!(u32)),
            (Kind::Int, 4) => ArrayData::Numeric(numbers!(i32)),
            (Kind::Uint, 8) => ArrayData::Numeric(numbers!(u64)),
            (Kind::Int, 8) => ArrayData::Numeric(numbers!(i64)),
            (Kind::Unicode, _) => {
                let mut values = Vec::with_capacity(payload.len() / size.max(1));
                for item in chunks {
                    let mut s = String::with_capacity(self.width);
                    for c in item.chunks_exact(4) {
                        let code = match self.endian {
                            Endian::Little => u32::from_le_bytes([c[0], c[1], c[2], c[3]]),
                            Endian::Big => u32::from_be_bytes([c[0], c[1], c[2], c[3]]),
                        };
                        if code == 0 {
                            break;
                        }
                        let ch = char::from_u32(code)
                            .ok_or_else(|| format!("invalid code point {:#x}", code))?;
                        s.push(ch);
                    }
                    values.push(s);
                }
                ArrayData::Text(values)
            }
            (Kind::Bytes, _) => ArrayData::Text(
                chunks
                    .map(|item| {
                        let end = item.iter().position(|&b| b == 0).unwrap_or(item.len());
                        String::from_utf8_lossy(&item[..end]).into_owned()
                    })
                    .collect(),
            ),
            (kind, width) => return Err(format!("no decoder for {:?} of width {}", kind, width)),
        };

        Ok(data)
    }
}

/// An opened `.npz` bundle
pub struct NpzArchive {
    path: PathBuf,
    archive: ZipArchive<BufReader<File>>,
}

impl NpzArchive {
    /// Open a bundle from disk
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(LangIdError::BundleNotFound(path));
        }

        let file = File::open(&path)?;
        let archive = ZipArchive::new(BufReader::new(file)).map_err(|source| {
            LangIdError::Archive {
                path: path.clone(),
                source,
            }
        })?;

        let npz = Self { path, archive };
        debug!("Opened {:?} with arrays {:?}", npz.path, npz.array_names());
        Ok(npz)
    }

    /// Names of the arrays in the bundle (without the `.npy` suffix)
    pub fn array_names(&self) -> Vec<String> {
        self.archive
            .file_names()
            .map(|n| n.trim_end_matches(".npy").to_string())
            .collect()
    }

    /// Read and decode one array
    pub fn read_array(&mut self, name: &str) -> Result<NpyArray> {
        let member = format!("{}.npy", name);
        let mut file = match self.archive.by_name(&member) {
            Ok(file) => file,
            Err(zip::result::ZipError::FileNotFound) => {
                return Err(LangIdError::MissingArray {
                    path: self.path.clone(),
                    array: name.to_string(),
                })
            }
            Err(source) => {
                return Err(LangIdError::Archive {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        // Reported size comes from the zip header and is not trusted
        let capacity = usize::try_from(file.size()).map_or(MAX_PREALLOC, |n| n.min(MAX_PREALLOC));
        let mut bytes = Vec::with_capacity(capacity);
        file.read_to_end(&mut bytes)?;
        NpyArray::parse(name, &bytes)
    }
}

/// Builders for synthetic bundles used by the crate's tests
#[cfg(test)]
pub(crate) mod testing {
    use std::io::Write;
    use std::path::{Path, PathBuf};

    use zip::write::SimpleFileOptions;

    /// Encode an array as `.npy` bytes (version 1.0)
    pub fn npy_bytes(descr: &str, shape: &[usize], payload: &[u8]) -> Vec<u8> {
        let dims: Vec<String> = shape.iter().map(|d| d.to_string()).collect();
        let shape = match dims.len() {
            1 => format!("({},)", dims[0]),
            _ => format!("({})", dims.join(", ")),
        };
        let mut header = format!(
            "{{'descr': '{}', 'fortran_order': False, 'shape': {}, }}",
            descr, shape
        );
        // Pad so the payload starts on a 64-byte boundary, newline-terminated
        while (10 + header.len() + 1) % 64 != 0 {
            header.push(' ');
        }
        header.push('\n');

        let mut out = Vec::new();
        out.extend_from_slice(b"\x93NUMPY\x01\x00");
        out.extend_from_slice(&(header.len() as u16).to_le_bytes());
        out.extend_from_slice(header.as_bytes());
        out.extend_from_slice(payload);
        out
    }

    /// Encode strings as a `<U{width}` payload
    pub fn unicode_payload(values: &[&str], width: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(values.len() * width * 4);
        for v in values {
            let mut chars: Vec<u32> = v.chars().map(|c| c as u32).collect();
            chars.resize(width, 0);
            for c in chars {
                out.extend_from_slice(&c.to_le_bytes());
            }
        }
        out
    }

    /// Write a bundle with `labels` rows (`<U`) and `u1` feature rows
    pub fn write_bundle(path: &Path, rows: &[[&str; 3]], features: &[Vec<u8>]) -> PathBuf {
        let width = rows
            .iter()
            .flat_map(|r| r.iter().map(|s| s.chars().count()))
            .max()
            .unwrap_or(1)
            .max(1);
        let flat: Vec<&str> = rows.iter().flat_map(|r| r.iter().copied()).collect();
        let labels = npy_bytes(
            &format!("<U{}", width),
            &[rows.len(), 3],
            &unicode_payload(&flat, width),
        );

        let row_len = features.first().map(Vec::len).unwrap_or(0);
        let payload: Vec<u8> = features.iter().flatten().copied().collect();
        let features = npy_bytes("|u1", &[features.len(), row_len], &payload);

        write_members(path, &[("labels.npy", labels), ("features.npy", features)]);
        path.to_path_buf()
    }

    /// Write arbitrary members into a zip archive
    pub fn write_members(path: &Path, members: &[(&str, Vec<u8>)]) {
        let file = std::fs::File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        for (name, bytes) in members {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(bytes).unwrap();
        }
        zip.finish().unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_header_parse() {
        let header =
            NpyHeader::parse("{'descr': '<f4', 'fortran_order': False, 'shape': (3, 36864), }")
                .unwrap();
        assert_eq!(header.descr, "<f4");
        assert!(!header.fortran_order);
        assert_eq!(header.shape, vec![3, 36864]);

        let header = NpyHeader::parse("{'descr': '|u1', 'fortran_order': True, 'shape': (5,), }")
            .unwrap();
        assert!(header.fortran_order);
        assert_eq!(header.shape, vec![5]);
    }

    #[test]
    fn test_dtype_parse() {
        assert!(Dtype::parse("<f4").is_some());
        assert!(Dtype::parse("|u1").is_some());
        assert_eq!(Dtype::parse("<U12").map(|d| d.item_size()), Some(48));
        assert!(Dtype::parse("|O").is_none());
        assert!(Dtype::parse("<f2").is_none());
    }

    #[test]
    fn test_parse_numeric_array() {
        let payload: Vec<u8> = [1.5f32, -2.0, 255.0]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let bytes = npy_bytes("<f4", &[3], &payload);

        let array = NpyArray::parse("features", &bytes).unwrap();
        assert_eq!(array.shape, vec![3]);
        assert_eq!(array.len(), 3);
        assert_eq!(array.into_numeric().unwrap(), vec![1.5, -2.0, 255.0]);
    }

    #[test]
    fn test_parse_big_endian_ints() {
        let payload: Vec<u8> = [7i32, -3].iter().flat_map(|v| v.to_be_bytes()).collect();
        let array = NpyArray::parse("x", &npy_bytes(">i4", &[2], &payload)).unwrap();
        assert_eq!(array.into_numeric().unwrap(), vec![7.0, -3.0]);
    }

    #[test]
    fn test_parse_unicode_array() {
        let payload = unicode_payload(&["en", "x_fragment1", "de", "äöü"], 11);
        let bytes = npy_bytes("<U11", &[2, 2], &payload);

        let array = NpyArray::parse("labels", &bytes).unwrap();
        assert_eq!(array.shape, vec![2, 2]);
        assert_eq!(
            array.into_text().unwrap(),
            vec!["en", "x_fragment1", "de", "äöü"]
        );
    }

    #[test]
    fn test_parse_byte_strings() {
        let bytes = npy_bytes("|S3", &[2], b"en\0des");
        let array = NpyArray::parse("labels", &bytes).unwrap();
        assert_eq!(array.into_text().unwrap(), vec!["en", "des"]);
    }

    #[test]
    fn test_rejects_object_and_truncated_arrays() {
        let err = NpyArray::parse("labels", &npy_bytes("|O", &[1], &[0; 8])).unwrap_err();
        assert!(matches!(err, LangIdError::UnsupportedDtype { .. }));

        let err = NpyArray::parse("features", &npy_bytes("|u1", &[4], &[1, 2])).unwrap_err();
        assert!(matches!(err, LangIdError::MalformedArray { .. }));

        let err = NpyArray::parse("features", b"not an npy file").unwrap_err();
        assert!(matches!(err, LangIdError::MalformedArray { .. }));
    }

    #[test]
    fn test_overflowing_shape_is_malformed() {
        let huge = usize::MAX / 2;
        let bytes = npy_bytes("<f4", &[huge, 3], &[0; 8]);

        let err = NpyArray::parse("features", &bytes).unwrap_err();
        assert!(matches!(err, LangIdError::MalformedArray { .. }));
    }

    #[test]
    fn test_wrong_payload_kind() {
        let array = NpyArray::parse("f", &npy_bytes("|u1", &[1], &[3])).unwrap();
        assert!(array.into_text().is_err());
    }

    #[test]
    fn test_archive_roundtrip_and_missing_member() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bundle.npz");
        write_bundle(
            &path,
            &[["en", "spk1", "a_fragment0"], ["es", "spk2", "b_fragment3"]],
            &[vec![0, 255], vec![128, 64]],
        );

        let mut archive = NpzArchive::open(&path).unwrap();
        let mut names = archive.array_names();
        names.sort();
        assert_eq!(names, vec!["features", "labels"]);

        let features = archive.read_array("features").unwrap();
        assert_eq!(features.shape, vec![2, 2]);
        assert_eq!(features.into_numeric().unwrap(), vec![0.0, 255.0, 128.0, 64.0]);

        let labels = archive.read_array("labels").unwrap();
        assert_eq!(labels.shape, vec![2, 3]);

        let err = archive.read_array("weights").unwrap_err();
        assert!(matches!(err, LangIdError::MissingArray { .. }));
    }

    #[test]
    fn test_open_missing_bundle() {
        let err = NpzArchive::open("/definitely/not/here/train.npz").err().unwrap();
        assert!(matches!(err, LangIdError::BundleNotFound(_)));
    }
}

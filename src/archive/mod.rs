//! Package container reader.
//!
//! APK files are ZIP archives. The central directory is parsed by the `zip` crate, then every
//! entry is checked by the guards in [`guards`] before any of them is trusted: names must stay
//! inside the archive root and declared sizes must stay under the configured ceilings. Entry
//! contents are decompressed on demand, never past their declared size, and their CRC-32 is
//! verified once the last byte has been read.

mod guards;
#[cfg(test)]
mod tests;

use crate::{byte_reader::ByteReader, error::ArchiveError, utils::Deadline};
use log::{debug, trace};
use serde::Deserialize;
use std::{
    collections::HashMap,
    fmt,
    io::{Cursor, ErrorKind},
};
use zip::{result::ZipError, ZipArchive};

pub(crate) use guards::normalize_entry_name;

const LOCAL_HEADER_SIGNATURE: &[u8; 4] = b"PK\x03\x04";
const END_OF_CENTRAL_DIRECTORY_SIGNATURE: &[u8; 4] = b"PK\x05\x06";
const END_OF_CENTRAL_DIRECTORY_LEN: usize = 22;
const MAX_COMMENT_LEN: usize = u16::MAX as usize;

/// Ceilings enforced on every archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArchiveLimits {
    /// Maximum number of entries in the central directory.
    pub max_entries: u64,
    /// Maximum decompressed size of a single entry, in bytes.
    pub max_entry_size: u64,
    /// Maximum decompressed size of all entries together, in bytes.
    pub max_total_size: u64,
    /// Maximum ratio between decompressed and compressed size for large entries.
    pub max_compression_ratio: u64,
    /// Maximum number of signing certificates read from the package.
    pub max_certificates: usize,
}

impl Default for ArchiveLimits {
    fn default() -> Self {
        Self {
            max_entries: 32_768,
            max_entry_size: 128 * 1024 * 1024,
            max_total_size: 500 * 1024 * 1024,
            max_compression_ratio: 1_000,
            max_certificates: 32,
        }
    }
}

/// Compression method of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    /// No compression.
    Stored,
    /// Raw deflate.
    Deflated,
    /// Any other method. Such entries cannot be read.
    Other,
}

impl From<zip::CompressionMethod> for CompressionMethod {
    fn from(method: zip::CompressionMethod) -> Self {
        match method {
            zip::CompressionMethod::Stored => Self::Stored,
            zip::CompressionMethod::Deflated => Self::Deflated,
            _ => Self::Other,
        }
    }
}

/// Metadata of one archive entry, as declared by the central directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryMeta {
    name: String,
    method: CompressionMethod,
    compressed_size: u64,
    size: u64,
    crc32: u32,
    directory: bool,
    position: usize,
}

impl EntryMeta {
    /// Gets the normalized entry name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Gets the compression method.
    pub fn method(&self) -> CompressionMethod {
        self.method
    }

    /// Gets the compressed size in bytes.
    pub fn compressed_size(&self) -> u64 {
        self.compressed_size
    }

    /// Gets the declared decompressed size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Gets the declared CRC-32 of the decompressed contents.
    pub fn crc32(&self) -> u32 {
        self.crc32
    }

    /// Whether the entry is a directory.
    pub fn is_dir(&self) -> bool {
        self.directory
    }
}

/// A validated package container, borrowing the input bytes.
pub struct PackageArchive<'a> {
    data: &'a [u8],
    zip: ZipArchive<Cursor<&'a [u8]>>,
    entries: Vec<EntryMeta>,
    index: HashMap<String, usize>,
    central_directory_offset: usize,
    limits: ArchiveLimits,
    deadline: Deadline,
}

impl fmt::Debug for PackageArchive<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PackageArchive")
            .field("len", &self.data.len())
            .field("entries", &self.entries)
            .field("central_directory_offset", &self.central_directory_offset)
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

impl<'a> PackageArchive<'a> {
    /// Opens the archive, validating every entry against the given limits.
    pub fn open(
        data: &'a [u8],
        limits: &ArchiveLimits,
        deadline: Deadline,
    ) -> Result<Self, ArchiveError> {
        if data.len() < END_OF_CENTRAL_DIRECTORY_LEN {
            return Err(ArchiveError::Truncated(format!(
                "the input is only {} bytes long",
                data.len()
            )));
        }

        let mut zip = ZipArchive::new(Cursor::new(data)).map_err(|e| open_error(data, e))?;
        let count = zip.len();
        if count as u64 > limits.max_entries {
            return Err(ArchiveError::Malicious(format!(
                "the archive declares {} entries, over the limit of {}",
                count, limits.max_entries
            )));
        }
        let central_directory_offset = usize::try_from(zip.central_directory_start())
            .ok()
            .filter(|offset| *offset <= data.len())
            .ok_or_else(|| {
                ArchiveError::Corrupt("the central directory lies outside the archive".to_owned())
            })?;
        debug!(
            "central directory at offset {} with {} entries",
            central_directory_offset, count
        );

        let mut entries = Vec::with_capacity(count);
        let mut index = HashMap::with_capacity(count);
        let mut total_size = 0;

        for position in 0..count {
            if deadline.is_expired() {
                return Err(ArchiveError::DeadlineExceeded);
            }

            let file = zip
                .by_index_raw(position)
                .map_err(|e| open_error(data, e))?;
            let raw_name = file.name().to_owned();
            if file.enclosed_name().is_none() {
                return Err(ArchiveError::Malicious(format!(
                    "entry name `{}` escapes the archive root",
                    raw_name.escape_debug()
                )));
            }
            let name = normalize_entry_name(&raw_name)?;
            guards::check_declared_sizes(
                &name,
                file.compressed_size(),
                file.size(),
                limits,
                &mut total_size,
            )?;

            if index.insert(name.clone(), entries.len()).is_some() {
                return Err(ArchiveError::Malicious(format!(
                    "entry `{}` appears more than once",
                    name
                )));
            }
            trace!(
                "entry `{}`: {} -> {} bytes",
                name,
                file.compressed_size(),
                file.size()
            );

            entries.push(EntryMeta {
                name,
                method: CompressionMethod::from(file.compression()),
                compressed_size: file.compressed_size(),
                size: file.size(),
                crc32: file.crc32(),
                directory: file.is_dir(),
                position,
            });
        }

        Ok(Self {
            data,
            zip,
            entries,
            index,
            central_directory_offset,
            limits: *limits,
            deadline,
        })
    }

    /// Lists the entries in central directory order.
    pub fn list_entries(&self) -> &[EntryMeta] {
        &self.entries
    }

    /// Gets the metadata of the entry with the given name.
    pub fn entry(&self, name: &str) -> Option<&EntryMeta> {
        let name = normalize_entry_name(name).ok()?;
        self.index.get(&name).map(|&i| &self.entries[i])
    }

    /// Reads the decompressed contents of an entry.
    ///
    /// Entries that cannot be decompressed, that do not decompress to their declared size or
    /// whose CRC-32 does not match are reported as [`ArchiveError::Corrupt`].
    pub fn read_entry(&self, name: &str) -> Result<Vec<u8>, ArchiveError> {
        let entry = self
            .entry(name)
            .ok_or_else(|| ArchiveError::NotFound(name.to_owned()))?;
        if self.deadline.is_expired() {
            return Err(ArchiveError::DeadlineExceeded);
        }
        if entry.method == CompressionMethod::Other {
            return Err(ArchiveError::Corrupt(format!(
                "entry `{}` uses an unsupported compression method",
                entry.name
            )));
        }

        // The reader is a cursor over a slice, so the clone shares the parsed directory.
        let mut zip = self.zip.clone();
        let file = zip
            .by_index(entry.position)
            .map_err(|e| read_error(&entry.name, e))?;
        guards::read_bounded(&entry.name, file, entry.size, self.deadline)
    }

    /// Gets the bytes before the central directory.
    ///
    /// The APK signing block, if the package has one, ends right where this region ends.
    pub fn signing_block_region(&self) -> &'a [u8] {
        &self.data[..self.central_directory_offset]
    }

    /// Gets the limits this archive was opened with.
    pub fn limits(&self) -> &ArchiveLimits {
        &self.limits
    }

    /// Gets the deadline this archive was opened with.
    pub fn deadline(&self) -> Deadline {
        self.deadline
    }
}

/// Classifies an error raised while parsing the central directory.
fn open_error(data: &[u8], error: ZipError) -> ArchiveError {
    match error {
        ZipError::Io(ref e) if e.kind() == ErrorKind::UnexpectedEof => {
            ArchiveError::Truncated(format!("the archive ends early: {}", e))
        }
        e if is_truncated(data) => {
            ArchiveError::Truncated(format!("the archive ends early: {}", e))
        }
        e => ArchiveError::Corrupt(e.to_string()),
    }
}

/// Classifies an error raised while opening an entry for reading.
fn read_error(name: &str, error: ZipError) -> ArchiveError {
    match error {
        ZipError::Io(ref e) if e.kind() == ErrorKind::UnexpectedEof => {
            ArchiveError::Truncated(format!("the data of `{}` ends early", name))
        }
        e => ArchiveError::Corrupt(format!("entry `{}` cannot be read: {}", name, e)),
    }
}

/// Whether an archive that failed to parse was cut short, rather than malformed.
///
/// That is the case when it starts like an archive but has no end record, or when its end record
/// declares a central directory that runs past the record itself.
fn is_truncated(data: &[u8]) -> bool {
    let last = match data.len().checked_sub(END_OF_CENTRAL_DIRECTORY_LEN) {
        Some(last) => last,
        None => return true,
    };
    let first = last.saturating_sub(MAX_COMMENT_LEN);
    let end_record = (first..=last)
        .rev()
        .find(|&offset| data[offset..].starts_with(END_OF_CENTRAL_DIRECTORY_SIGNATURE));

    match end_record {
        None => data.starts_with(LOCAL_HEADER_SIGNATURE),
        Some(offset) => {
            let declared = ByteReader::at(data, offset + 12).and_then(|mut reader| {
                let size = reader.u32()?;
                let start = reader.u32()?;
                Some(u64::from(start) + u64::from(size))
            });
            declared.map_or(false, |end| end > offset as u64)
        }
    }
}

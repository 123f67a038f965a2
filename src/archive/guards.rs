//! Hostile archive guards: entry name sanitization, size ceilings and bounded reads.

use super::ArchiveLimits;
use crate::{error::ArchiveError, utils::Deadline};
use std::io::{ErrorKind, Read};

/// Entries smaller than this are exempt from the compression ratio guard.
const RATIO_EXEMPT_SIZE: u64 = 1024 * 1024;
/// Read chunk size. The deadline is checked once per chunk.
const CHUNK_SIZE: usize = 64 * 1024;
/// Largest buffer reserved up front, whatever the declared size.
const INITIAL_CAPACITY: u64 = 1024 * 1024;

/// Normalizes an entry name and rejects names that escape the archive root.
///
/// Backslashes are treated as separators, `.` and empty segments are dropped. The result has no
/// leading or trailing slash.
pub(crate) fn normalize_entry_name(raw: &str) -> Result<String, ArchiveError> {
    if raw.is_empty() {
        return Err(ArchiveError::Malicious("empty entry name".to_owned()));
    }
    if raw.contains('\0') {
        return Err(ArchiveError::Malicious(format!(
            "entry name `{}` contains a NUL byte",
            raw.escape_debug()
        )));
    }

    let unified = raw.replace('\\', "/");
    let has_drive_prefix = {
        let mut chars = unified.chars();
        matches!(
            (chars.next(), chars.next()),
            (Some(letter), Some(':')) if letter.is_ascii_alphabetic()
        )
    };
    if unified.starts_with('/') || has_drive_prefix {
        return Err(ArchiveError::Malicious(format!(
            "entry name `{}` is an absolute path",
            raw
        )));
    }

    let mut segments = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                return Err(ArchiveError::Malicious(format!(
                    "entry name `{}` escapes the archive root",
                    raw
                )))
            }
            _ => segments.push(segment),
        }
    }

    Ok(segments.join("/"))
}

/// Checks declared sizes of one entry against the limits, accumulating the archive total.
pub(crate) fn check_declared_sizes(
    name: &str,
    compressed_size: u64,
    size: u64,
    limits: &ArchiveLimits,
    total: &mut u64,
) -> Result<(), ArchiveError> {
    if size > limits.max_entry_size {
        return Err(ArchiveError::Malicious(format!(
            "entry `{}` declares {} bytes, over the {} byte entry limit",
            name, size, limits.max_entry_size
        )));
    }

    *total = total.saturating_add(size);
    if *total > limits.max_total_size {
        return Err(ArchiveError::Malicious(format!(
            "the archive declares more than {} decompressed bytes",
            limits.max_total_size
        )));
    }

    if size > RATIO_EXEMPT_SIZE {
        let ratio = size / compressed_size.max(1);
        if ratio > limits.max_compression_ratio {
            return Err(ArchiveError::Malicious(format!(
                "entry `{}` has a compression ratio of {}:1",
                name, ratio
            )));
        }
    }

    Ok(())
}

/// Reads decompressed entry contents, stopping as soon as they exceed `declared` bytes.
///
/// `declared` has already been checked against the entry ceiling, so the output never grows past
/// it. Contents that do not match their declared size are corrupt.
pub(crate) fn read_bounded<R: Read>(
    name: &str,
    reader: R,
    declared: u64,
    deadline: Deadline,
) -> Result<Vec<u8>, ArchiveError> {
    let capacity = usize::try_from(declared.min(INITIAL_CAPACITY)).unwrap_or(0);
    let mut output = Vec::with_capacity(capacity);
    let mut reader = reader.take(declared.saturating_add(1));
    let mut chunk = vec![0_u8; CHUNK_SIZE];

    loop {
        if deadline.is_expired() {
            return Err(ArchiveError::DeadlineExceeded);
        }

        let read = match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(read) => read,
            Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(ref e) if e.kind() == ErrorKind::UnexpectedEof => {
                return Err(ArchiveError::Truncated(format!(
                    "the compressed data of `{}` ends early",
                    name
                )))
            }
            Err(e) => {
                return Err(ArchiveError::Corrupt(format!(
                    "invalid data in `{}`: {}",
                    name, e
                )))
            }
        };

        if (output.len() + read) as u64 > declared {
            return Err(ArchiveError::Corrupt(format!(
                "entry `{}` decompresses past its declared size of {} bytes",
                name, declared
            )));
        }
        output.extend_from_slice(&chunk[..read]);
    }

    if output.len() as u64 != declared {
        return Err(ArchiveError::Corrupt(format!(
            "entry `{}` decompresses to {} bytes, but declares {}",
            name,
            output.len(),
            declared
        )));
    }

    Ok(output)
}

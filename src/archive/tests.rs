//! Tests for the container reader.

use super::{ArchiveLimits, CompressionMethod, PackageArchive};
use crate::{
    error::ArchiveError,
    test_utils::{crc32, deflate, signing_block, ZipBuilder},
    utils::Deadline,
};
use std::time::Duration;

fn open(data: &[u8]) -> Result<PackageArchive<'_>, ArchiveError> {
    PackageArchive::open(data, &ArchiveLimits::default(), Deadline::unbounded())
}

#[test]
fn it_lists_and_reads_entries() {
    let manifest = b"binary manifest bytes".repeat(10);
    let data = ZipBuilder::new()
        .deflated("AndroidManifest.xml", &manifest)
        .stored("classes.dex", b"dex\n035\0")
        .stored("assets/", b"")
        .build();
    let archive = open(&data).unwrap();

    let names: Vec<_> = archive.list_entries().iter().map(|e| e.name()).collect();
    assert_eq!(names, vec!["AndroidManifest.xml", "classes.dex", "assets"]);

    let entry = archive.entry("AndroidManifest.xml").unwrap();
    assert_eq!(entry.method(), CompressionMethod::Deflated);
    assert_eq!(entry.size(), manifest.len() as u64);
    assert!(archive.entry("assets").unwrap().is_dir());

    assert_eq!(&*archive.read_entry("AndroidManifest.xml").unwrap(), &manifest[..]);
    assert_eq!(archive.read_entry("classes.dex").unwrap(), b"dex\n035\0");
    assert_eq!(
        archive.entry("classes.dex").unwrap().crc32(),
        crc32(b"dex\n035\0")
    );
}

#[test]
fn it_not_found() {
    let data = ZipBuilder::new().stored("a.txt", b"a").build();
    let archive = open(&data).unwrap();

    assert_eq!(
        archive.read_entry("b.txt"),
        Err(ArchiveError::NotFound("b.txt".to_owned()))
    );
}

#[test]
fn it_accepts_comment() {
    let data = ZipBuilder::new()
        .stored("a.txt", b"a")
        .comment(b"built for the archive tests")
        .build();
    let archive = open(&data).unwrap();

    assert_eq!(archive.list_entries().len(), 1);
}

#[test]
fn it_empty_archive() {
    let data = ZipBuilder::new().build();
    let archive = open(&data).unwrap();

    assert!(archive.list_entries().is_empty());
    assert!(archive.signing_block_region().is_empty());
}

#[test]
fn it_truncated() {
    assert!(matches!(open(b"PK\x03\x04"), Err(ArchiveError::Truncated(_))));

    let data = ZipBuilder::new().stored("a.txt", b"abc").build();
    assert!(matches!(
        open(&data[..data.len() - 30]),
        Err(ArchiveError::Truncated(_))
    ));
}

#[test]
fn it_truncated_central_directory() {
    let data = ZipBuilder::new()
        .stored("a.txt", b"abc")
        .stored("b.txt", b"def")
        .build();
    // Drop the second central record, keeping the end record that still declares it.
    let end_record = data.len() - 22;
    let mut cut = data[..end_record - (46 + 5)].to_vec();
    cut.extend_from_slice(&data[end_record..]);

    assert!(matches!(open(&cut), Err(ArchiveError::Truncated(_))));
}

#[test]
fn it_not_an_archive() {
    let data = vec![0x42_u8; 4096];
    assert!(matches!(open(&data), Err(ArchiveError::Corrupt(_))));
}

#[test]
fn it_rejects_parent_directory_segments() {
    let data = ZipBuilder::new()
        .stored("AndroidManifest.xml", b"m")
        .stored("assets/../../lib/evil.so", b"x")
        .build();

    assert!(matches!(open(&data), Err(ArchiveError::Malicious(_))));
}

#[test]
fn it_rejects_absolute_paths() {
    let data = ZipBuilder::new().stored("/data/local/tmp/x", b"x").build();

    assert!(matches!(open(&data), Err(ArchiveError::Malicious(_))));
}

#[test]
fn it_rejects_duplicate_names() {
    let data = ZipBuilder::new()
        .stored("classes.dex", b"a")
        .stored("./classes.dex", b"b")
        .build();

    assert!(matches!(open(&data), Err(ArchiveError::Malicious(_))));
}

#[test]
fn it_rejects_oversized_declared_entry() {
    let limits = ArchiveLimits {
        max_entry_size: 1024,
        ..ArchiveLimits::default()
    };
    let data = ZipBuilder::new()
        .raw("bomb.bin", 8, deflate(&[0_u8; 2048]), 2048)
        .build();

    assert!(matches!(
        PackageArchive::open(&data, &limits, Deadline::unbounded()),
        Err(ArchiveError::Malicious(_))
    ));
}

#[test]
fn it_rejects_too_many_entries() {
    let limits = ArchiveLimits {
        max_entries: 2,
        ..ArchiveLimits::default()
    };
    let data = ZipBuilder::new()
        .stored("a", b"a")
        .stored("b", b"b")
        .stored("c", b"c")
        .build();

    assert!(matches!(
        PackageArchive::open(&data, &limits, Deadline::unbounded()),
        Err(ArchiveError::Malicious(_))
    ));
}

#[test]
fn it_stops_inflating_lying_entry() {
    let data = ZipBuilder::new()
        .raw("liar.bin", 8, deflate(&[0_u8; 100_000]), 10)
        .build();
    let archive = open(&data).unwrap();

    assert!(matches!(
        archive.read_entry("liar.bin"),
        Err(ArchiveError::Corrupt(_))
    ));
}

#[test]
fn it_rejects_garbage_compressed_data() {
    let mut compressed = deflate(&b"binary manifest bytes".repeat(40));
    for byte in &mut compressed {
        *byte ^= 0x5a;
    }
    let data = ZipBuilder::new()
        .raw("AndroidManifest.xml", 8, compressed, 840)
        .build();
    let archive = open(&data).unwrap();

    assert!(matches!(
        archive.read_entry("AndroidManifest.xml"),
        Err(ArchiveError::Corrupt(_)) | Err(ArchiveError::Truncated(_))
    ));
}

#[test]
fn it_verifies_crc() {
    let data = ZipBuilder::new()
        .stored("classes.dex", b"dex\n035\0")
        .crc32(0xdead_beef)
        .deflated("AndroidManifest.xml", &b"manifest".repeat(50))
        .crc32(0x0bad_f00d)
        .build();
    let archive = open(&data).unwrap();

    assert!(matches!(
        archive.read_entry("classes.dex"),
        Err(ArchiveError::Corrupt(_))
    ));
    assert!(matches!(
        archive.read_entry("AndroidManifest.xml"),
        Err(ArchiveError::Corrupt(_))
    ));
}

#[test]
fn it_rejects_unsupported_method() {
    let data = ZipBuilder::new()
        .raw("a.bin", 12, b"BZh9".to_vec(), 4)
        .build();
    let archive = open(&data).unwrap();

    assert!(matches!(
        archive.read_entry("a.bin"),
        Err(ArchiveError::Corrupt(_))
    ));
}

#[test]
fn it_rejects_broken_local_header() {
    let mut data = ZipBuilder::new().stored("abc.txt", b"x").build();
    data[2] = b'X';

    let read = open(&data).and_then(|archive| archive.read_entry("abc.txt"));
    assert!(matches!(read, Err(ArchiveError::Corrupt(_))));
}

#[test]
fn it_rejects_entry_overlapping_central_directory() {
    let data = ZipBuilder::new()
        .raw("a.bin", 0, b"abcd".to_vec(), 4)
        .build();
    let mut data = data;
    // Grow the compressed size in the central record (offset 20 inside it).
    let central_directory = data.len() - 22 - (46 + 5);
    data[central_directory + 20] = 0xff;

    let read = open(&data).and_then(|archive| archive.read_entry("a.bin"));
    assert!(matches!(read, Err(ArchiveError::Corrupt(_))));
}

#[test]
fn it_exposes_signing_block_region() {
    let block = signing_block(&[(0x4272_6577, vec![0_u8; 16])]);
    let data = ZipBuilder::new()
        .stored("a.txt", b"abc")
        .signing_block(block.clone())
        .build();
    let archive = open(&data).unwrap();

    let region = archive.signing_block_region();
    assert!(region.ends_with(&block));
    assert_eq!(region.len(), 30 + 5 + 3 + block.len());
}

#[test]
fn it_honors_deadline() {
    let data = ZipBuilder::new().stored("a.txt", b"abc").build();

    assert_eq!(
        PackageArchive::open(
            &data,
            &ArchiveLimits::default(),
            Deadline::after(Duration::ZERO)
        )
        .unwrap_err(),
        ArchiveError::DeadlineExceeded
    );
}

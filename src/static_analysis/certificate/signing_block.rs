//! APK signing block (signature schemes v2, v3 and v3.1).
//!
//! The block sits right before the central directory:
//!
//! ```text
//! u64 size | (u64 len, u32 id, value)* | u64 size | "APK Sig Block 42"
//! ```
//!
//! Both size fields count every byte of the block except the first size field.

use super::SignatureScheme;
use crate::{byte_reader::ByteReader, error::CertificateError};

const MAGIC: &[u8; 16] = b"APK Sig Block 42";
const FOOTER_LEN: usize = 8 + 16;

pub(crate) const V2_BLOCK_ID: u32 = 0x7109_871a;
pub(crate) const V3_BLOCK_ID: u32 = 0xf053_68c0;
pub(crate) const V31_BLOCK_ID: u32 = 0x1b93_ad61;

/// Maps a block ID to the signature scheme it carries, if it carries one.
pub(crate) fn scheme_of(id: u32) -> Option<SignatureScheme> {
    match id {
        V2_BLOCK_ID => Some(SignatureScheme::V2),
        V3_BLOCK_ID => Some(SignatureScheme::V3),
        V31_BLOCK_ID => Some(SignatureScheme::V31),
        _ => None,
    }
}

/// Locates the signing block at the end of `region` and returns its ID-value pairs.
///
/// Returns `Ok(None)` if the region does not end with a signing block footer.
pub(crate) fn find(region: &[u8]) -> Result<Option<Vec<(u32, &[u8])>>, CertificateError> {
    if region.len() < FOOTER_LEN || &region[region.len() - MAGIC.len()..] != MAGIC {
        return Ok(None);
    }

    let footer_size = ByteReader::at(region, region.len() - FOOTER_LEN)
        .and_then(|mut r| r.u64())
        .ok_or_else(|| CertificateError::SigningBlock("truncated footer".to_owned()))?;
    let block_len = usize::try_from(footer_size)
        .ok()
        .and_then(|size| size.checked_add(8))
        .filter(|len| *len <= region.len() && *len >= 8 + FOOTER_LEN)
        .ok_or_else(|| {
            CertificateError::SigningBlock(format!(
                "declared size {} does not fit before the central directory",
                footer_size
            ))
        })?;

    let start = region.len() - block_len;
    let mut reader = ByteReader::at(region, start)
        .ok_or_else(|| CertificateError::SigningBlock("truncated header".to_owned()))?;
    let header_size = reader
        .u64()
        .ok_or_else(|| CertificateError::SigningBlock("truncated header".to_owned()))?;
    if header_size != footer_size {
        return Err(CertificateError::SigningBlock(format!(
            "header size {} differs from footer size {}",
            header_size, footer_size
        )));
    }

    let pairs_area = &region[start + 8..region.len() - FOOTER_LEN];
    let mut pairs = ByteReader::new(pairs_area);
    let mut result = Vec::new();
    while !pairs.is_empty() {
        let len = pairs.u64().ok_or_else(|| {
            CertificateError::SigningBlock("truncated ID-value pair".to_owned())
        })?;
        let len = usize::try_from(len)
            .ok()
            .filter(|len| *len >= 4 && *len <= pairs.remaining())
            .ok_or_else(|| {
                CertificateError::SigningBlock(format!("ID-value pair of {} bytes overflows", len))
            })?;
        // Length checked above.
        let id = pairs.u32().unwrap_or_default();
        let value = pairs.bytes(len - 4).unwrap_or_default();
        result.push((id, value));
    }

    Ok(Some(result))
}

/// Reads the certificate chains of the signers in a v2, v3 or v3.1 block value.
///
/// The outer error means the signer sequence itself is unreadable. Each signer is decoded
/// independently, so one corrupt signer does not hide the others.
pub(crate) fn signer_certificates(
    value: &[u8],
) -> Result<Vec<Result<Vec<&[u8]>, CertificateError>>, CertificateError> {
    let truncated = |what: &str| CertificateError::SigningBlock(format!("truncated {}", what));

    let mut outer = ByteReader::new(value);
    let mut signers = ByteReader::new(
        outer
            .length_prefixed()
            .ok_or_else(|| truncated("signer sequence"))?,
    );

    let mut result = Vec::new();
    while !signers.is_empty() {
        let signer = signers
            .length_prefixed()
            .ok_or_else(|| truncated("signer"))?;
        result.push(read_signer(signer));
    }
    Ok(result)
}

fn read_signer(signer: &[u8]) -> Result<Vec<&[u8]>, CertificateError> {
    let truncated = |what: &str| CertificateError::SigningBlock(format!("truncated {}", what));

    let signed_data = ByteReader::new(signer)
        .length_prefixed()
        .ok_or_else(|| truncated("signed data"))?;
    let mut fields = ByteReader::new(signed_data);
    let _digests = fields
        .length_prefixed()
        .ok_or_else(|| truncated("digest sequence"))?;
    let mut encoded = ByteReader::new(
        fields
            .length_prefixed()
            .ok_or_else(|| truncated("certificate sequence"))?,
    );

    let mut certificates = Vec::new();
    while !encoded.is_empty() {
        certificates.push(
            encoded
                .length_prefixed()
                .ok_or_else(|| truncated("certificate"))?,
        );
    }
    Ok(certificates)
}

//! CRC32 checksums shared by every on-disk unit

/// Checksum of one contiguous byte range
pub fn checksum(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// Checksum of several ranges as if they were concatenated
pub fn checksum_parts(parts: &[&[u8]]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize()
}

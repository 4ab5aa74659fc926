//! Sampling content fingerprint used to recognise files across moves.
//!
//! Reads only the size, the first 16 KiB and the last 16 KiB, so changes
//! confined to the middle of a large file go unnoticed. That is accepted:
//! the hash exists for rename/move detection, not integrity checking.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

/// Bytes sampled from each end of the file.
pub const SAMPLE_SIZE: u64 = 16 * 1024;

/// Fingerprint a file, returning an empty string on any I/O error.
///
/// Callers treat the empty string as "no fingerprint" and fall back to
/// path matching.
pub fn fingerprint(path: &Path) -> String {
    match compute_fingerprint(path) {
        Ok(hash) => hash,
        Err(e) => {
            tracing::warn!(target: "scanner::fingerprint", path = %path.display(), error = %e, "Failed to fingerprint file");
            String::new()
        }
    }
}

/// Async wrapper running [`fingerprint`] on the blocking pool.
pub async fn fingerprint_async(path: &Path) -> String {
    let owned = path.to_path_buf();
    match tokio::task::spawn_blocking(move || fingerprint(&owned)).await {
        Ok(hash) => hash,
        Err(e) => {
            tracing::warn!(target: "scanner::fingerprint", path = %path.display(), error = %e, "Fingerprint task failed");
            String::new()
        }
    }
}

/// Compute the SHA-256 of size + head + tail as lowercase hex.
///
/// The size is hashed as its decimal string so different sized files
/// never share a fingerprint even when the sampled bytes match.
pub fn compute_fingerprint(path: &Path) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let size = file.metadata()?.len();

    let mut hasher = Sha256::new();
    hasher.update(size.to_string().as_bytes());

    let head_len = size.min(SAMPLE_SIZE) as usize;
    let mut buffer = vec![0u8; head_len];
    file.read_exact(&mut buffer)?;
    hasher.update(&buffer);

    if size > SAMPLE_SIZE {
        file.seek(SeekFrom::Start(size - SAMPLE_SIZE))?;
        buffer.resize(SAMPLE_SIZE as usize, 0);
        file.read_exact(&mut buffer)?;
        hasher.update(&buffer);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn patterned(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn test_small_file_is_stable() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("test.txt");
        std::fs::write(&file_path, b"Hello, world!").unwrap();

        let hash = fingerprint(&file_path);
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, fingerprint(&file_path));
    }

    #[test]
    fn test_missing_file_yields_empty() {
        let dir = tempdir().unwrap();
        assert_eq!(fingerprint(&dir.path().join("gone.mp3")), "");
    }

    #[test]
    fn test_empty_file_has_a_hash() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("empty.mp3");
        File::create(&file_path).unwrap();
        assert_eq!(fingerprint(&file_path).len(), 64);
    }

    #[test]
    fn test_middle_change_is_not_detected() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("large.flac");
        let mut data = patterned(64 * 1024);
        std::fs::write(&file_path, &data).unwrap();
        let before = fingerprint(&file_path);

        data[32 * 1024] ^= 0xFF;
        std::fs::write(&file_path, &data).unwrap();
        assert_eq!(fingerprint(&file_path), before);
    }

    #[test]
    fn test_tail_change_is_detected() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("large.flac");
        let mut data = patterned(64 * 1024);
        std::fs::write(&file_path, &data).unwrap();
        let before = fingerprint(&file_path);

        let last = data.len() - 10;
        data[last] ^= 0xFF;
        std::fs::write(&file_path, &data).unwrap();
        assert_ne!(fingerprint(&file_path), before);
    }

    #[test]
    fn test_appending_changes_hash() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("large.flac");
        std::fs::write(&file_path, patterned(40 * 1024)).unwrap();
        let before = fingerprint(&file_path);

        let mut f = std::fs::OpenOptions::new().append(true).open(&file_path).unwrap();
        f.write_all(&[7]).unwrap();
        drop(f);
        assert_ne!(fingerprint(&file_path), before);
    }

    #[test]
    fn test_same_content_different_name_matches() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.mp3");
        let b = dir.path().join("b.mp3");
        std::fs::write(&a, patterned(20 * 1024)).unwrap();
        std::fs::copy(&a, &b).unwrap();
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }
}

// /////////////////////////////////////////////////////////////////////////////
// Provenance RMS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # File Checksum Service
//!
//! Computes the MD5 digests recorded on file resources. Digests are
//! streamed in fixed-size chunks so large artifacts do not need to fit
//! in memory.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use md5::{Digest, Md5};

use crate::error::RmsError;

const CHUNK_SIZE: usize = 64 * 1024;

/// MD5 hex digest of a file's contents.
pub fn file_md5(path: &Path) -> Result<String, RmsError> {
    let mut file = File::open(path)
        .map_err(|e| RmsError::io_error(format!("cannot open {}: {}", path.display(), e)))?;
    let mut hasher = Md5::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = file
            .read(&mut buf)
            .map_err(|e| RmsError::io_error(format!("cannot read {}: {}", path.display(), e)))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Best-effort digest: `None` for missing paths, directories, or
/// unreadable files. File resource records store the digest as optional
/// for exactly these cases.
pub fn try_file_md5(path: &Path) -> Option<String> {
    if !path.is_file() {
        return None;
    }
    file_md5(path).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_md5_of_known_content() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"hello").unwrap();
        // Well-known digest of "hello"
        assert_eq!(
            file_md5(f.path()).unwrap(),
            "5d41402abc4b2a76b9719d911017c592"
        );
    }

    #[test]
    fn test_try_md5_missing_path_is_none() {
        assert!(try_file_md5(Path::new("/nonexistent/rms/file")).is_none());
    }

    #[test]
    fn test_try_md5_directory_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(try_file_md5(dir.path()).is_none());
    }
}

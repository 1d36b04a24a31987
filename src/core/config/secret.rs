use std::io::Write;
use std::path::{Path, PathBuf};
use std::{fs, io};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;

/// Returns the persisted secret key, creating `.secret_key` next to the
/// manifest on first run. Concurrent first runs settle on whichever process
/// wins the exclusive create.
pub(super) fn load_or_create_secret_key() -> String {
    let path = key_file();

    if let Some(existing) = read_key(&path) {
        return existing;
    }

    let fresh = random_key();

    if let Some(dir) = path.parent() {
        if let Err(err) = fs::create_dir_all(dir) {
            tracing::warn!(
                error = %err,
                path = %dir.display(),
                "Could not create secret key directory"
            );
        }
    }

    match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
        Ok(mut file) => {
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;

                if let Err(err) = file.set_permissions(fs::Permissions::from_mode(0o600)) {
                    tracing::warn!(
                        error = %err,
                        path = %path.display(),
                        "Could not restrict secret key file permissions"
                    );
                }
            }

            if let Err(err) = file.write_all(fresh.as_bytes()) {
                tracing::warn!(
                    error = %err,
                    path = %path.display(),
                    "Could not persist secret key"
                );
            }
            fresh
        }
        // Another process created the file between our read and create.
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
            read_key(&path).unwrap_or(fresh)
        }
        Err(err) => {
            tracing::warn!(
                error = %err,
                path = %path.display(),
                "Could not create secret key file"
            );
            fresh
        }
    }
}

fn read_key(path: &Path) -> Option<String> {
    let value = fs::read_to_string(path).ok()?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn random_key() -> String {
    let mut bytes = [0u8; 64];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn key_file() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(".secret_key")
}

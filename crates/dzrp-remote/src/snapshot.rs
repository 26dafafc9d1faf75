//! Named snapshot files: serialized CPU state plus the memory dump.
//!
//! One file per state name inside a caller-supplied directory. The format
//! is private and must only round-trip exactly; there is no cross-version
//! compatibility requirement.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{ConfigurationError, RemoteError, TransportError};

const SNAPSHOT_EXTENSION: &str = "state";

fn validate_name(name: &str) -> Result<(), ConfigurationError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && !name.starts_with('.')
        && !name.contains("..");
    if valid {
        Ok(())
    } else {
        Err(ConfigurationError::InvalidSnapshotName { name: name.into() })
    }
}

fn snapshot_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.{SNAPSHOT_EXTENSION}"))
}

/// Writes `state` (serializer output concatenated with the memory dump) to
/// the file for `name`, replacing any previous capture of that name.
///
/// Returns the written path.
///
/// # Errors
///
/// [`ConfigurationError::InvalidSnapshotName`] for a name that would
/// escape the directory; [`TransportError::Io`] for filesystem failures.
pub fn save_state_file(dir: &Path, name: &str, state: &[u8]) -> Result<PathBuf, RemoteError> {
    validate_name(name)?;
    let path = snapshot_path(dir, name);
    fs::write(&path, state).map_err(|err| TransportError::Io(format!("{}: {err}", path.display())))?;
    tracing::debug!(path = %path.display(), bytes = state.len(), "state saved");
    Ok(path)
}

/// Reads back the exact bytes previously saved under `name`.
///
/// # Errors
///
/// [`ConfigurationError::InvalidSnapshotName`] for a bad name;
/// [`TransportError::Io`] when the file is missing or unreadable.
pub fn load_state_file(dir: &Path, name: &str) -> Result<Vec<u8>, RemoteError> {
    validate_name(name)?;
    let path = snapshot_path(dir, name);
    let state = fs::read(&path)
        .map_err(|err| TransportError::Io(format!("{}: {err}", path.display())))?;
    tracing::debug!(path = %path.display(), bytes = state.len(), "state loaded");
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::{load_state_file, save_state_file, validate_name};
    use crate::error::{ConfigurationError, RemoteError};

    #[test]
    fn names_that_escape_the_directory_are_rejected() {
        assert!(validate_name("main").is_ok());
        assert!(validate_name("before-crash_2").is_ok());
        assert!(validate_name("v1.2").is_ok());

        for bad in ["", "..", "a/b", "a\\b", ".hidden", "a..b"] {
            assert!(validate_name(bad).is_err(), "{bad:?} must be rejected");
        }
    }

    #[test]
    fn save_then_load_round_trips_exactly() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state: Vec<u8> = (0_u32..1000).map(|n| (n % 251) as u8).collect();

        let path = save_state_file(dir.path(), "checkpoint", &state).expect("save");
        assert!(path.exists());

        let loaded = load_state_file(dir.path(), "checkpoint").expect("load");
        assert_eq!(loaded, state);
    }

    #[test]
    fn saving_again_replaces_the_previous_capture() {
        let dir = tempfile::tempdir().expect("tempdir");
        let _ = save_state_file(dir.path(), "slot", &[1, 2, 3]).expect("save");
        let _ = save_state_file(dir.path(), "slot", &[9, 9]).expect("save");
        assert_eq!(load_state_file(dir.path(), "slot").expect("load"), vec![9, 9]);
    }

    #[test]
    fn missing_files_surface_as_io_errors() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = load_state_file(dir.path(), "absent").expect_err("missing file");
        assert!(matches!(err, RemoteError::Transport(_)));

        let err = save_state_file(dir.path(), "../escape", &[]).expect_err("bad name");
        assert!(matches!(
            err,
            RemoteError::Configuration(ConfigurationError::InvalidSnapshotName { .. })
        ));
    }
}

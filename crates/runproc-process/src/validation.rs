//! Executable and working-directory validation.

use runproc_common::{ProcessError, ProcessResult};
use std::path::{Path, PathBuf};

/// Resolve the executable path a host should spawn.
///
/// Relative paths that name a directory component (`./tool`, `bin/tool`) are
/// resolved against the working directory, so the result does not depend on
/// the parent's own current directory. Bare names (`python3`) are left alone
/// for the OS to look up on `PATH`.
pub fn resolve_executable(executable: &Path, working_dir: &Path) -> PathBuf {
    if executable.is_relative() && executable.components().count() > 1 {
        working_dir.join(executable)
    } else {
        executable.to_path_buf()
    }
}

/// Validate that an executable path is usable.
///
/// Only checks what can be known before spawning; a missing file on `PATH`
/// is reported by the spawn itself.
pub fn validate_executable(path: &Path) -> ProcessResult<()> {
    if path.as_os_str().is_empty() {
        return Err(ProcessError::configuration(
            "validation",
            "Executable path cannot be empty",
        ));
    }

    if path.is_dir() {
        return Err(ProcessError::spawn_failed(
            path.display().to_string(),
            "Executable path is a directory",
        ));
    }

    Ok(())
}

/// Validate that the working directory exists.
pub fn validate_working_directory(dir: &Path) -> ProcessResult<()> {
    if !dir.is_dir() {
        return Err(ProcessError::spawn_failed(
            dir.display().to_string(),
            "Working directory does not exist or is not a directory",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_relative_with_separator() {
        let wd = Path::new("/work");
        assert_eq!(
            resolve_executable(Path::new("./tool"), wd),
            Path::new("/work").join("./tool")
        );
        assert_eq!(resolve_executable(Path::new("tool"), wd), PathBuf::from("tool"));
    }

    #[test]
    fn test_validate_executable() {
        assert!(matches!(
            validate_executable(Path::new("")),
            Err(ProcessError::Configuration { .. })
        ));

        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            validate_executable(dir.path()),
            Err(ProcessError::SpawnFailed { .. })
        ));
        assert!(validate_executable(Path::new("definitely-not-here")).is_ok());
    }

    #[test]
    fn test_validate_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(validate_working_directory(dir.path()).is_ok());
        assert!(validate_working_directory(&dir.path().join("missing")).is_err());
    }
}

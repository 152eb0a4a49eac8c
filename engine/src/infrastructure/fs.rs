//! Filesystem helpers with permission enforcement
//!
//! Sensitive files (control file, state database) must stay private to the
//! effective user. Violations abort startup rather than degrade silently.

use crate::constants::modes;
use crate::domain::{Error, Result};
use nix::unistd::{access, AccessFlags, Gid, Uid};
use std::fs::{DirBuilder, File, OpenOptions};
use std::os::unix::fs::{DirBuilderExt, MetadataExt, OpenOptionsExt};
use std::path::{Path, PathBuf};

/// Absolute representation of `path`, anchored at `root` when `path` is
/// relative. An empty `root` resolves against the current directory.
pub fn abs_from_root(path: &Path, root: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    if root.as_os_str().is_empty() {
        return std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| Path::new("/").join(path));
    }
    root.join(path)
}

pub fn file_exists(path: &Path) -> bool {
    path.metadata().is_ok()
}

/// True if `path` exists and is a regular file (or a link to one).
pub fn is_file(path: &Path) -> bool {
    path.metadata().map(|m| m.is_file()).unwrap_or(false)
}

/// True if `path` is writable, or does not exist but could be created in its
/// parent directory.
pub fn is_writable(path: &Path) -> bool {
    if !file_exists(path) {
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        return is_writable(&parent);
    }
    access(path, AccessFlags::W_OK).is_ok()
}

/// Checks that `path` is owned by the effective user, that its group matches
/// the effective group whenever `max_mode` grants any group bits, and that
/// its mode bits are a subset of `max_mode`.
pub fn ensure_permissions(path: &Path, max_mode: u32) -> Result<()> {
    let meta = path.metadata().map_err(|_| Error::NotReadable(path.to_path_buf()))?;
    let mode = meta.mode() & 0o777;

    if meta.uid() != Uid::effective().as_raw() {
        return Err(Error::NotOwner(path.to_path_buf()));
    }
    if max_mode & 0o077 != 0 && meta.gid() != Gid::effective().as_raw() {
        return Err(Error::WrongGroup(path.to_path_buf()));
    }
    let mask = !max_mode & 0o777;
    if mask & mode != 0 {
        return Err(Error::TooPermissive {
            path: path.to_path_buf(),
            max: max_mode,
            actual: mode,
        });
    }
    Ok(())
}

/// Checks that `path` carries owner-only permissions (0700 ceiling).
/// Missing or empty paths pass; the caller reports those separately.
pub fn ensure_safe_permissions(path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() || !file_exists(path) {
        return Ok(());
    }
    ensure_permissions(path, modes::MAX_SECURE)
}

/// Opens `path` with the provided options, refusing creation modes more
/// permissive than the owner-only ceiling. Missing parent directories are
/// created with mode 0700.
pub fn open_file_secure(path: &Path, mut opts: OpenOptions, mode: u32) -> Result<File> {
    if mode & !modes::MAX_SECURE & 0o777 != 0 {
        return Err(Error::ModeTooOpen {
            path: path.to_path_buf(),
            mode,
            max: modes::MAX_SECURE,
        });
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !file_exists(parent) {
            DirBuilder::new()
                .recursive(true)
                .mode(modes::PRIVATE_DIR)
                .create(parent)?;
        }
    }
    Ok(opts.mode(mode).open(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn touch(dir: &TempDir, name: &str, mode: u32) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, "x").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode)).unwrap();
        path
    }

    #[test]
    fn accepts_owner_only_modes() {
        let dir = TempDir::new().unwrap();
        for mode in [0o600, 0o700, 0o400] {
            let path = touch(&dir, &format!("f{:o}", mode), mode);
            ensure_safe_permissions(&path).unwrap();
        }
    }

    #[test]
    fn rejects_group_and_other_bits() {
        let dir = TempDir::new().unwrap();
        let path = touch(&dir, "open", 0o755);
        match ensure_safe_permissions(&path) {
            Err(Error::TooPermissive { actual, .. }) => assert_eq!(actual, 0o755),
            other => panic!("expected TooPermissive, got {:?}", other),
        }
    }

    #[test]
    fn missing_path_is_accepted() {
        ensure_safe_permissions(Path::new("/definitely/not/here")).unwrap();
    }

    #[test]
    fn open_file_secure_rejects_wide_modes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f");
        let mut opts = OpenOptions::new();
        opts.write(true).create(true);
        assert!(matches!(
            open_file_secure(&path, opts, 0o644),
            Err(Error::ModeTooOpen { .. })
        ));
    }

    #[test]
    fn open_file_secure_creates_private_parents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a/b/state");
        let mut opts = OpenOptions::new();
        opts.write(true).create(true);
        open_file_secure(&path, opts, 0o600).unwrap();
        let parent_mode = path.parent().unwrap().metadata().unwrap().mode() & 0o777;
        assert_eq!(parent_mode, 0o700);
    }

    #[test]
    fn writable_checks_fall_back_to_parent() {
        let dir = TempDir::new().unwrap();
        assert!(is_writable(&dir.path().join("not-there-yet")));
        assert!(is_writable(dir.path()));
    }
}

//! Filesystem operations
//!
//! Tree copies that keep symlinks as symlinks. Installed prefixes are full of
//! versioned library links (`libgpg-error.dylib -> libgpg-error.0.dylib`);
//! resolving them would duplicate every library.

use std::fs;
use std::ops::AddAssign;
use std::path::Path;

use walkdir::WalkDir;

use crate::error::FilesystemError;

/// What a tree copy created
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CopyStats {
    /// Regular files copied
    pub files: usize,
    /// Symlinks recreated
    pub symlinks: usize,
    /// Directories created
    pub dirs: usize,
}

impl AddAssign for CopyStats {
    fn add_assign(&mut self, other: Self) {
        self.files += other.files;
        self.symlinks += other.symlinks;
        self.dirs += other.dirs;
    }
}

/// Create a directory and all parent directories
pub fn create_dir_all(path: &Path) -> Result<(), FilesystemError> {
    fs::create_dir_all(path).map_err(|e| FilesystemError::CreateDir {
        path: path.to_path_buf(),
        error: e.to_string(),
    })
}

/// Remove a directory and all its contents
pub fn remove_dir_all(path: &Path) -> Result<(), FilesystemError> {
    if path.exists() {
        fs::remove_dir_all(path).map_err(|e| FilesystemError::Remove {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
    }
    Ok(())
}

/// Copy everything under `from` into `to`
pub fn copy_tree(from: &Path, to: &Path) -> Result<CopyStats, FilesystemError> {
    copy_tree_filtered(from, to, |_| true)
}

/// Copy the entries under `from` whose relative path passes `include`.
///
/// An excluded directory is skipped with its whole subtree. Symlinks are
/// recreated with their original target, dangling ones included. Existing
/// files at the destination are replaced.
pub fn copy_tree_filtered<F>(
    from: &Path,
    to: &Path,
    include: F,
) -> Result<CopyStats, FilesystemError>
where
    F: Fn(&Path) -> bool,
{
    if !from.is_dir() {
        return Err(FilesystemError::MissingDirectory {
            path: from.to_path_buf(),
        });
    }

    let mut stats = CopyStats::default();
    let walker = WalkDir::new(from)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry
                .path()
                .strip_prefix(from)
                .map_or(true, |rel| rel.as_os_str().is_empty() || include(rel))
        });

    for entry in walker {
        let entry = entry.map_err(|e| FilesystemError::ReadDir {
            path: from.to_path_buf(),
            error: e.to_string(),
        })?;
        let rel = entry
            .path()
            .strip_prefix(from)
            .map_err(|e| FilesystemError::ReadDir {
                path: entry.path().to_path_buf(),
                error: e.to_string(),
            })?;
        let target = to.join(rel);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            if !target.is_dir() {
                create_dir_all(&target)?;
                stats.dirs += 1;
            }
        } else if file_type.is_symlink() {
            clear(&target)?;
            copy_symlink(entry.path(), &target)?;
            stats.symlinks += 1;
        } else {
            clear(&target)?;
            fs::copy(entry.path(), &target).map_err(|e| FilesystemError::Copy {
                from: entry.path().to_path_buf(),
                to: target.clone(),
                error: e.to_string(),
            })?;
            stats.files += 1;
        }
    }
    Ok(stats)
}

/// Remove a file or link so a copy never writes through an old symlink
fn clear(path: &Path) -> Result<(), FilesystemError> {
    match fs::symlink_metadata(path) {
        Ok(meta) if !meta.is_dir() => {
            fs::remove_file(path).map_err(|e| FilesystemError::Remove {
                path: path.to_path_buf(),
                error: e.to_string(),
            })
        }
        _ => Ok(()),
    }
}

#[cfg(unix)]
fn copy_symlink(link: &Path, target: &Path) -> Result<(), FilesystemError> {
    let dest = fs::read_link(link).map_err(|e| FilesystemError::Symlink {
        path: link.to_path_buf(),
        error: e.to_string(),
    })?;
    std::os::unix::fs::symlink(&dest, target).map_err(|e| FilesystemError::Symlink {
        path: target.to_path_buf(),
        error: e.to_string(),
    })
}

#[cfg(not(unix))]
fn copy_symlink(link: &Path, target: &Path) -> Result<(), FilesystemError> {
    fs::copy(link, target)
        .map(|_| ())
        .map_err(|e| FilesystemError::Copy {
            from: link.to_path_buf(),
            to: target.to_path_buf(),
            error: e.to_string(),
        })
}

use std::ffi::OsStr;
use std::fs;
use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;

use crate::error::YoinkError;

const MAX_SYMLINK_HOPS: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedExecutable {
    pub path: PathBuf,
    pub is_executable: bool,
}

/// Finds the command `name` inside the extracted tree at `dir`.
///
/// Conventional bin directories are tried first, in order. Failing that, the
/// whole tree is searched for an executable file called `name`; when there
/// are several, the shortest path wins and a warning is logged.
///
/// Symlinks are followed inside `dir`: an absolute target such as
/// `/usr/lib/foo/foo` is read as `<dir>/usr/lib/foo/foo`, never as the host
/// path.
///
/// # Errors
/// Returns [`YoinkError::ExecutableNotFound`] when no candidate exists.
pub fn resolve_executable(
    dir: &Path,
    name: &str,
    bin_dirs: &[&str],
) -> Result<ResolvedExecutable, YoinkError> {
    for bin in bin_dirs {
        let candidate = dir.join(bin).join(name);
        if let Some(target) = follow_within(dir, &candidate).filter(|path| path.is_file()) {
            tracing::debug!(path = %target.display(), "found executable in bin dir");
            return Ok(ResolvedExecutable {
                is_executable: is_executable(&target),
                path: target,
            });
        }
    }

    let mut matches: Vec<(String, PathBuf)> = WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_name() == OsStr::new(name))
        .filter_map(|entry| {
            let target = follow_within(dir, entry.path())?;
            if !target.is_file() || !is_executable(&target) {
                return None;
            }
            let shown = entry
                .path()
                .strip_prefix(dir)
                .unwrap_or(entry.path())
                .display()
                .to_string();
            Some((shown, target))
        })
        .collect();
    matches.sort_by(|(a, _), (b, _)| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));

    let Some((chosen, path)) = matches.first().cloned() else {
        return Err(YoinkError::ExecutableNotFound {
            name: name.to_string(),
            dir: dir.to_path_buf(),
        });
    };
    if matches.len() > 1 {
        let others: Vec<&str> = matches[1..].iter().map(|(shown, _)| shown.as_str()).collect();
        tracing::warn!(
            "several executables named `{name}` in the package; using {chosen} (also found: {})",
            others.join(", ")
        );
    }
    Ok(ResolvedExecutable {
        path,
        is_executable: true,
    })
}

/// Resolves symlinks at `path`, re-rooting absolute targets at `root`.
///
/// `None` for dangling links, loops, and targets that leave `root`.
fn follow_within(root: &Path, path: &Path) -> Option<PathBuf> {
    let root = normalize(root);
    let mut current = path.to_path_buf();
    for _ in 0..MAX_SYMLINK_HOPS {
        let meta = fs::symlink_metadata(&current).ok()?;
        if !meta.file_type().is_symlink() {
            return Some(current);
        }
        let target = fs::read_link(&current).ok()?;
        let next = if target.is_absolute() {
            root.join(target.strip_prefix("/").ok()?)
        } else {
            current.parent()?.join(target)
        };
        current = normalize(&next);
        if !current.starts_with(&root) {
            return None;
        }
    }
    None
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path).is_ok_and(|meta| meta.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::{symlink, PermissionsExt};
    use tempfile::tempdir;

    use crate::backend::DEFAULT_BIN_DIRS;

    fn write(path: &Path, mode: u32) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "#!/bin/sh\n").unwrap();
        fs::set_permissions(path, fs::Permissions::from_mode(mode)).unwrap();
    }

    #[test]
    fn bin_dirs_are_tried_in_order() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        write(&root.join("usr/sbin/tool"), 0o755);
        write(&root.join("usr/bin/tool"), 0o755);

        let found = resolve_executable(root, "tool", DEFAULT_BIN_DIRS).unwrap();
        assert_eq!(found.path, root.join("usr/bin/tool"));
        assert!(found.is_executable);
    }

    #[test]
    fn bin_dir_match_reports_missing_exec_bit() {
        let temp = tempdir().unwrap();
        write(&temp.path().join("bin/tool"), 0o644);
        let found = resolve_executable(temp.path(), "tool", DEFAULT_BIN_DIRS).unwrap();
        assert!(!found.is_executable);
    }

    #[test]
    fn tree_search_prefers_shortest_path() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        write(&root.join("opt/tool/libexec/deeper/tool"), 0o755);
        write(&root.join("opt/tool/tool"), 0o755);
        write(&root.join("opt/aaa/tool"), 0o644);

        let found = resolve_executable(root, "tool", DEFAULT_BIN_DIRS).unwrap();
        assert_eq!(found.path, root.join("opt/tool/tool"));
    }

    #[test]
    fn tree_search_breaks_ties_lexicographically() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        write(&root.join("opt/b/tool"), 0o755);
        write(&root.join("opt/a/tool"), 0o755);

        let found = resolve_executable(root, "tool", DEFAULT_BIN_DIRS).unwrap();
        assert_eq!(found.path, root.join("opt/a/tool"));
    }

    #[test]
    fn absolute_symlinks_stay_inside_the_tree() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        write(&root.join("usr/lib/tool/tool"), 0o755);
        fs::create_dir_all(root.join("usr/bin")).unwrap();
        symlink("/usr/lib/tool/tool", root.join("usr/bin/tool")).unwrap();

        let found = resolve_executable(root, "tool", DEFAULT_BIN_DIRS).unwrap();
        assert_eq!(found.path, root.join("usr/lib/tool/tool"));
    }

    #[test]
    fn relative_symlinks_are_followed() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        write(&root.join("usr/share/tool/run.sh"), 0o755);
        fs::create_dir_all(root.join("usr/bin")).unwrap();
        symlink("../share/tool/run.sh", root.join("usr/bin/tool")).unwrap();

        let found = resolve_executable(root, "tool", DEFAULT_BIN_DIRS).unwrap();
        assert_eq!(found.path, root.join("usr/share/tool/run.sh"));
    }

    #[test]
    fn escaping_or_looping_links_are_ignored() {
        let temp = tempdir().unwrap();
        let root = temp.path().join("pkg");
        fs::create_dir_all(root.join("usr/bin")).unwrap();
        write(&temp.path().join("outside"), 0o755);
        symlink("../../../outside", root.join("usr/bin/tool")).unwrap();
        symlink("loop", root.join("usr/bin/loop")).unwrap();

        let err = resolve_executable(&root, "tool", DEFAULT_BIN_DIRS).unwrap_err();
        assert_eq!(err.reason(), "executable_not_found");
        assert!(resolve_executable(&root, "loop", DEFAULT_BIN_DIRS).is_err());
    }

    #[test]
    fn missing_command_is_reported() {
        let temp = tempdir().unwrap();
        write(&temp.path().join("usr/bin/other"), 0o755);
        let err = resolve_executable(temp.path(), "tool", DEFAULT_BIN_DIRS).unwrap_err();
        assert!(matches!(err, YoinkError::ExecutableNotFound { .. }));
    }
}

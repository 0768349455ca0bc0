//! Locating the compiler executable.

use std::{
    env,
    ffi::OsStr,
    path::{Path, PathBuf},
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolchainError {
    #[error("compiler `{program}` not found in PATH")]
    NotInPath { program: String },
    #[error("compiler `{}` is not an executable file", path.display())]
    NotExecutable { path: PathBuf },
}

/// Resolve `program` to an executable path.
///
/// A bare name is searched for in every `PATH` entry; anything containing a
/// path separator is checked as given.
pub fn locate(program: &Path) -> Result<PathBuf, ToolchainError> {
    if program.components().count() > 1 {
        return if is_executable(program) {
            Ok(program.to_path_buf())
        } else {
            Err(ToolchainError::NotExecutable {
                path: program.to_path_buf(),
            })
        };
    }

    locate_in(program.as_os_str(), env::var_os("PATH").as_deref()).ok_or_else(|| {
        ToolchainError::NotInPath {
            program: program.display().to_string(),
        }
    })
}

fn locate_in(program: &OsStr, path_var: Option<&OsStr>) -> Option<PathBuf> {
    let path_var = path_var?;
    for dir in env::split_paths(path_var) {
        let full = dir.join(program);
        if is_executable(&full) {
            return Some(full);
        }
        #[cfg(windows)]
        {
            let mut exe = full.into_os_string();
            exe.push(".exe");
            let exe = PathBuf::from(exe);
            if is_executable(&exe) {
                return Some(exe);
            }
        }
    }
    None
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

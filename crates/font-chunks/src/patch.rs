//! Font pre-processing commands.

use std::{fs, path::Path, process::Command};

use crate::errors::Error;

/// Runs `commands` in order on a temporary copy of `font` and returns the patched bytes.
/// Each command gets the path to the copy as its last argument and runs in `working_dir`.
///
/// # Errors
///
/// Returns [`Error::Patch`] if a command cannot be started or exits with a non-zero status.
pub fn apply_patches(
    font: &[u8],
    commands: &[Vec<String>],
    working_dir: &Path,
) -> Result<Vec<u8>, Error> {
    if commands.is_empty() {
        return Ok(font.to_vec());
    }

    let dir = tempfile::tempdir().map_err(Error::io(std::env::temp_dir()))?;
    let path = dir.path().join("font.ttf");
    fs::write(&path, font).map_err(Error::io(&path))?;

    for command in commands {
        let Some((program, args)) = command.split_first() else {
            continue;
        };
        let command_line = command.join(" ");
        log::debug!("running patch command `{command_line}`");
        let output = Command::new(program)
            .args(args)
            .arg(&path)
            .current_dir(working_dir)
            .output()
            .map_err(|err| Error::Patch {
                command: command_line.clone(),
                message: err.to_string(),
            })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let mut message = output.status.to_string();
            if !stderr.trim().is_empty() {
                message = format!("{message}: {}", stderr.trim());
            }
            return Err(Error::Patch {
                command: command_line,
                message,
            });
        }
    }
    fs::read(&path).map_err(Error::io(&path))
}

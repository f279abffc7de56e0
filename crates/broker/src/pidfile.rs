use std::io;
use std::path::Path;

use anyhow::{Context, Result};

pub fn write(path: &Path, pid: u32) -> Result<()> {
	if let Some(parent) = path.parent() {
		if !parent.as_os_str().is_empty() && !parent.exists() {
			std::fs::create_dir_all(parent)
				.with_context(|| format!("Failed to create pid file directory: {}", parent.display()))?;
		}
	}
	std::fs::write(path, format!("{pid}\n"))
		.with_context(|| format!("Failed to write pid file: {}", path.display()))
}

/// Process id recorded at `path`, if the file exists and holds one.
pub fn read(path: &Path) -> Option<u32> {
	std::fs::read_to_string(path).ok()?.trim().parse::<u32>().ok()
}

/// Removes the pid file. A missing file is not an error.
pub fn remove(path: &Path) -> io::Result<()> {
	match std::fs::remove_file(path) {
		Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
		other => other,
	}
}

//! # Resources Module
//!
//! Lookup of the static files shipped alongside an application, such as
//! default config templates or media assets. Resources live in a plain
//! directory; special and hidden entries are ignored.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors raised when accessing resource files.
#[derive(Debug, Error)]
pub enum ResourceError {
    /// The requested file is not in the resource directory.
    #[error("File '{0}' not found within resources")]
    NotFound(String),

    /// The resource directory itself cannot be read.
    #[error("Unable to read resource directory '{directory}': {source}")]
    Io {
        /// Directory that failed to read.
        directory: String,
        /// Underlying filesystem error.
        #[source]
        source: std::io::Error,
    },
}

fn is_special(name: &str) -> bool {
    name.starts_with("__") || name.starts_with('.')
}

/// List the resource files of a directory.
///
/// Special files (hidden or dunder-named) are filtered out. The list is
/// sorted for stable output.
pub fn list_resources(directory: &Path) -> Result<Vec<String>, ResourceError> {
    let entries = fs::read_dir(directory).map_err(|source| ResourceError::Io {
        directory: directory.display().to_string(),
        source,
    })?;

    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| !is_special(name))
        .collect();

    names.sort();
    Ok(names)
}

/// Get an arbitrary resource file.
///
/// Returns the absolute path of the file within the resource directory.
pub fn get_file(directory: &Path, filename: &str) -> Result<PathBuf, ResourceError> {
    let path = directory.join(filename);

    if !path.is_file() {
        return Err(ResourceError::NotFound(filename.to_string()));
    }

    Ok(path)
}

/// Resource getter bound to one directory.
///
/// The human readable name is used in logs only, the errors carry the file
/// name.
#[derive(Debug, Clone)]
pub struct ResourceDirectory {
    directory: PathBuf,
    name: String,
}

impl ResourceDirectory {
    /// Create a getter for the given directory.
    pub fn new(directory: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            name: name.into(),
        }
    }

    /// Get a file within the resource directory.
    pub fn get(&self, filename: &str) -> Result<PathBuf, ResourceError> {
        log::debug!("Getting {} file '{}'", self.name, filename);
        get_file(&self.directory, filename)
    }

    /// List the files of the resource directory.
    pub fn list(&self) -> Result<Vec<String>, ResourceError> {
        list_resources(&self.directory)
    }
}

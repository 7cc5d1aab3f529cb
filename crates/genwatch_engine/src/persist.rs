use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::Builder;
use thiserror::Error;

/// Name of the file listing the jobs to resume, inside the state directory.
pub const SESSION_FILENAME: &str = ".genwatch_state.ron";

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("state directory {path:?} unusable: {reason}")]
    StateDir { path: PathBuf, reason: String },
    #[error("session file {path:?}: {source}")]
    Session {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn state_dir_error(dir: &Path, reason: impl ToString) -> PersistError {
    PersistError::StateDir {
        path: dir.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// Creates the state directory if needed and checks that the session file
/// and the log can be written next to each other in it.
pub fn ensure_state_dir(dir: &Path) -> Result<(), PersistError> {
    match fs::metadata(dir) {
        Ok(meta) if !meta.is_dir() => return Err(state_dir_error(dir, "not a directory")),
        Ok(_) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            fs::create_dir_all(dir).map_err(|err| state_dir_error(dir, err))?;
        }
        Err(err) => return Err(state_dir_error(dir, err)),
    }
    Builder::new()
        .prefix(".genwatch-check")
        .tempfile_in(dir)
        .map_err(|err| state_dir_error(dir, err))?;
    Ok(())
}

/// The session file of one state directory.
///
/// Replacing goes through a sibling temp file and a rename, so a crash
/// mid-write leaves the previous session intact.
#[derive(Debug, Clone)]
pub struct SessionFile {
    dir: PathBuf,
    path: PathBuf,
}

impl SessionFile {
    pub fn new(state_dir: &Path) -> Self {
        Self {
            dir: state_dir.to_path_buf(),
            path: state_dir.join(SESSION_FILENAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `None` when no session was saved yet.
    pub fn read(&self) -> Result<Option<String>, PersistError> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(Some(content)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(self.session_error(source)),
        }
    }

    pub fn replace(&self, content: &str) -> Result<(), PersistError> {
        ensure_state_dir(&self.dir)?;
        let mut tmp = Builder::new()
            .prefix(SESSION_FILENAME)
            .suffix(".tmp")
            .tempfile_in(&self.dir)
            .map_err(|source| self.session_error(source))?;
        tmp.write_all(content.as_bytes())
            .and_then(|()| tmp.as_file_mut().sync_all())
            .map_err(|source| self.session_error(source))?;
        tmp.persist(&self.path)
            .map_err(|err| self.session_error(err.error))?;
        Ok(())
    }

    /// Forgets the saved session; nothing saved is fine.
    pub fn clear(&self) -> Result<(), PersistError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(self.session_error(source)),
        }
    }

    fn session_error(&self, source: io::Error) -> PersistError {
        PersistError::Session {
            path: self.path.clone(),
            source,
        }
    }
}

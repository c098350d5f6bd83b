//! Stop requests signalled through marker files in the shared directory.

use crate::process::{
    domain::StopRequestKind,
    ports::{ProcessHostError, ProcessHostResult, StopSignalSource},
};
use camino::Utf8Path;
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use std::io::ErrorKind;

/// Marker file requesting a graceful stop.
pub const STOP_MARKER: &str = "stop";
/// Marker file requesting a hard stop.
pub const HARD_STOP_MARKER: &str = "hardstop";

/// Reads stop requests from marker files.
///
/// Any process (or operator) able to write to the shared directory can ask
/// the node to stop by creating `stop` or `hardstop` there.
#[derive(Debug)]
pub struct FileStopSignals {
    dir: Dir,
}

impl FileStopSignals {
    /// Opens the shared directory at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessHostError::Runtime`] when the directory cannot be
    /// opened.
    pub fn open(path: &Utf8Path) -> ProcessHostResult<Self> {
        let dir = Dir::open_ambient_dir(path, ambient_authority()).map_err(ProcessHostError::runtime)?;
        Ok(Self { dir })
    }

    /// Creates the marker for `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessHostError::Runtime`] when the marker cannot be
    /// written.
    pub fn request(&self, kind: StopRequestKind) -> ProcessHostResult<()> {
        self.dir
            .write(marker_name(kind), b"")
            .map_err(ProcessHostError::runtime)
    }
}

const fn marker_name(kind: StopRequestKind) -> &'static str {
    match kind {
        StopRequestKind::Graceful => STOP_MARKER,
        StopRequestKind::Hard => HARD_STOP_MARKER,
    }
}

impl StopSignalSource for FileStopSignals {
    fn is_requested(&self, kind: StopRequestKind) -> ProcessHostResult<bool> {
        match self.dir.metadata(marker_name(kind)) {
            Ok(_) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(ProcessHostError::runtime(err)),
        }
    }

    fn clear(&self) -> ProcessHostResult<()> {
        for kind in [StopRequestKind::Graceful, StopRequestKind::Hard] {
            match self.dir.remove_file(marker_name(kind)) {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => return Err(ProcessHostError::runtime(err)),
            }
        }
        Ok(())
    }
}

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use waypoint_cbor::{from_cbor, to_canonical_cbor};

use super::{MirrorRecord, MirrorStore};
use crate::MirrorError;
use crate::error::io_error;

const RECORD_EXT: &str = "cbor";

/// Mirror persisted as one canonical CBOR file per tab under a directory.
#[derive(Debug, Clone)]
pub struct FsMirror {
    path: PathBuf,
}

impl FsMirror {
    pub fn open(dir: impl AsRef<Path>, tab: &str) -> Result<Self, MirrorError> {
        let valid = !tab.is_empty()
            && tab
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(MirrorError::InvalidTab(tab.to_owned()));
        }
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|err| io_error(dir, err))?;
        Ok(Self {
            path: dir.join(format!("{tab}.{RECORD_EXT}")),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MirrorStore for FsMirror {
    fn available(&self) -> bool {
        self.path.parent().is_some_and(Path::is_dir)
    }

    fn read(&self) -> Result<Option<MirrorRecord>, MirrorError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(io_error(&self.path, err)),
        };
        Ok(Some(from_cbor(&bytes)?))
    }

    fn write(&self, record: &MirrorRecord) -> Result<(), MirrorError> {
        let bytes = to_canonical_cbor(record)?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, &bytes).map_err(|err| io_error(&tmp, err))?;
        fs::rename(&tmp, &self.path).map_err(|err| io_error(&self.path, err))?;
        Ok(())
    }
}

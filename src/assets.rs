//! Access to bundled voice data and dictionaries.
//!
//! The engine ships its waveform data (`Josip.bin`, `Vlado.bin`) and the
//! bundled dictionaries (`dictionaries/*.json`) either as a plain directory
//! or, with the `bundle` feature, inside a zip package.

use std::io;
use std::path::{Path, PathBuf};

/// Read-only store of named binary assets.
pub trait AssetSource: Send + Sync {
    fn read(&self, name: &str) -> io::Result<Vec<u8>>;

    fn exists(&self, name: &str) -> bool {
        self.read(name).is_ok()
    }
}

/// Assets laid out under a directory on disk.
#[derive(Debug, Clone)]
pub struct DirectoryAssets {
    root: PathBuf,
}

impl DirectoryAssets {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl AssetSource for DirectoryAssets {
    fn read(&self, name: &str) -> io::Result<Vec<u8>> {
        let path = self.root.join(name);
        std::fs::read(&path).map_err(|e| {
            io::Error::new(e.kind(), format!("Asset {} unavailable: {e}", path.display()))
        })
    }

    fn exists(&self, name: &str) -> bool {
        self.root.join(name).is_file()
    }
}

/// Assets stored inside a zip package, read entry by entry on demand.
#[cfg(feature = "bundle")]
#[derive(Debug, Clone)]
pub struct ZipAssets {
    archive: PathBuf,
}

#[cfg(feature = "bundle")]
impl ZipAssets {
    /// Open a package, failing early if it is not a readable zip archive.
    pub fn open(archive: impl Into<PathBuf>) -> io::Result<Self> {
        let archive = archive.into();
        let file = std::fs::File::open(&archive)?;
        let zip = zip::ZipArchive::new(file).map_err(|e| {
            io::Error::new(io::ErrorKind::InvalidData, format!("Failed to open zip archive: {e}"))
        })?;
        log::info!("Opened asset bundle {} ({} entries)", archive.display(), zip.len());
        Ok(Self { archive })
    }
}

#[cfg(feature = "bundle")]
impl AssetSource for ZipAssets {
    fn read(&self, name: &str) -> io::Result<Vec<u8>> {
        use std::io::Read;

        let file = std::fs::File::open(&self.archive)?;
        let mut zip = zip::ZipArchive::new(file).map_err(|e| {
            io::Error::new(io::ErrorKind::InvalidData, format!("Failed to open zip archive: {e}"))
        })?;
        let mut entry = zip.by_name(name).map_err(|e| {
            io::Error::new(io::ErrorKind::NotFound, format!("Asset {name} unavailable: {e}"))
        })?;

        let mut data = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut data)?;
        Ok(data)
    }
}

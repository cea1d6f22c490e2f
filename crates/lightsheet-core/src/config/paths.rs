use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{LightsheetError, Result};

/// `paths.psf` as written in the configuration document.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RawPsfPaths {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub laser: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resampled: Option<BTreeMap<String, String>>,
}

/// `paths.flatfield` as written in the configuration document.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RawFlatfieldPaths {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dark: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub laser: Option<BTreeMap<String, String>>,
}

/// Point-spread-function files, keyed by laser wavelength (nm).
#[derive(Clone, Debug, PartialEq)]
pub struct PsfPaths {
    pub dir: PathBuf,
    pub laser: BTreeMap<u32, PathBuf>,
    pub resampled: BTreeMap<u32, PathBuf>,
}

/// Dark image and per-laser normalisation images for flatfield correction.
#[derive(Clone, Debug, PartialEq)]
pub struct FlatfieldPaths {
    pub dir: PathBuf,
    pub dark: PathBuf,
    pub laser: BTreeMap<u32, PathBuf>,
}

fn resolve_dir(root: &Path, dir: Option<&str>, what: &str) -> PathBuf {
    match dir {
        Some(dir) => root.join(dir),
        None => {
            warn!("no {what} directory provided, using '{}'", root.display());
            root.to_path_buf()
        }
    }
}

fn laser_table(
    dir: &Path,
    table: &BTreeMap<String, String>,
    what: &str,
) -> Result<BTreeMap<u32, PathBuf>> {
    table
        .iter()
        .map(|(laser, file)| {
            let wavelength = laser.trim().parse::<u32>().map_err(|_| {
                LightsheetError::Config(format!(
                    "{what} key '{laser}' is not a laser wavelength"
                ))
            })?;
            Ok((wavelength, dir.join(file)))
        })
        .collect()
}

fn require_file(path: &Path, what: &str) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(LightsheetError::Config(format!(
            "{what} '{}' does not exist",
            path.display()
        )))
    }
}

impl PsfPaths {
    /// `need_laser` / `need_resampled` reflect whether decon and decon-first
    /// are enabled; each requires its own table.
    pub fn from_raw(
        root: &Path,
        raw: &RawPsfPaths,
        need_laser: bool,
        need_resampled: bool,
    ) -> Result<Self> {
        let dir = resolve_dir(root, raw.dir.as_deref(), "psf");

        let laser = match &raw.laser {
            Some(table) => laser_table(&dir, table, "psf laser")?,
            None if need_laser => {
                return Err(LightsheetError::Config("no psf files provided".into()))
            }
            None => BTreeMap::new(),
        };
        let resampled = match &raw.resampled {
            Some(table) => laser_table(&dir, table, "resampled psf")?,
            None if need_resampled => {
                return Err(LightsheetError::Config(
                    "no resampled psf files provided for decon-first".into(),
                ))
            }
            None => BTreeMap::new(),
        };

        Ok(Self {
            dir,
            laser,
            resampled,
        })
    }

    pub fn check_files(&self) -> Result<()> {
        for (laser, path) in &self.laser {
            require_file(path, &format!("laser {laser} psf file"))?;
        }
        for (laser, path) in &self.resampled {
            require_file(path, &format!("resampled {laser} psf file"))?;
        }
        Ok(())
    }
}

impl FlatfieldPaths {
    pub fn from_raw(root: &Path, raw: &RawFlatfieldPaths) -> Result<Self> {
        let dir = resolve_dir(root, raw.dir.as_deref(), "flatfield");
        let dark = raw.dark.as_deref().ok_or_else(|| {
            LightsheetError::Config("no dark image provided for flatfield correction".into())
        })?;
        let table = raw.laser.as_ref().ok_or_else(|| {
            LightsheetError::Config("no normalized flatfield images found in config".into())
        })?;
        Ok(Self {
            dark: dir.join(dark),
            laser: laser_table(&dir, table, "flatfield laser")?,
            dir,
        })
    }

    pub fn check_files(&self) -> Result<()> {
        require_file(&self.dark, "dark image file")?;
        for (laser, path) in &self.laser {
            require_file(path, &format!("laser {laser} normalized flatfield file"))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn psf_tables_are_keyed_by_wavelength() {
        let raw = RawPsfPaths {
            dir: Some("psf".into()),
            laser: Some(BTreeMap::from([("488".into(), "488_PSF.tif".into())])),
            resampled: None,
        };
        let paths = PsfPaths::from_raw(Path::new("/data"), &raw, true, false).unwrap();
        assert_eq!(paths.laser[&488], PathBuf::from("/data/psf/488_PSF.tif"));
    }

    #[test]
    fn missing_resampled_table_is_fatal_for_decon_first() {
        let raw = RawPsfPaths::default();
        let err = PsfPaths::from_raw(Path::new("/data"), &raw, false, true).unwrap_err();
        assert!(err.is_fatal_for_run());
    }

    #[test]
    fn non_numeric_laser_key_is_rejected() {
        let raw = RawFlatfieldPaths {
            dir: None,
            dark: Some("dark.tif".into()),
            laser: Some(BTreeMap::from([("blue".into(), "n.tif".into())])),
        };
        assert!(FlatfieldPaths::from_raw(Path::new("/data"), &raw).is_err());
    }
}

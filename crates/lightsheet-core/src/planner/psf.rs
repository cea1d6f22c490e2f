use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::PipelineConfig;
use crate::consts::SETTINGS_SUFFIX;
use crate::error::{LightsheetError, Result};
use crate::metadata::{InstrumentMetadata, ScanMotion};
use crate::settings::{read_settings, Axis};

/// A PSF image and the plane spacing it was recorded with.
#[derive(Clone, Debug, PartialEq)]
pub struct PsfEntry {
    pub path: PathBuf,
    pub z_step: f64,
}

/// PSFs per laser wavelength, read once before any acquisition is planned.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PsfCatalog {
    laser: BTreeMap<u32, PsfEntry>,
    resampled: BTreeMap<u32, PsfEntry>,
}

/// Settings dump recorded next to a PSF image: `<stem>_Settings.txt`.
pub fn psf_settings_path(psf: &Path) -> PathBuf {
    let stem = psf
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    psf.with_file_name(format!("{stem}_{SETTINGS_SUFFIX}"))
}

/// Plane spacing of a PSF. Only orthogonal acquisitions are usable; a
/// skewed PSF cannot deconvolve anything.
pub fn psf_z_step(metadata: &InstrumentMetadata) -> Result<f64> {
    let axis = match metadata.motion() {
        ScanMotion::XzStageGalvo => Axis::XzStageOffset,
        ScanMotion::ZGalvoPiezo => Axis::ZPzt,
        skewed @ (ScanMotion::XStage | ScanMotion::SamplePiezo) => {
            return Err(LightsheetError::Config(format!(
                "PSF '{}' is skewed ({skewed}) and cannot be used for decon",
                metadata.source().display()
            )))
        }
    };
    metadata
        .table(axis)
        .and_then(|t| t.interval.first().copied())
        .ok_or_else(|| {
            LightsheetError::Config(format!(
                "PSF settings '{}' have no {} interval",
                metadata.source().display(),
                axis.label()
            ))
        })
}

fn read_entry(laser: u32, psf: &Path, what: &str) -> Result<PsfEntry> {
    let settings = psf_settings_path(psf);
    if !settings.is_file() {
        return Err(LightsheetError::Config(format!(
            "{what} {laser} psf file '{}' does not have a Settings file",
            psf.display()
        )));
    }
    // Any defect in a PSF is a configuration problem for the whole run.
    let doc = read_settings(&settings).map_err(|e| LightsheetError::Config(e.to_string()))?;
    let metadata = InstrumentMetadata::from_settings(&settings, &doc)
        .map_err(|e| LightsheetError::Config(e.to_string()))?;
    let z_step = psf_z_step(&metadata)?;
    debug!(laser, z_step, psf = %psf.display(), "{what} psf");
    Ok(PsfEntry {
        path: psf.to_path_buf(),
        z_step,
    })
}

impl PsfCatalog {
    /// Read every configured PSF needed by the enabled stages. Returns
    /// `None` when neither decon nor decon-first is enabled.
    pub fn load(config: &PipelineConfig) -> Result<Option<Self>> {
        let Some(paths) = &config.psf else {
            return Ok(None);
        };
        if config.decon.is_none() && config.decon_first.is_none() {
            return Ok(None);
        }

        let mut catalog = Self::default();
        if config.decon.is_some() {
            for (&laser, path) in &paths.laser {
                catalog.laser.insert(laser, read_entry(laser, path, "laser")?);
            }
        }
        if config.decon_first.is_some() {
            for (&laser, path) in &paths.resampled {
                catalog
                    .resampled
                    .insert(laser, read_entry(laser, path, "resampled")?);
            }
        }
        Ok(Some(catalog))
    }

    pub fn from_entries(
        laser: BTreeMap<u32, PsfEntry>,
        resampled: BTreeMap<u32, PsfEntry>,
    ) -> Self {
        Self { laser, resampled }
    }

    pub fn laser(&self, wavelength: u32) -> Option<&PsfEntry> {
        self.laser.get(&wavelength)
    }

    pub fn resampled(&self, wavelength: u32) -> Option<&PsfEntry> {
        self.resampled.get(&wavelength)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{AxisTable, SettingsDocument, WaveformSection};

    fn psf_metadata(motion: &str, table: Option<AxisTable>) -> InstrumentMetadata {
        let doc = SettingsDocument {
            waveform: Some(WaveformSection {
                z_motion: Some(motion.into()),
                xz_stage_offset: table,
                ..Default::default()
            }),
            ..Default::default()
        };
        InstrumentMetadata::from_settings(Path::new("psf_Settings.txt"), &doc).unwrap()
    }

    #[test]
    fn settings_path_sits_next_to_the_psf() {
        assert_eq!(
            psf_settings_path(Path::new("/psf/488_PSF.tif")),
            PathBuf::from("/psf/488_PSF_Settings.txt")
        );
    }

    #[test]
    fn orthogonal_psf_uses_first_interval() {
        let md = psf_metadata(
            "Z galvo & DO XZ stage",
            Some(AxisTable {
                offset: vec![0.0, 0.0],
                interval: vec![0.1, 0.2],
                no_pixels_for_excitation: vec![1, 1],
            }),
        );
        assert_eq!(psf_z_step(&md).unwrap(), 0.1);
    }

    #[test]
    fn skewed_psf_is_fatal() {
        let err = psf_z_step(&psf_metadata("X stage", None)).unwrap_err();
        assert!(err.is_fatal_for_run());
        assert!(err.to_string().contains("skewed"));
    }
}

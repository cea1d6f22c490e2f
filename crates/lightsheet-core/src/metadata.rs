use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{LightsheetError, Result};
use crate::settings::{Axis, AxisTable, SettingsDocument, TileLocation, WaveformSection};

/// How the sample was moved through the light sheet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScanMotion {
    SamplePiezo,
    ZGalvoPiezo,
    XStage,
    XzStageGalvo,
}

impl ScanMotion {
    /// Parse the `Z motion` field of a settings dump.
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_ascii_lowercase().as_str() {
            "sample piezo" | "s piezo" => Some(Self::SamplePiezo),
            "z galvo & piezo" => Some(Self::ZGalvoPiezo),
            "x stage" => Some(Self::XStage),
            "z galvo & do xz stage" => Some(Self::XzStageGalvo),
            _ => None,
        }
    }

    /// Stage and piezo scans move the sample obliquely to the detection
    /// axis and leave the volume sheared.
    pub fn is_skewed(&self) -> bool {
        matches!(self, Self::XStage | Self::SamplePiezo)
    }

    /// Axis whose interval table holds the per-channel scan step.
    pub fn scan_axis(&self) -> Axis {
        match self {
            Self::SamplePiezo => Axis::SPiezo,
            Self::ZGalvoPiezo => Axis::ZPzt,
            Self::XStage => Axis::XStageOffset,
            Self::XzStageGalvo => Axis::XzStageOffset,
        }
    }
}

impl fmt::Display for ScanMotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SamplePiezo => write!(f, "Sample piezo"),
            Self::ZGalvoPiezo => write!(f, "Z galvo & piezo"),
            Self::XStage => write!(f, "X stage"),
            Self::XzStageGalvo => write!(f, "Z galvo & DO XZ stage"),
        }
    }
}

/// Instrument facts about one acquisition, read from its parsed settings.
#[derive(Clone, Debug)]
pub struct InstrumentMetadata {
    source: PathBuf,
    motion: ScanMotion,
    waveform: WaveformSection,
    tile: Option<TileLocation>,
}

impl InstrumentMetadata {
    /// Validate the parts of a settings document every stage relies on.
    /// `source` names the settings file in errors.
    pub fn from_settings(source: &Path, doc: &SettingsDocument) -> Result<Self> {
        let waveform = doc.waveform.as_ref().ok_or_else(|| {
            LightsheetError::metadata(source, "settings file did not contain a Waveform section")
        })?;
        let motion_text = waveform.z_motion.as_deref().ok_or_else(|| {
            LightsheetError::metadata(source, "settings file did not contain a Z motion field")
        })?;
        let motion = ScanMotion::parse(motion_text).ok_or_else(|| {
            LightsheetError::metadata(source, format!("unknown Z motion '{motion_text}'"))
        })?;

        if waveform.laser.len() != waveform.ch.len() {
            return Err(LightsheetError::metadata(
                source,
                format!(
                    "laser table has {} entries but channel table has {}",
                    waveform.laser.len(),
                    waveform.ch.len()
                ),
            ));
        }
        for axis in Axis::ALL {
            if let Some(table) = waveform.table(axis) {
                let n = table.interval.len();
                if table.offset.len() != n || table.no_pixels_for_excitation.len() != n {
                    return Err(LightsheetError::metadata(
                        source,
                        format!("{} table rows are not aligned", axis.label()),
                    ));
                }
            }
        }

        Ok(Self {
            source: source.to_path_buf(),
            motion,
            waveform: waveform.clone(),
            tile: doc.tiling,
        })
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn motion(&self) -> ScanMotion {
        self.motion
    }

    pub fn tile(&self) -> Option<TileLocation> {
        self.tile
    }

    /// Laser wavelength of every excitation event.
    pub fn lasers(&self) -> &[u32] {
        &self.waveform.laser
    }

    /// Channel slot of every excitation event, aligned with [`Self::lasers`].
    pub fn channels(&self) -> &[u32] {
        &self.waveform.ch
    }

    pub fn table(&self, axis: Axis) -> Option<&AxisTable> {
        self.waveform.table(axis)
    }

    pub(crate) fn error(&self, reason: impl Into<String>) -> LightsheetError {
        LightsheetError::metadata(&self.source, reason)
    }

    /// Fails when the acquisition recorded no lasers.
    pub fn require_lasers(&self) -> Result<&[u32]> {
        if self.waveform.laser.is_empty() {
            Err(self.error("settings file did not contain a Laser field"))
        } else {
            Ok(&self.waveform.laser)
        }
    }

    /// Positions in the laser table whose channel slot is `slot`, in table order.
    pub fn laser_positions(&self, slot: u32) -> Vec<usize> {
        self.waveform
            .ch
            .iter()
            .enumerate()
            .filter(|(_, ch)| **ch == slot)
            .map(|(i, _)| i)
            .collect()
    }

    /// Interval table of an axis, checked to cover every channel slot.
    pub fn intervals(&self, axis: Axis) -> Result<&[f64]> {
        let table = self.table(axis).ok_or_else(|| {
            self.error(format!(
                "settings file did not contain a {} Interval field",
                axis.label()
            ))
        })?;
        let slots = self.waveform.ch.iter().max().map_or(0, |&m| m as usize + 1);
        if table.interval.len() < slots {
            return Err(self.error(format!(
                "{} interval table has {} entries but {} channel(s) are defined",
                axis.label(),
                table.interval.len(),
                slots
            )));
        }
        Ok(&table.interval)
    }

    /// Raw scan intervals for the acquisition's motion mode, one per channel slot.
    pub fn scan_steps(&self) -> Result<&[f64]> {
        self.intervals(self.motion.scan_axis())
    }

    pub fn scan_step(&self, slot: u32) -> Result<f64> {
        self.scan_steps()?
            .get(slot as usize)
            .copied()
            .ok_or_else(|| self.error(format!("no scan interval for channel {slot}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(motion: &str, intervals: Vec<f64>, laser: Vec<u32>, ch: Vec<u32>) -> SettingsDocument {
        let n = intervals.len();
        SettingsDocument {
            waveform: Some(WaveformSection {
                z_motion: Some(motion.into()),
                x_stage_offset: Some(AxisTable {
                    offset: vec![0.0; n],
                    interval: intervals,
                    no_pixels_for_excitation: vec![101; n],
                }),
                laser,
                ch,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn motion_strings_are_case_insensitive() {
        assert_eq!(ScanMotion::parse("S piezo"), Some(ScanMotion::SamplePiezo));
        assert_eq!(ScanMotion::parse("x STAGE"), Some(ScanMotion::XStage));
        assert_eq!(
            ScanMotion::parse("Z galvo & DO XZ stage"),
            Some(ScanMotion::XzStageGalvo)
        );
        assert_eq!(ScanMotion::parse("Y stage"), None);
    }

    #[test]
    fn scan_steps_follow_motion_mode() {
        let md = InstrumentMetadata::from_settings(
            Path::new("a_Settings.txt"),
            &doc("X stage", vec![0.4, 0.45], vec![488, 560], vec![0, 1]),
        )
        .unwrap();
        assert_eq!(md.scan_steps().unwrap(), &[0.4, 0.45]);
        assert_eq!(md.scan_step(1).unwrap(), 0.45);
        assert!(md.motion().is_skewed());
    }

    #[test]
    fn misaligned_laser_table_is_rejected() {
        let err = InstrumentMetadata::from_settings(
            Path::new("a_Settings.txt"),
            &doc("X stage", vec![0.4], vec![488, 560], vec![0]),
        )
        .unwrap_err();
        assert!(matches!(err, LightsheetError::Metadata { .. }));
    }

    #[test]
    fn short_interval_table_is_rejected() {
        let md = InstrumentMetadata::from_settings(
            Path::new("a_Settings.txt"),
            &doc("X stage", vec![0.4], vec![488, 560], vec![0, 1]),
        )
        .unwrap();
        assert!(md.scan_steps().is_err());
    }

    #[test]
    fn missing_scan_table_is_reported_on_use() {
        let md = InstrumentMetadata::from_settings(
            Path::new("a_Settings.txt"),
            &doc("Z galvo & piezo", vec![0.4], vec![488], vec![0]),
        )
        .unwrap();
        let err = md.scan_steps().unwrap_err();
        assert!(err.to_string().contains("Z PZT"), "got: {err}");
    }

    #[test]
    fn simultaneous_lasers_share_positions() {
        let md = InstrumentMetadata::from_settings(
            Path::new("a_Settings.txt"),
            &doc("X stage", vec![0.4, 0.4], vec![488, 560, 642], vec![0, 1, 1]),
        )
        .unwrap();
        assert_eq!(md.laser_positions(1), vec![1, 2]);
        assert!(md.laser_positions(3).is_empty());
    }
}

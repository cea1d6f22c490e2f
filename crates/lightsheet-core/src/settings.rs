//! Parser for the instrument `Settings.txt` dump.
//!
//! The dump is split into sections framed by `***** ***** *****` banners.
//! Only the General, Notes, tile-location and Waveform sections are read;
//! everything else is ignored. The parsed document serialises to the same
//! kebab-case JSON layout that is written next to the raw data.

use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{LightsheetError, Result};

/// Stage or galvo axis with an offset/interval table in the Waveform section.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Axis {
    XGalvo,
    ZGalvo,
    ZPzt,
    SPiezo,
    IsmOffset,
    XStageOffset,
    XzStageOffset,
}

impl Axis {
    pub const ALL: [Axis; 7] = [
        Axis::XGalvo,
        Axis::ZGalvo,
        Axis::ZPzt,
        Axis::SPiezo,
        Axis::IsmOffset,
        Axis::XStageOffset,
        Axis::XzStageOffset,
    ];

    /// Row label in the settings dump.
    pub fn label(&self) -> &'static str {
        match self {
            Self::XGalvo => "X Galvo",
            Self::ZGalvo => "Z Galvo",
            Self::ZPzt => "Z PZT",
            Self::SPiezo => "S Piezo",
            Self::IsmOffset => "ISM Offset",
            Self::XStageOffset => "X Stage Offset",
            Self::XzStageOffset => "XZ stage Offset",
        }
    }

    /// Key in the parsed document.
    pub fn key(&self) -> &'static str {
        match self {
            Self::XGalvo => "x-galvo",
            Self::ZGalvo => "z-galvo",
            Self::ZPzt => "z-pzt",
            Self::SPiezo => "s-piezo",
            Self::IsmOffset => "ism-offset",
            Self::XStageOffset => "x-stage-offset",
            Self::XzStageOffset => "xz-stage-offset",
        }
    }
}

/// One axis table, a row per channel.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AxisTable {
    pub offset: Vec<f64>,
    pub interval: Vec<f64>,
    pub no_pixels_for_excitation: Vec<i64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GeneralSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acq_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pc: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NotesSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub microscopist: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collaborator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Position of this acquisition in a 3D tiling, as X/Y/Z/T indices.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileLocation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<i64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct WaveformSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waveform_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cycle_lasers: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z_motion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x_galvo: Option<AxisTable>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z_galvo: Option<AxisTable>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z_pzt: Option<AxisTable>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s_piezo: Option<AxisTable>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ism_offset: Option<AxisTable>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x_stage_offset: Option<AxisTable>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xz_stage_offset: Option<AxisTable>,
    #[serde(default)]
    pub no_of_stacks: Vec<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excitation_filter: Vec<String>,
    /// Laser wavelength per excitation event.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub laser: Vec<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub power: Vec<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exp: Vec<f64>,
    /// Channel slot of each excitation event, aligned with `laser`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ch: Vec<u32>,
}

impl WaveformSection {
    pub fn table(&self, axis: Axis) -> Option<&AxisTable> {
        match axis {
            Axis::XGalvo => self.x_galvo.as_ref(),
            Axis::ZGalvo => self.z_galvo.as_ref(),
            Axis::ZPzt => self.z_pzt.as_ref(),
            Axis::SPiezo => self.s_piezo.as_ref(),
            Axis::IsmOffset => self.ism_offset.as_ref(),
            Axis::XStageOffset => self.x_stage_offset.as_ref(),
            Axis::XzStageOffset => self.xz_stage_offset.as_ref(),
        }
    }

    fn table_slot(&mut self, axis: Axis) -> &mut Option<AxisTable> {
        match axis {
            Axis::XGalvo => &mut self.x_galvo,
            Axis::ZGalvo => &mut self.z_galvo,
            Axis::ZPzt => &mut self.z_pzt,
            Axis::SPiezo => &mut self.s_piezo,
            Axis::IsmOffset => &mut self.ism_offset,
            Axis::XStageOffset => &mut self.x_stage_offset,
            Axis::XzStageOffset => &mut self.xz_stage_offset,
        }
    }
}

/// Structured form of one settings dump.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub general: Option<GeneralSection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<NotesSection>,
    #[serde(rename = "3d-tiling", default, skip_serializing_if = "Option::is_none")]
    pub tiling: Option<TileLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waveform: Option<WaveformSection>,
}

/// Read a settings dump from disk. Bytes are decoded as Latin-1 so files
/// written by older and newer acquisition software both load.
pub fn read_settings(path: &Path) -> Result<SettingsDocument> {
    let bytes = std::fs::read(path)?;
    let text: String = bytes.iter().map(|&b| b as char).collect();
    parse_settings(path, &text)
}

/// Parse the text of a settings dump. `source` is only used in error messages.
pub fn parse_settings(source: &Path, text: &str) -> Result<SettingsDocument> {
    let banner = Regex::new(r"\*{5} \*{5} \*{5} +(.+?) +\*{5} \*{5} \*{5}")?;

    let headers: Vec<_> = banner.captures_iter(text).collect();
    let mut sections = Vec::with_capacity(headers.len());
    for (i, caps) in headers.iter().enumerate() {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let end = headers
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map_or(text.len(), |m| m.start());
        sections.push((name.as_str().trim(), &text[whole.end()..end]));
    }
    let section = |names: &[&str]| {
        sections
            .iter()
            .find(|(name, _)| names.contains(name))
            .map(|(_, body)| *body)
    };

    let mut doc = SettingsDocument::default();

    match section(&["General"]) {
        Some(body) => {
            doc.general = Some(GeneralSection {
                date: field(body, "Date")?,
                acq_mode: field(body, "Acq Mode")?,
                version: field(body, "Version")?,
                pc: field(body, "PC")?,
            })
        }
        None => warn!("cannot find General section in '{}'", source.display()),
    }

    if let Some(body) = section(&["Notes"]) {
        let notes = Regex::new(r"Notes :\t([\s\S]*)")?
            .captures(body)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|s| !s.is_empty());
        doc.notes = Some(NotesSection {
            microscopist: field(body, "Microscopist")?,
            collaborator: field(body, "Collaborator")?,
            sample: field(body, "Sample")?,
            notes,
        });
    }

    match section(&["3D Tile location (X,Y,Z,T indices)", "3D Tiling"]) {
        Some(body) => {
            doc.tiling = Some(TileLocation {
                x: index(source, body, "X")?,
                y: index(source, body, "Y")?,
                z: index(source, body, "Z")?,
                t: index(source, body, "T")?,
            })
        }
        None => warn!("cannot find 3D Tiling section in '{}'", source.display()),
    }

    match section(&["Waveform"]) {
        Some(body) => doc.waveform = Some(parse_waveform(source, body)?),
        None => warn!("cannot find Waveform section in '{}'", source.display()),
    }

    Ok(doc)
}

fn field(body: &str, label: &str) -> Result<Option<String>> {
    let re = Regex::new(&format!(r"(?m)^{} :\t(.*)$", regex::escape(label)))?;
    Ok(re
        .captures(body)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string()))
}

fn index(source: &Path, body: &str, label: &str) -> Result<Option<i64>> {
    match field(body, label)? {
        None => Ok(None),
        Some(v) if v.is_empty() => Ok(None),
        Some(v) => v.parse().map(Some).map_err(|_| {
            LightsheetError::metadata(source, format!("tile index {label} '{v}' is not an integer"))
        }),
    }
}

fn rows<'a>(body: &'a str, label: &str) -> Result<Vec<&'a str>> {
    let re = Regex::new(&format!(r"(?m)^{}.*:\t(.*)$", regex::escape(label)))?;
    Ok(re
        .captures_iter(body)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim_end_matches('\r'))
        .collect())
}

fn number<T: std::str::FromStr>(source: &Path, row: &str, parts: &[&str], at: usize) -> Result<T> {
    parts
        .get(at)
        .and_then(|p| p.trim().parse().ok())
        .ok_or_else(|| {
            LightsheetError::metadata(source, format!("malformed waveform row '{row}'"))
        })
}

fn parse_waveform(source: &Path, body: &str) -> Result<WaveformSection> {
    let mut waveform = WaveformSection {
        waveform_type: field(body, "Waveform type")?,
        cycle_lasers: field(body, "Cycle lasers")?,
        z_motion: field(body, "Z motion")?,
        ..Default::default()
    };

    for axis in Axis::ALL {
        let found = rows(body, axis.label())?;
        if found.is_empty() {
            continue;
        }
        let mut table = AxisTable::default();
        for row in found {
            let parts: Vec<&str> = row.split('\t').collect();
            table.offset.push(number(source, row, &parts, 0)?);
            table.interval.push(number(source, row, &parts, 1)?);
            table
                .no_pixels_for_excitation
                .push(number(source, row, &parts, 2)?);
        }
        *waveform.table_slot(axis) = Some(table);
    }

    for row in rows(body, "# of stacks")? {
        if let Ok(n) = row.trim().parse() {
            waveform.no_of_stacks.push(n);
        }
    }

    // Filter, laser, power, exposure, then up to two simultaneous
    // laser/power pairs that read OFF when unused.
    for (slot, row) in rows(body, "Excitation Filter")?.into_iter().enumerate() {
        let parts: Vec<&str> = row.split('\t').collect();
        let exp: f64 = number(source, row, &parts, 3)?;
        waveform
            .excitation_filter
            .push(parts.first().map(|s| s.trim().to_string()).unwrap_or_default());
        waveform.laser.push(number(source, row, &parts, 1)?);
        waveform.power.push(number(source, row, &parts, 2)?);
        waveform.exp.push(exp);
        waveform.ch.push(slot as u32);

        for at in [4, 6] {
            match parts.get(at).map(|s| s.trim()) {
                None | Some("OFF") | Some("") => break,
                Some(_) => {
                    waveform.laser.push(number(source, row, &parts, at)?);
                    waveform.power.push(number(source, row, &parts, at + 1)?);
                    waveform.exp.push(exp);
                    waveform.ch.push(slot as u32);
                }
            }
        }
    }

    Ok(waveform)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "***** ***** *****   General   ***** ***** *****\n\
Date :\t1/12/2023 10:31:02 AM\n\
Acq Mode :\tZ stack\n\
Version :\tv 4.08661\n\
\n\
***** ***** *****   3D Tile location (X,Y,Z,T indices)   ***** ***** *****\n\
X :\t-1\n\
Y :\t2\n\
Z :\t0\n\
T :\t0\n\
\n\
***** ***** *****   Waveform   ***** ***** *****\n\
Waveform type :\tLinear\n\
Cycle lasers :\tper Z\n\
Z motion :\tX stage\n\
X Stage Offset, Interval (um), # of Pixels for Excitation (0) :\t0\t0.4\t101\n\
X Stage Offset, Interval (um), # of Pixels for Excitation (1) :\t0\t0.45\t101\n\
# of stacks (0) :\t1\n\
# of stacks (1) :\t1\n\
Excitation Filter, Laser, Power (%), Exp(ms) (0) :\tN/A\t488\t10\t20\tOFF\t0\tOFF\t0\n\
Excitation Filter, Laser, Power (%), Exp(ms) (1) :\tN/A\t560\t12\t20\t642\t5\tOFF\t0\n";

    #[test]
    fn parses_sections_and_tables() {
        let doc = parse_settings(Path::new("Settings.txt"), SAMPLE).unwrap();
        assert_eq!(
            doc.general.as_ref().unwrap().version.as_deref(),
            Some("v 4.08661")
        );
        assert_eq!(doc.tiling.unwrap().x, Some(-1));

        let waveform = doc.waveform.unwrap();
        assert_eq!(waveform.z_motion.as_deref(), Some("X stage"));
        assert_eq!(
            waveform.table(Axis::XStageOffset).unwrap().interval,
            vec![0.4, 0.45]
        );
        assert!(waveform.table(Axis::XzStageOffset).is_none());
        assert_eq!(waveform.no_of_stacks, vec![1, 1]);
    }

    #[test]
    fn simultaneous_lasers_share_a_channel_slot() {
        let doc = parse_settings(Path::new("Settings.txt"), SAMPLE).unwrap();
        let waveform = doc.waveform.unwrap();
        assert_eq!(waveform.laser, vec![488, 560, 642]);
        assert_eq!(waveform.ch, vec![0, 1, 1]);
        assert_eq!(waveform.exp, vec![20.0, 20.0, 20.0]);
    }

    #[test]
    fn serialises_with_kebab_case_keys() {
        let doc = parse_settings(Path::new("Settings.txt"), SAMPLE).unwrap();
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["waveform"]["z-motion"], "X stage");
        assert_eq!(json["waveform"]["x-stage-offset"]["interval"][1], 0.45);
        assert_eq!(json["3d-tiling"]["y"], 2);
    }

    #[test]
    fn malformed_row_is_a_metadata_error() {
        let text = "***** ***** *****   Waveform   ***** ***** *****\n\
Z PZT Offset, Interval (um) :\t0\tabc\t101\n";
        let err = parse_settings(Path::new("S.txt"), text).unwrap_err();
        assert!(matches!(err, LightsheetError::Metadata { .. }));
    }

    #[test]
    fn missing_sections_are_not_fatal() {
        let doc = parse_settings(Path::new("S.txt"), "nothing here").unwrap();
        assert!(doc.waveform.is_none());
    }
}

//! Classification of raw image filenames.
//!
//! Three naming conventions are recognised:
//!
//! - **scan**: `<prefix>_..._CamA_ch0_..._stack0000_...tif`, one position
//! - **tile**: as scan, with an `_Iter_0000` iteration index and a
//!   `_<x>x_<y>y_<z>z_` stage-coordinate tile token
//! - **tagged**: already renamed for BigDataViewer,
//!   `scan_Cam0_ch0_tile0_t0000.tif`

use std::fmt;
use std::path::Path;

use regex::Regex;

use crate::consts::SKEWED_PSF_TAG;
use crate::error::{LightsheetError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Camera {
    A,
    B,
}

impl Camera {
    /// Index used by tagged names: A is 0, B is 1.
    pub fn index(&self) -> u8 {
        match self {
            Self::A => 0,
            Self::B => 1,
        }
    }
}

impl fmt::Display for Camera {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A => write!(f, "A"),
            Self::B => write!(f, "B"),
        }
    }
}

/// Naming convention of an acquisition's image files.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquisitionKind {
    Scan,
    Tile,
    Tagged,
}

impl fmt::Display for AcquisitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scan => write!(f, "scan"),
            Self::Tile => write!(f, "tile"),
            Self::Tagged => write!(f, "bdv"),
        }
    }
}

/// Camera and file-level channel number. Orders by channel first so both
/// cameras imaging the same slot sort next to each other.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelToken {
    pub channel: u32,
    pub camera: Option<Camera>,
}

impl fmt::Display for ChannelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.camera {
            Some(camera) => write!(f, "Cam{}_ch{}", camera, self.channel),
            None => write!(f, "ch{}", self.channel),
        }
    }
}

/// Everything the pipeline needs from one image filename.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileToken {
    pub name: String,
    pub camera: Option<Camera>,
    pub channel: u32,
    /// Stage-coordinate token (`-1x_0y_2z`) or tagged tile number.
    pub tile: Option<String>,
    /// Stack, iteration or time index, zero padding preserved.
    pub index: String,
}

impl FileToken {
    pub fn channel_token(&self) -> ChannelToken {
        ChannelToken {
            channel: self.channel,
            camera: self.camera,
        }
    }
}

/// Compiled patterns for one acquisition. Member files start with the
/// settings-file prefix and carry a TIFF extension.
#[derive(Debug)]
pub struct FilenameClassifier {
    member: Regex,
    channel: Regex,
    stack: Regex,
    iteration: Regex,
    tile: Regex,
    tagged: Regex,
}

impl FilenameClassifier {
    pub fn new(prefix: &str) -> Result<Self> {
        Ok(Self {
            member: Regex::new(&format!(r"^{}.*\.tiff?$", regex::escape(prefix)))?,
            channel: Regex::new(r"_(?:Cam([AB])_)?ch(\d+)(?:_|\.)")?,
            stack: Regex::new(r"_stack(\d+)")?,
            iteration: Regex::new(r"_Iter_(\d+)")?,
            tile: Regex::new(r"_(-?\d+x_-?\d+y_-?\d+z)_")?,
            tagged: Regex::new(r"^scan_Cam([01])_ch(\d+)_tile(\d+)_t(\d+).*\.tiff?$")?,
        })
    }

    /// True when `name` is an image file belonging to this acquisition.
    pub fn is_member(&self, name: &str) -> bool {
        let skewed_psf = Path::new(name)
            .file_stem()
            .and_then(|s| s.to_str())
            .is_some_and(|stem| stem.ends_with(SKEWED_PSF_TAG));
        !skewed_psf && (self.member.is_match(name) || self.tagged.is_match(name))
    }

    /// Tagged names win, then any iteration marker makes it a tile
    /// acquisition, otherwise a plain scan.
    pub fn detect_kind<S: AsRef<str>>(&self, names: &[S]) -> AcquisitionKind {
        let names = names.iter().map(AsRef::as_ref);
        let mut kind = AcquisitionKind::Scan;
        for name in names.filter(|n| self.is_member(n)) {
            if self.tagged.is_match(name) {
                return AcquisitionKind::Tagged;
            }
            if self.iteration.is_match(name) {
                kind = AcquisitionKind::Tile;
            }
        }
        kind
    }

    /// Classify one member file. Returns `None` for files that are not part
    /// of the acquisition.
    pub fn classify(&self, name: &str, kind: AcquisitionKind) -> Result<Option<FileToken>> {
        if !self.is_member(name) {
            return Ok(None);
        }
        if kind == AcquisitionKind::Tagged {
            return self.classify_tagged(name).map(Some);
        }

        let caps = self
            .channel
            .captures(name)
            .ok_or_else(|| LightsheetError::filename(name, "no channel marker (_ch<n>)"))?;
        let camera = caps.get(1).map(|m| match m.as_str() {
            "A" => Camera::A,
            _ => Camera::B,
        });
        let channel = parse_number(name, caps.get(2).map(|m| m.as_str()))?;

        let index_re = match kind {
            AcquisitionKind::Tile => &self.iteration,
            _ => &self.stack,
        };
        let index = index_re
            .captures(name)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| {
                let marker = match kind {
                    AcquisitionKind::Tile => "_Iter_<n>",
                    _ => "_stack<n>",
                };
                LightsheetError::filename(name, format!("no index marker ({marker})"))
            })?;
        let tile = self
            .tile
            .captures(name)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string());

        Ok(Some(FileToken {
            name: name.to_string(),
            camera,
            channel,
            tile,
            index,
        }))
    }

    fn classify_tagged(&self, name: &str) -> Result<FileToken> {
        let caps = self
            .tagged
            .captures(name)
            .ok_or_else(|| LightsheetError::filename(name, "not a tagged scan name"))?;
        let camera = match caps.get(1).map(|m| m.as_str()) {
            Some("0") => Camera::A,
            _ => Camera::B,
        };
        Ok(FileToken {
            name: name.to_string(),
            camera: Some(camera),
            channel: parse_number(name, caps.get(2).map(|m| m.as_str()))?,
            tile: caps.get(3).map(|m| m.as_str().to_string()),
            index: caps.get(4).map_or_else(String::new, |m| m.as_str().to_string()),
        })
    }
}

fn parse_number(name: &str, text: Option<&str>) -> Result<u32> {
    text.and_then(|t| t.parse().ok())
        .ok_or_else(|| LightsheetError::filename(name, "channel number out of range"))
}

/// Insert `suffix` between the stem and the extension. A name whose stem
/// already ends with the suffix is returned unchanged.
pub fn tag_filename(name: &str, suffix: &str) -> String {
    let path = Path::new(name);
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or(name);
    if stem.ends_with(suffix) {
        return name.to_string();
    }
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{stem}{suffix}.{ext}"),
        None => format!("{stem}{suffix}"),
    }
}

/// BigDataViewer-compatible basename for a classified file.
pub fn bdv_name(token: &FileToken, output_channel: u32, tile: usize) -> String {
    let camera = token.camera.map_or(0, |c| c.index());
    format!(
        "scan_Cam{camera}_ch{output_channel}_tile{tile}_t{}.tif",
        token.index
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCAN: &str = "scan_CamB_ch0_CAM1_stack0003_560nm_0012345msec_0001234567msecAbs_000x_000y_000z_0000t.tif";
    const TILE: &str =
        "tile_Iter_0002_CamA_ch1_CAM1_stack0000_488nm_0000000msec_0001234567msecAbs_-01x_003y_000z_0000t.tif";

    fn classifier(prefix: &str) -> FilenameClassifier {
        FilenameClassifier::new(prefix).unwrap()
    }

    #[test]
    fn scan_tokens_are_extracted() {
        let token = classifier("scan")
            .classify(SCAN, AcquisitionKind::Scan)
            .unwrap()
            .unwrap();
        assert_eq!(token.camera, Some(Camera::B));
        assert_eq!(token.channel, 0);
        assert_eq!(token.index, "0003");
        assert_eq!(token.channel_token().to_string(), "CamB_ch0");
    }

    #[test]
    fn tile_tokens_use_iteration_and_stage_coordinates() {
        let c = classifier("tile");
        assert_eq!(c.detect_kind(&[TILE]), AcquisitionKind::Tile);
        let token = c.classify(TILE, AcquisitionKind::Tile).unwrap().unwrap();
        assert_eq!(token.index, "0002");
        assert_eq!(token.tile.as_deref(), Some("-01x_003y_000z"));
    }

    #[test]
    fn classification_is_deterministic() {
        let c = classifier("scan");
        let first = c.classify(SCAN, AcquisitionKind::Scan).unwrap();
        let second = c.classify(SCAN, AcquisitionKind::Scan).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn missing_camera_means_single_camera() {
        let token = classifier("scan")
            .classify("scan_ch2_stack0001.tif", AcquisitionKind::Scan)
            .unwrap()
            .unwrap();
        assert_eq!(token.camera, None);
        assert_eq!(token.channel, 2);
    }

    #[test]
    fn missing_markers_are_errors() {
        let c = classifier("scan");
        let err = c
            .classify("scan_CamA_stack0001.tif", AcquisitionKind::Scan)
            .unwrap_err();
        assert!(matches!(err, LightsheetError::Filename { .. }));
        assert!(c
            .classify("scan_CamA_ch0_0001.tif", AcquisitionKind::Scan)
            .is_err());
    }

    #[test]
    fn foreign_files_are_skipped() {
        let c = classifier("scan");
        assert_eq!(c.classify("other_CamA_ch0_stack0.tif", AcquisitionKind::Scan).unwrap(), None);
        assert_eq!(c.classify("scan_Settings.txt", AcquisitionKind::Scan).unwrap(), None);
        assert_eq!(c.classify("scan_488_PSF_skewed.tif", AcquisitionKind::Scan).unwrap(), None);
    }

    #[test]
    fn tagged_names_are_detected() {
        let c = classifier("ignored");
        let names = ["scan_Cam1_ch2_tile3_t0004.tif"];
        assert_eq!(c.detect_kind(&names), AcquisitionKind::Tagged);
        let token = c.classify(names[0], AcquisitionKind::Tagged).unwrap().unwrap();
        assert_eq!(token.camera, Some(Camera::B));
        assert_eq!(token.channel, 2);
        assert_eq!(token.tile.as_deref(), Some("3"));
        assert_eq!(token.index, "0004");
    }

    #[test]
    fn tagging_is_idempotent() {
        let once = tag_filename("scan_ch0.tif", "_deskew");
        assert_eq!(once, "scan_ch0_deskew.tif");
        assert_eq!(tag_filename(&once, "_deskew"), once);
        assert_eq!(tag_filename(&once, "_deskew_mip"), "scan_ch0_deskew_deskew_mip.tif");
    }

    #[test]
    fn bdv_names_carry_output_channel() {
        let token = classifier("scan")
            .classify(SCAN, AcquisitionKind::Scan)
            .unwrap()
            .unwrap();
        assert_eq!(bdv_name(&token, 2, 0), "scan_Cam1_ch2_tile0_t0003.tif");
    }
}

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use super::paths::{FlatfieldPaths, PsfPaths, RawFlatfieldPaths, RawPsfPaths};
use super::scheduler::SchedulerConfig;
use super::stage::{RawOptions, StageConfig, StageKind};
use crate::consts::DEFAULT_XY_RES;
use crate::error::{LightsheetError, Result};

/// The `paths` section of the configuration document.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RawPaths {
    pub root: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub psf: Option<RawPsfPaths>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flatfield: Option<RawFlatfieldPaths>,
}

/// The `decon-first` section: both halves are mandatory when present.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RawDeconFirst {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deskew: Option<RawOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decon: Option<RawOptions>,
}

/// Configuration document exactly as deserialised, before validation.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RawConfig {
    pub paths: RawPaths,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bsub: Option<RawOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crop: Option<RawOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flatfield: Option<RawOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deskew: Option<RawOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decon: Option<RawOptions>,
    #[serde(
        rename = "decon-first",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub decon_first: Option<RawDeconFirst>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mip: Option<RawOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bdv: Option<RawOptions>,
    #[serde(flatten)]
    pub unknown: Map<String, Value>,
}

fn object(value: Value) -> RawOptions {
    match value {
        Value::Object(map) => map,
        _ => RawOptions::new(),
    }
}

impl RawConfig {
    /// A complete example document, printed by `lightsheet config`.
    pub fn example() -> Self {
        Self {
            paths: RawPaths {
                root: PathBuf::from("/data/lightsheet"),
                psf: Some(RawPsfPaths {
                    dir: Some("psf".into()),
                    laser: Some(
                        [("488", "488_PSF.tif"), ("560", "560_PSF.tif")]
                            .into_iter()
                            .map(|(k, v)| (k.to_string(), v.to_string()))
                            .collect(),
                    ),
                    resampled: None,
                }),
                flatfield: None,
            },
            bsub: Some(object(json!({"n": 4, "W": 480}))),
            crop: None,
            flatfield: None,
            deskew: Some(object(json!({
                "angle": 147.55,
                "xy-res": 0.108,
                "fill": 0.0,
                "bit-depth": 16
            }))),
            decon: Some(object(json!({
                "xy-res": 0.108,
                "n": 10,
                "bit-depth": 16,
                "subtract": 100.0
            }))),
            decon_first: None,
            mip: Some(object(json!({"x": false, "y": false, "z": true}))),
            bdv: None,
            unknown: Map::new(),
        }
    }
}

/// Both halves of the deconvolve-then-deskew branch.
#[derive(Clone, Debug, PartialEq)]
pub struct DeconFirstConfig {
    pub deskew: StageConfig,
    pub decon: StageConfig,
}

/// BigDataViewer output naming.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BdvConfig {
    pub save: bool,
    pub kind: Option<String>,
}

/// Validated pipeline configuration. Built once, read-only afterwards.
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineConfig {
    pub root: PathBuf,
    /// Pixel size used by projections and flatfield correction.
    pub xy_res: f64,
    pub scheduler: SchedulerConfig,
    pub psf: Option<PsfPaths>,
    pub flatfield_paths: Option<FlatfieldPaths>,
    pub crop: Option<StageConfig>,
    pub flatfield: Option<StageConfig>,
    pub deskew: Option<StageConfig>,
    pub decon: Option<StageConfig>,
    pub decon_first: Option<DeconFirstConfig>,
    pub projection: Option<StageConfig>,
    pub bdv: BdvConfig,
}

impl PipelineConfig {
    /// Read, validate and check a configuration file. JSON by default, TOML
    /// when the extension says so.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let raw: RawConfig = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => toml::from_str(&contents)?,
            Some("json") => serde_json::from_str(&contents)?,
            _ => {
                warn!(
                    "'{}' does not appear to be a JSON configuration file",
                    path.display()
                );
                serde_json::from_str(&contents)?
            }
        };
        let config = Self::from_raw(&raw)?;
        config.check_paths()?;
        Ok(config)
    }

    /// Validate the document structure. Only the working directory is read,
    /// to make a relative root absolute.
    pub fn from_raw(raw: &RawConfig) -> Result<Self> {
        for key in raw.unknown.keys() {
            warn!("configuration section '{key}' is not supported and will be ignored");
        }

        if raw.paths.root.as_os_str().is_empty() {
            return Err(LightsheetError::Config("paths.root is required".into()));
        }
        // Ledger keys and calibration dirs hang off the root, so pin it to the
        // working directory now.
        let root = std::path::absolute(&raw.paths.root)?;

        let scheduler = SchedulerConfig::from_raw(raw.bsub.as_ref())?;

        // The crop pixel size wins over the flatfield one when both are set.
        let (crop, crop_res) = match &raw.crop {
            Some(options) => {
                let (stage, res) = StageConfig::crop(options)?;
                (Some(stage), res)
            }
            None => (None, None),
        };
        let (flatfield, flatfield_res) = match &raw.flatfield {
            Some(options) => {
                let (stage, res) = StageConfig::flatfield(options)?;
                (Some(stage), res)
            }
            None => (None, None),
        };
        let xy_res = crop_res.or(flatfield_res);

        let flatfield_paths = match (&flatfield, &raw.paths.flatfield) {
            (Some(_), Some(paths)) => Some(FlatfieldPaths::from_raw(&root, paths)?),
            (Some(_), None) => {
                return Err(LightsheetError::Config(
                    "flatfield enabled, but no flatfield file parameters found in paths".into(),
                ))
            }
            (None, _) => None,
        };

        let decon_first = match &raw.decon_first {
            Some(section) => {
                let deskew = section.deskew.as_ref().ok_or_else(|| {
                    LightsheetError::Config(
                        "decon-first requires deskewing parameters ('decon-first.deskew')".into(),
                    )
                })?;
                let decon = section.decon.as_ref().ok_or_else(|| {
                    LightsheetError::Config(
                        "decon-first requires deconvolution parameters ('decon-first.decon')"
                            .into(),
                    )
                })?;
                Some(DeconFirstConfig {
                    deskew: StageConfig::decon_first_deskew(deskew)?,
                    decon: StageConfig::decon_first_decon(decon)?,
                })
            }
            None => None,
        };

        let deskew = raw.deskew.as_ref().map(StageConfig::deskew).transpose()?;
        let decon = raw.decon.as_ref().map(StageConfig::decon).transpose()?;
        let projection = raw.mip.as_ref().map(StageConfig::projection).transpose()?;

        let psf = match (&raw.paths.psf, decon.is_some(), decon_first.is_some()) {
            (Some(paths), need_laser, need_resampled) => Some(PsfPaths::from_raw(
                &root,
                paths,
                need_laser,
                need_resampled,
            )?),
            (None, false, false) => None,
            (None, _, _) => {
                return Err(LightsheetError::Config(
                    "deconvolution enabled, but no psf parameters found in paths".into(),
                ))
            }
        };

        let bdv = match &raw.bdv {
            Some(options) => parse_bdv(options)?,
            None => BdvConfig::default(),
        };

        let config = Self {
            root,
            xy_res: xy_res.unwrap_or(DEFAULT_XY_RES),
            scheduler,
            psf,
            flatfield_paths,
            crop,
            flatfield,
            deskew,
            decon,
            decon_first,
            projection,
            bdv,
        };
        debug!(stages = ?config.enabled_stages(), "configuration validated");
        Ok(config)
    }

    /// Filesystem checks: the data root and every referenced calibration file.
    pub fn check_paths(&self) -> Result<()> {
        if !self.root.is_dir() {
            return Err(LightsheetError::Config(format!(
                "root path '{}' does not exist",
                self.root.display()
            )));
        }
        if let Some(paths) = &self.flatfield_paths {
            paths.check_files()?;
        }
        if let Some(paths) = &self.psf {
            paths.check_files()?;
        }
        Ok(())
    }

    /// Enabled stages in execution precedence.
    pub fn enabled_stages(&self) -> Vec<StageKind> {
        let mut stages = Vec::new();
        if self.crop.is_some() {
            stages.push(StageKind::Crop);
        }
        if self.flatfield.is_some() {
            stages.push(StageKind::Flatfield);
        }
        if self.decon_first.is_some() {
            stages.push(StageKind::DeconFirst);
        }
        if self.deskew.is_some() {
            stages.push(StageKind::Deskew);
        }
        if self.decon.is_some() {
            stages.push(StageKind::Decon);
        }
        if self.projection.is_some() {
            stages.push(StageKind::Projection);
        }
        stages
    }

    /// Path of the processed ledger inside the data root.
    pub fn ledger_path(&self) -> PathBuf {
        self.root.join(crate::consts::LEDGER_FILENAME)
    }
}

fn parse_bdv(options: &RawOptions) -> Result<BdvConfig> {
    let mut bdv = BdvConfig::default();
    for (key, value) in options {
        match key.as_str() {
            "bdv_save" => {
                bdv.save = value.as_bool().ok_or_else(|| {
                    LightsheetError::Config(format!("bdv_save flag '{value}' is not true or false"))
                })?;
            }
            "type" => bdv.kind = value.as_str().map(str::to_string),
            other => warn!("bdv option '{other}' is not supported and will be ignored"),
        }
    }
    Ok(bdv)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(value: Value) -> RawConfig {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn minimal_document_has_no_stages() {
        let cfg = PipelineConfig::from_raw(&raw(json!({"paths": {"root": "/data"}}))).unwrap();
        assert!(cfg.enabled_stages().is_empty());
        assert_eq!(cfg.xy_res, DEFAULT_XY_RES);
    }

    #[test]
    fn relative_root_is_made_absolute() {
        let cfg = PipelineConfig::from_raw(&raw(json!({
            "paths": {"root": "data/run1", "psf": {"dir": "psf", "laser": {"488": "488_PSF.tif"}}},
            "decon": {}
        })))
        .unwrap();
        assert!(cfg.root.is_absolute());
        assert!(cfg.root.ends_with("data/run1"));
        assert!(cfg.ledger_path().is_absolute());
        assert!(cfg.psf.unwrap().dir.starts_with(&cfg.root));
    }

    #[test]
    fn decon_without_psf_paths_is_fatal() {
        let err = PipelineConfig::from_raw(&raw(json!({
            "paths": {"root": "/data"},
            "decon": {"n": 10}
        })))
        .unwrap_err();
        assert!(err.is_fatal_for_run());
    }

    #[test]
    fn decon_first_requires_both_halves() {
        let err = PipelineConfig::from_raw(&raw(json!({
            "paths": {"root": "/data", "psf": {"resampled": {"488": "r.tif"}}},
            "decon-first": {"deskew": {}}
        })))
        .unwrap_err();
        assert!(err.to_string().contains("decon-first.decon"), "got: {err}");
    }

    #[test]
    fn crop_pixel_size_becomes_global() {
        let cfg = PipelineConfig::from_raw(&raw(json!({
            "paths": {"root": "/data"},
            "crop": {"xy-res": 0.104}
        })))
        .unwrap();
        assert_eq!(cfg.xy_res, 0.104);
    }

    #[test]
    fn bdv_flag_must_be_boolean() {
        assert!(PipelineConfig::from_raw(&raw(json!({
            "paths": {"root": "/data"},
            "bdv": {"bdv_save": "yes"}
        })))
        .is_err());
    }

    #[test]
    fn example_round_trips_through_validation() {
        let example = RawConfig::example();
        let text = serde_json::to_string(&example).unwrap();
        let parsed: RawConfig = serde_json::from_str(&text).unwrap();
        let cfg = PipelineConfig::from_raw(&parsed).unwrap();
        assert_eq!(
            cfg.enabled_stages(),
            vec![StageKind::Deskew, StageKind::Decon, StageKind::Projection]
        );
    }
}

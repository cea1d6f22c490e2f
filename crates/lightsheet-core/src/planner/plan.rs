use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::psf::PsfCatalog;
use super::stage::{ProjectionSource, Stage};
use crate::channels::{resolve_channels, ChannelBinding, ChannelMap};
use crate::config::{PipelineConfig, StageConfig};
use crate::consts::{DEFAULT_DESKEW_ANGLE, DEFAULT_XY_RES, SKEWED_PSF_TAG};
use crate::error::{LightsheetError, Result};
use crate::filename::{bdv_name, tag_filename, AcquisitionKind, FileToken};
use crate::geometry::{physical_step, preskew_angle};
use crate::metadata::InstrumentMetadata;

/// A per-call argument appended after the static stage flags.
#[derive(Clone, Debug, PartialEq)]
pub enum CallArg {
    Switch(&'static str),
    Value(&'static str, String),
}

impl CallArg {
    fn value(flag: &'static str, v: impl ToString) -> Self {
        Self::Value(flag, v.to_string())
    }
}

/// One external program run: static prefix, dynamic arguments, then
/// `-o <output> <input>`.
#[derive(Clone, Debug, PartialEq)]
pub struct Invocation {
    /// Executable followed by its configured flags.
    pub program: String,
    pub args: Vec<CallArg>,
    pub output: PathBuf,
    pub input: PathBuf,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StageCall {
    pub stage: Stage,
    pub invocation: Invocation,
}

/// The chain of calls for one raw image file.
#[derive(Clone, Debug, PartialEq)]
pub struct FilePlan {
    pub token: FileToken,
    pub binding: ChannelBinding,
    /// Basename every stage output is derived from.
    pub output_name: String,
    pub calls: Vec<StageCall>,
}

/// Plane spacing of one channel slot in each frame the stages work in.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SlotSteps {
    /// Interval recorded by the instrument.
    pub raw: f64,
    /// Spacing of data that is not deskewed.
    pub native: f64,
    pub deskew: Option<f64>,
    pub decon_first: Option<f64>,
}

/// A resampled PSF that must be skewed into the acquisition frame before
/// decon-first can run.
#[derive(Clone, Debug, PartialEq)]
pub struct PsfPreskew {
    pub laser: u32,
    pub invocation: Invocation,
}

/// Everything decided for one acquisition directory.
#[derive(Clone, Debug, PartialEq)]
pub struct Plan {
    pub acquisition: PathBuf,
    pub kind: AcquisitionKind,
    pub stages: Vec<Stage>,
    pub channels: ChannelMap,
    /// Raw scan intervals, one per channel slot.
    pub scan_steps: Vec<f64>,
    pub steps: BTreeMap<u32, SlotSteps>,
    pub preskew: Vec<PsfPreskew>,
    pub files: Vec<FilePlan>,
}

impl Plan {
    /// Every stage output directory, in stage order.
    pub fn output_dirs(&self) -> Vec<PathBuf> {
        let mut seen = BTreeSet::new();
        self.stages
            .iter()
            .map(|s| self.acquisition.join(s.dir()))
            .filter(|d| seen.insert(d.clone()))
            .collect()
    }
}

/// Turns configuration plus one acquisition's metadata and files into a [`Plan`].
pub struct Planner<'a> {
    config: &'a PipelineConfig,
    psf: Option<&'a PsfCatalog>,
}

impl<'a> Planner<'a> {
    pub fn new(config: &'a PipelineConfig, psf: Option<&'a PsfCatalog>) -> Self {
        Self { config, psf }
    }

    /// Enabled steps in chain order. Projections follow the stage they
    /// project; without a deskew-class stage a single projection of the
    /// pre-processed data is made instead.
    pub fn stages(&self) -> Vec<Stage> {
        let cfg = self.config;
        let mip = cfg.projection.is_some();
        let mut stages = Vec::new();

        if cfg.crop.is_some() {
            stages.push(Stage::Crop);
        }
        if cfg.flatfield.is_some() {
            stages.push(Stage::Flatfield);
        }
        if mip && cfg.deskew.is_none() && cfg.decon_first.is_none() {
            let source = if cfg.crop.is_some() {
                ProjectionSource::Crop
            } else if cfg.flatfield.is_some() {
                ProjectionSource::Flatfield
            } else {
                ProjectionSource::Original
            };
            stages.push(Stage::Projection(source));
        }
        if cfg.decon_first.is_some() {
            stages.push(Stage::DeconBeforeDeskew);
            stages.push(Stage::DeskewAfterDecon);
            if mip {
                stages.push(Stage::Projection(ProjectionSource::DeskewAfterDecon));
            }
        }
        if cfg.deskew.is_some() {
            stages.push(Stage::Deskew);
            if mip {
                stages.push(Stage::Projection(ProjectionSource::Deskew));
            }
        }
        if cfg.decon.is_some() {
            stages.push(Stage::Decon);
            if mip {
                stages.push(Stage::Projection(ProjectionSource::Decon));
            }
        }
        stages
    }

    pub fn plan(
        &self,
        acquisition: &Path,
        metadata: &InstrumentMetadata,
        kind: AcquisitionKind,
        files: &[FileToken],
    ) -> Result<Plan> {
        let cfg = self.config;
        let stages = self.stages();
        let channels = resolve_channels(kind, files, metadata)?;

        let deskew_class = cfg.deskew.is_some() || cfg.decon_first.is_some();
        if deskew_class && !metadata.motion().is_skewed() {
            return Err(metadata.error(format!(
                "deskew requires a stage or piezo scanned acquisition, found '{}'",
                metadata.motion()
            )));
        }
        if !deskew_class && metadata.motion().is_skewed() {
            warn!(
                "deskew is not enabled, but '{}' was stage scanned; using the default angle of {} for step sizes",
                acquisition.display(),
                DEFAULT_DESKEW_ANGLE
            );
        }

        let (scan_steps, steps) = if stages.is_empty() {
            (Vec::new(), BTreeMap::new())
        } else {
            let scan_steps = metadata.scan_steps()?.to_vec();
            let mut steps = BTreeMap::new();
            for binding in channels.bindings() {
                if !steps.contains_key(&binding.slot) {
                    steps.insert(binding.slot, self.slot_steps(metadata, binding.slot)?);
                }
            }
            (scan_steps, steps)
        };

        let preskew = match &cfg.decon_first {
            Some(_) => self.preskew(acquisition, metadata, &channels, &scan_steps)?,
            None => Vec::new(),
        };

        let mut sorted: Vec<&FileToken> = files.iter().collect();
        sorted.sort_by(|a, b| a.name.cmp(&b.name));

        let mut file_plans = Vec::with_capacity(sorted.len());
        for token in sorted {
            let binding = *channels.binding(&token.channel_token()).ok_or_else(|| {
                LightsheetError::filename(&token.name, "channel token was not resolved")
            })?;
            let output_name = if cfg.bdv.save && kind != AcquisitionKind::Tagged {
                let tile = token
                    .tile
                    .as_deref()
                    .and_then(|t| channels.tile_index(t))
                    .unwrap_or(0);
                bdv_name(token, binding.output_channel, tile)
            } else {
                token.name.clone()
            };
            let slot_steps = steps.get(&binding.slot).copied();
            let calls = match slot_steps {
                Some(s) => self.file_calls(acquisition, metadata, token, &binding, &output_name, &stages, s)?,
                None => Vec::new(),
            };
            file_plans.push(FilePlan {
                token: token.clone(),
                binding,
                output_name,
                calls,
            });
        }

        debug!(
            acquisition = %acquisition.display(),
            files = file_plans.len(),
            stages = stages.len(),
            "planned acquisition"
        );

        Ok(Plan {
            acquisition: acquisition.to_path_buf(),
            kind,
            stages,
            channels,
            scan_steps,
            steps,
            preskew,
            files: file_plans,
        })
    }

    fn slot_steps(&self, metadata: &InstrumentMetadata, slot: u32) -> Result<SlotSteps> {
        let raw = metadata.scan_step(slot)?;
        let native = if metadata.motion().is_skewed() {
            physical_step(raw, DEFAULT_DESKEW_ANGLE)
        } else {
            raw
        };
        let angle = |stage: &StageConfig| stage.float("angle").unwrap_or(DEFAULT_DESKEW_ANGLE);
        Ok(SlotSteps {
            raw,
            native,
            deskew: self
                .config
                .deskew
                .as_ref()
                .map(|d| physical_step(raw, angle(d))),
            decon_first: self
                .config
                .decon_first
                .as_ref()
                .map(|d| physical_step(raw, angle(&d.deskew))),
        })
    }

    fn preskew(
        &self,
        acquisition: &Path,
        metadata: &InstrumentMetadata,
        channels: &ChannelMap,
        scan_steps: &[f64],
    ) -> Result<Vec<PsfPreskew>> {
        let Some(df) = &self.config.decon_first else {
            return Ok(Vec::new());
        };
        let step = match scan_steps.first() {
            Some(&first) if scan_steps.iter().all(|&s| s == first) => first,
            Some(_) => {
                return Err(metadata.error(
                    "different scan steps per channel; the PSF cannot be skewed for decon-first",
                ))
            }
            None => return Ok(Vec::new()),
        };
        let deskew = &df.deskew;
        let angle = deskew.float("angle").unwrap_or(DEFAULT_DESKEW_ANGLE);
        let xy_res = deskew.float("xy-res").unwrap_or(DEFAULT_XY_RES);

        let mut jobs = Vec::new();
        for laser in channels.lasers() {
            let source = self.resampled_psf(metadata, laser)?;
            let mut args = vec![
                CallArg::value("-a", preskew_angle(angle)),
                CallArg::value("-x", xy_res),
            ];
            if let Some(fill) = deskew.option("fill") {
                args.push(CallArg::value("-f", fill));
            }
            if let Some(bits) = deskew.option("bit-depth") {
                args.push(CallArg::value("-b", bits));
            }
            args.push(CallArg::Switch("-w"));
            args.push(CallArg::value("-s", step));
            jobs.push(PsfPreskew {
                laser,
                invocation: Invocation {
                    program: shell_words::quote(deskew.executable()).into_owned(),
                    args,
                    output: skewed_psf_path(acquisition, &source),
                    input: source,
                },
            });
        }
        Ok(jobs)
    }

    fn resampled_psf(&self, metadata: &InstrumentMetadata, laser: u32) -> Result<PathBuf> {
        self.psf
            .and_then(|c| c.resampled(laser))
            .map(|e| e.path.clone())
            .ok_or_else(|| metadata.error(format!("no resampled psf configured for laser {laser}")))
    }

    #[allow(clippy::too_many_arguments)]
    fn file_calls(
        &self,
        acquisition: &Path,
        metadata: &InstrumentMetadata,
        token: &FileToken,
        binding: &ChannelBinding,
        output_name: &str,
        stages: &[Stage],
        steps: SlotSteps,
    ) -> Result<Vec<StageCall>> {
        let cfg = self.config;
        let raw_input = acquisition.join(&token.name);
        let mut produced: Vec<(Stage, PathBuf)> = Vec::new();
        let output_of = |produced: &[(Stage, PathBuf)], stage: Stage| {
            produced
                .iter()
                .find(|(s, _)| *s == stage)
                .map(|(_, p)| p.clone())
        };
        // Output of the last pre-processing stage, or the raw file.
        let mut upstream = raw_input.clone();
        let decon_step = steps.deskew.unwrap_or(steps.native);

        let mut calls = Vec::with_capacity(stages.len());
        for &stage in stages {
            let output = acquisition
                .join(stage.dir())
                .join(tag_filename(output_name, &stage.suffix()));

            let (config, input, args) = match stage {
                Stage::Crop => (
                    require(&cfg.crop, stage)?,
                    upstream.clone(),
                    vec![CallArg::Switch("-w"), CallArg::value("-s", steps.raw)],
                ),
                Stage::Flatfield => {
                    let paths = cfg.flatfield_paths.as_ref().ok_or_else(|| {
                        LightsheetError::Config("flatfield paths are not configured".into())
                    })?;
                    let norm = paths.laser.get(&binding.laser).ok_or_else(|| {
                        metadata.error(format!(
                            "no normalized flatfield image configured for laser {}",
                            binding.laser
                        ))
                    })?;
                    (
                        require(&cfg.flatfield, stage)?,
                        upstream.clone(),
                        vec![
                            CallArg::Switch("-w"),
                            CallArg::value("-d", paths.dark.display()),
                            CallArg::value("-n", norm.display()),
                            CallArg::value("-x", cfg.xy_res),
                            CallArg::value("-q", steps.raw),
                        ],
                    )
                }
                Stage::DeconBeforeDeskew => {
                    let df = require_decon_first(cfg)?;
                    let step = steps.decon_first.unwrap_or(steps.native);
                    let psf = skewed_psf_path(acquisition, &self.resampled_psf(metadata, binding.laser)?);
                    (
                        &df.decon,
                        upstream.clone(),
                        vec![
                            CallArg::Switch("-w"),
                            CallArg::value("-k", psf.display()),
                            CallArg::value("-p", step),
                            CallArg::value("-q", step),
                        ],
                    )
                }
                Stage::DeskewAfterDecon => (
                    &require_decon_first(cfg)?.deskew,
                    output_of(&produced, Stage::DeconBeforeDeskew).unwrap_or_else(|| upstream.clone()),
                    vec![CallArg::Switch("-w"), CallArg::value("-s", steps.raw)],
                ),
                Stage::Deskew => (
                    require(&cfg.deskew, stage)?,
                    upstream.clone(),
                    vec![CallArg::Switch("-w"), CallArg::value("-s", steps.raw)],
                ),
                Stage::Decon => {
                    let psf = self.psf.and_then(|c| c.laser(binding.laser)).ok_or_else(|| {
                        metadata.error(format!("no psf configured for laser {}", binding.laser))
                    })?;
                    (
                        require(&cfg.decon, stage)?,
                        output_of(&produced, Stage::Deskew).unwrap_or_else(|| upstream.clone()),
                        vec![
                            CallArg::Switch("-w"),
                            CallArg::value("-k", psf.path.display()),
                            CallArg::value("-p", psf.z_step),
                            CallArg::value("-q", decon_step),
                        ],
                    )
                }
                Stage::Projection(source) => {
                    let (input, xy_res, step) = match source {
                        ProjectionSource::Original => (raw_input.clone(), cfg.xy_res, steps.native),
                        ProjectionSource::Crop => (
                            output_of(&produced, Stage::Crop).unwrap_or_else(|| upstream.clone()),
                            cfg.xy_res,
                            steps.native,
                        ),
                        ProjectionSource::Flatfield => (
                            output_of(&produced, Stage::Flatfield).unwrap_or_else(|| upstream.clone()),
                            cfg.xy_res,
                            steps.native,
                        ),
                        ProjectionSource::DeskewAfterDecon => (
                            output_of(&produced, Stage::DeskewAfterDecon).unwrap_or_else(|| upstream.clone()),
                            xy_res_of(&require_decon_first(cfg)?.deskew),
                            steps.decon_first.unwrap_or(steps.native),
                        ),
                        ProjectionSource::Deskew => (
                            output_of(&produced, Stage::Deskew).unwrap_or_else(|| upstream.clone()),
                            xy_res_of(require(&cfg.deskew, Stage::Deskew)?),
                            steps.deskew.unwrap_or(steps.native),
                        ),
                        ProjectionSource::Decon => (
                            output_of(&produced, Stage::Decon).unwrap_or_else(|| upstream.clone()),
                            xy_res_of(require(&cfg.decon, Stage::Decon)?),
                            decon_step,
                        ),
                    };
                    (
                        require(&cfg.projection, stage)?,
                        input,
                        vec![CallArg::value("-p", xy_res), CallArg::value("-q", step)],
                    )
                }
            };

            if matches!(stage, Stage::Crop | Stage::Flatfield) {
                upstream = output.clone();
            }
            produced.push((stage, output.clone()));
            calls.push(StageCall {
                stage,
                invocation: Invocation {
                    program: config.command_prefix(),
                    args,
                    output,
                    input,
                },
            });
        }
        Ok(calls)
    }
}

fn require(stage: &Option<StageConfig>, which: Stage) -> Result<&StageConfig> {
    stage
        .as_ref()
        .ok_or_else(|| LightsheetError::Config(format!("{which} is not configured")))
}

fn require_decon_first(cfg: &PipelineConfig) -> Result<&crate::config::DeconFirstConfig> {
    cfg.decon_first
        .as_ref()
        .ok_or_else(|| LightsheetError::Config("decon-first is not configured".into()))
}

fn xy_res_of(stage: &StageConfig) -> f64 {
    stage.float("xy-res").unwrap_or(DEFAULT_XY_RES)
}

/// Where the pre-skewed copy of a resampled PSF is written: inside the
/// acquisition, since the skew depends on that acquisition's scan step.
pub fn skewed_psf_path(acquisition: &Path, resampled: &Path) -> PathBuf {
    let name = resampled
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    acquisition.join(tag_filename(&name, SKEWED_PSF_TAG))
}

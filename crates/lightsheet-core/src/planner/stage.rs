use std::fmt;
use std::path::PathBuf;

use crate::config::StageKind;
use crate::consts::PROJECTION_DIR;

/// Data a maximum-intensity projection is taken from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProjectionSource {
    Original,
    Crop,
    Flatfield,
    DeskewAfterDecon,
    Deskew,
    Decon,
}

impl ProjectionSource {
    fn name(&self) -> &'static str {
        match self {
            Self::Original => "original",
            Self::Crop => "crop",
            Self::Flatfield => "flatfield",
            Self::DeskewAfterDecon => "deskew_after_decon",
            Self::Deskew => "deskew",
            Self::Decon => "decon",
        }
    }
}

/// One concrete step of a per-file chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    Crop,
    Flatfield,
    DeconBeforeDeskew,
    DeskewAfterDecon,
    Deskew,
    Decon,
    Projection(ProjectionSource),
}

impl Stage {
    /// Output directory relative to the acquisition directory.
    pub fn dir(&self) -> PathBuf {
        match self {
            Self::Crop => "crop".into(),
            Self::Flatfield => "flatfield".into(),
            Self::DeconBeforeDeskew => "decon_before_deskew".into(),
            Self::DeskewAfterDecon => "deskew_after_decon".into(),
            Self::Deskew => "deskew".into(),
            Self::Decon => "decon".into(),
            Self::Projection(source) => PathBuf::from(PROJECTION_DIR).join(source.name()),
        }
    }

    /// Tag inserted before the extension of every output file.
    pub fn suffix(&self) -> String {
        match self {
            Self::Crop => "_crop".into(),
            Self::Flatfield => "_flatfield".into(),
            Self::DeconBeforeDeskew => "_decon_before_deskew".into(),
            Self::DeskewAfterDecon => "_deskew_after_decon".into(),
            Self::Deskew => "_deskew".into(),
            Self::Decon => "_decon".into(),
            Self::Projection(ProjectionSource::Original) => "_mip".into(),
            Self::Projection(source) => format!("_{}_mip", source.name()),
        }
    }

    /// Configuration section that enables this step.
    pub fn kind(&self) -> StageKind {
        match self {
            Self::Crop => StageKind::Crop,
            Self::Flatfield => StageKind::Flatfield,
            Self::DeconBeforeDeskew | Self::DeskewAfterDecon => StageKind::DeconFirst,
            Self::Deskew => StageKind::Deskew,
            Self::Decon => StageKind::Decon,
            Self::Projection(_) => StageKind::Projection,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Crop => write!(f, "crop"),
            Self::Flatfield => write!(f, "flatfield"),
            Self::DeconBeforeDeskew => write!(f, "decon before deskew"),
            Self::DeskewAfterDecon => write!(f, "deskew after decon"),
            Self::Deskew => write!(f, "deskew"),
            Self::Decon => write!(f, "decon"),
            Self::Projection(source) => write!(f, "mip of {}", source.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn projection_outputs_nest_under_mip() {
        let stage = Stage::Projection(ProjectionSource::Decon);
        assert_eq!(stage.dir(), PathBuf::from("mip/decon"));
        assert_eq!(stage.suffix(), "_decon_mip");
        assert_eq!(Stage::Projection(ProjectionSource::Original).suffix(), "_mip");
    }

    #[test]
    fn decon_first_steps_share_a_section() {
        assert_eq!(Stage::DeconBeforeDeskew.kind(), StageKind::DeconFirst);
        assert_eq!(Stage::DeskewAfterDecon.dir(), PathBuf::from("deskew_after_decon"));
    }
}

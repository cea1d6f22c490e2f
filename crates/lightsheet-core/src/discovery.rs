use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::consts::{PROJECTION_DIR, SETTINGS_SUFFIX};
use crate::error::Result;

/// Directories written by the pipeline itself; never searched.
const OUTPUT_DIRS: [&str; 7] = [
    "crop",
    "flatfield",
    "deskew",
    "decon",
    "decon_before_deskew",
    "deskew_after_decon",
    PROJECTION_DIR,
];

/// A directory holding one acquisition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Acquisition {
    pub dir: PathBuf,
    /// The settings dump used for this acquisition.
    pub settings: PathBuf,
    /// Filename prefix shared by the acquisition's image files.
    pub prefix: String,
    /// Every file name in the directory, sorted.
    pub files: Vec<String>,
}

/// Sorted file names directly inside `dir`.
pub fn list_files(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

/// Read one acquisition directory. `None` when it holds no settings dump.
pub fn read_acquisition(dir: &Path) -> Result<Option<Acquisition>> {
    let files = list_files(dir)?;
    let settings: Vec<&String> = files.iter().filter(|f| f.ends_with(SETTINGS_SUFFIX)).collect();
    let Some(last) = settings.last().map(|s| s.to_string()) else {
        return Ok(None);
    };
    if settings.len() > 1 {
        warn!(
            "'{}' holds {} settings files, using '{}'",
            dir.display(),
            settings.len(),
            last
        );
    }
    let prefix = last.split('_').next().unwrap_or_default().to_string();
    Ok(Some(Acquisition {
        dir: dir.to_path_buf(),
        settings: dir.join(&last),
        prefix,
        files,
    }))
}

/// Walk `root` for acquisition directories, skipping `excludes` and
/// pipeline output directories. Sorted by path.
pub fn discover(root: &Path, excludes: &BTreeSet<PathBuf>) -> Result<Vec<Acquisition>> {
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            if !e.file_type().is_dir() {
                return false;
            }
            if e.depth() == 0 {
                return true;
            }
            let output = e
                .file_name()
                .to_str()
                .is_some_and(|name| OUTPUT_DIRS.contains(&name));
            !output && !excludes.contains(e.path())
        });

    let mut found = Vec::new();
    for entry in walker {
        let entry = entry?;
        // The root is always descended, but may itself be a recorded acquisition.
        if excludes.contains(entry.path()) {
            continue;
        }
        if let Some(acquisition) = read_acquisition(entry.path())? {
            debug!(dir = %acquisition.dir.display(), "found acquisition");
            found.push(acquisition);
        }
    }
    found.sort_by(|a, b| a.dir.cmp(&b.dir));
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"").unwrap();
    }

    #[test]
    fn finds_nested_acquisitions_and_prunes() {
        let root = tempfile::tempdir().unwrap();
        let r = root.path();
        touch(&r.join("b/scan_Settings.txt"));
        touch(&r.join("a/scan_Settings.txt"));
        touch(&r.join("a/deskew/scan_Settings.txt"));
        touch(&r.join("done/scan_Settings.txt"));
        touch(&r.join("psf/488_PSF_Settings.txt"));
        touch(&r.join("empty/readme.txt"));

        let excludes = BTreeSet::from([r.join("done"), r.join("psf")]);
        let dirs: Vec<PathBuf> = discover(r, &excludes)
            .unwrap()
            .into_iter()
            .map(|a| a.dir)
            .collect();
        assert_eq!(dirs, vec![r.join("a"), r.join("b")]);
    }

    #[test]
    fn root_itself_can_be_an_acquisition() {
        let root = tempfile::tempdir().unwrap();
        touch(&root.path().join("cell_Settings.txt"));
        let found = discover(root.path(), &BTreeSet::new()).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].prefix, "cell");
    }

    #[test]
    fn excluded_root_is_not_reported() {
        let root = tempfile::tempdir().unwrap();
        let r = root.path();
        touch(&r.join("cell_Settings.txt"));
        touch(&r.join("next/cell_Settings.txt"));
        let found = discover(r, &BTreeSet::from([r.to_path_buf()])).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].dir, r.join("next"));
    }

    #[test]
    fn last_settings_file_wins() {
        let root = tempfile::tempdir().unwrap();
        touch(&root.path().join("a_Settings.txt"));
        touch(&root.path().join("b_Settings.txt"));
        let acq = read_acquisition(root.path()).unwrap().unwrap();
        assert_eq!(acq.prefix, "b");
        assert!(acq.settings.ends_with("b_Settings.txt"));
    }
}

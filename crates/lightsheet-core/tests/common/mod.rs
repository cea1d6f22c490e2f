use std::fs;
use std::path::{Path, PathBuf};

use lightsheet_core::config::{PipelineConfig, RawConfig};
use serde_json::Value;
use tempfile::TempDir;

/// One excitation row: primary laser plus an optional simultaneous one.
pub type Excitation = (u32, Option<u32>);

/// Build the text of an instrument settings dump.
///
/// `axis` is the row label of the scan axis table (e.g. `X Stage Offset`),
/// with one row per entry of `intervals`.
pub fn settings_text(motion: &str, axis: &str, intervals: &[f64], excitation: &[Excitation]) -> String {
    let mut text = String::new();
    text.push_str("***** ***** *****   General   ***** ***** *****\n");
    text.push_str("Date :\t1/12/2023 10:31:02 AM\n");
    text.push_str("Acq Mode :\tZ stack\n");
    text.push_str("Version :\tv 4.08661\n\n");
    text.push_str("***** ***** *****   3D Tile location (X,Y,Z,T indices)   ***** ***** *****\n");
    text.push_str("X :\t0\nY :\t0\nZ :\t0\nT :\t0\n\n");
    text.push_str("***** ***** *****   Waveform   ***** ***** *****\n");
    text.push_str("Waveform type :\tLinear\n");
    text.push_str("Cycle lasers :\tper Z\n");
    text.push_str(&format!("Z motion :\t{motion}\n"));
    for (i, interval) in intervals.iter().enumerate() {
        text.push_str(&format!(
            "{axis}, Interval (um), # of Pixels for Excitation ({i}) :\t0\t{interval}\t101\n"
        ));
    }
    for (i, (laser, second)) in excitation.iter().enumerate() {
        let second = match second {
            Some(l) => format!("{l}\t5"),
            None => "OFF\t0".to_string(),
        };
        text.push_str(&format!(
            "Excitation Filter, Laser, Power (%), Exp(ms) ({i}) :\tN/A\t{laser}\t10\t20\t{second}\tOFF\t0\n"
        ));
    }
    text
}

/// Stage-scanned settings, one laser per channel slot.
pub fn stage_scan_settings(intervals: &[f64], lasers: &[u32]) -> String {
    let excitation: Vec<Excitation> = lasers.iter().map(|&l| (l, None)).collect();
    settings_text("X stage", "X Stage Offset", intervals, &excitation)
}

/// Settings of an orthogonal (galvo/piezo) acquisition.
pub fn orthogonal_settings(intervals: &[f64], lasers: &[u32]) -> String {
    let excitation: Vec<Excitation> = lasers.iter().map(|&l| (l, None)).collect();
    settings_text("Z galvo & piezo", "Z PZT", intervals, &excitation)
}

/// A scratch data root.
pub struct Fixture {
    pub dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Create `<root>/<name>` holding `<prefix>_Settings.txt` and empty image files.
    pub fn acquisition(&self, name: &str, prefix: &str, settings: &str, files: &[&str]) -> PathBuf {
        let dir = self.root().join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(format!("{prefix}_Settings.txt")), settings).unwrap();
        for file in files {
            fs::write(dir.join(file), b"").unwrap();
        }
        dir
    }

    /// Write `<root>/psf/<file>` with an orthogonal settings dump next to it.
    pub fn psf(&self, file: &str, z_step: f64, laser: u32) -> PathBuf {
        let dir = self.root().join("psf");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(file);
        fs::write(&path, b"").unwrap();
        let stem = path.file_stem().unwrap().to_string_lossy().into_owned();
        fs::write(
            dir.join(format!("{stem}_Settings.txt")),
            orthogonal_settings(&[z_step], &[laser]),
        )
        .unwrap();
        path
    }

    /// Validate a configuration document, pointing `paths.root` at the fixture.
    pub fn config(&self, mut doc: Value) -> PipelineConfig {
        doc["paths"]["root"] = Value::from(self.root().to_string_lossy().into_owned());
        let raw: RawConfig = serde_json::from_value(doc).unwrap();
        let config = PipelineConfig::from_raw(&raw).unwrap();
        config.check_paths().unwrap();
        config
    }

    pub fn read_ledger(&self) -> Value {
        let text = fs::read_to_string(self.root().join("processed.json")).unwrap();
        serde_json::from_str(&text).unwrap()
    }
}

/// Image name of a single-camera scan.
pub fn scan_file(prefix: &str, channel: u32, stack: u32) -> String {
    format!("{prefix}_ch{channel}_stack{stack:04}_488nm_0000000msec_0000000000msecAbs.tif")
}

/// Image name of a dual-camera scan.
pub fn camera_file(prefix: &str, camera: char, channel: u32, stack: u32) -> String {
    format!("{prefix}_Cam{camera}_ch{channel}_stack{stack:04}_488nm_0000000msec_0000000000msecAbs.tif")
}

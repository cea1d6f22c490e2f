use std::fmt;

use serde_json::{Map, Value};
use tracing::warn;

use crate::consts::{
    DEFAULT_DECON_FIRST_BIT_DEPTH, DEFAULT_DECON_FIRST_FILL, DEFAULT_DESKEW_ANGLE,
    DEFAULT_XY_RES, SUPPORTED_BIT_DEPTHS,
};
use crate::error::{LightsheetError, Result};

/// Raw, untyped options of one stage as they appear in the configuration document.
pub type RawOptions = Map<String, Value>;

/// Optional processing stages the pipeline knows about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StageKind {
    Crop,
    Flatfield,
    Deskew,
    Decon,
    DeconFirst,
    Projection,
}

impl StageKind {
    /// Key of the stage in the configuration document and the ledger.
    pub fn key(&self) -> &'static str {
        match self {
            Self::Crop => "crop",
            Self::Flatfield => "flatfield",
            Self::Deskew => "deskew",
            Self::Decon => "decon",
            Self::DeconFirst => "decon-first",
            Self::Projection => "mip",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Crop => write!(f, "Crop"),
            Self::Flatfield => write!(f, "Flatfield"),
            Self::Deskew => write!(f, "Deskew"),
            Self::Decon => write!(f, "Deconvolution"),
            Self::DeconFirst => write!(f, "Decon-first"),
            Self::Projection => write!(f, "Max projection"),
        }
    }
}

/// Typed value carried by a command-line option.
#[derive(Clone, Debug, PartialEq)]
pub enum OptionValue {
    Float(f64),
    Int(i64),
    Text(String),
    /// Flag without an argument.
    Switch,
}

impl OptionValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    fn to_json(&self) -> Option<Value> {
        match self {
            Self::Float(v) => Some(Value::from(*v)),
            Self::Int(v) => Some(Value::from(*v)),
            Self::Text(v) => Some(Value::from(v.as_str())),
            Self::Switch => None,
        }
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Float(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v}"),
            Self::Switch => Ok(()),
        }
    }
}

/// One configured option: the document key, the flag token passed to the
/// executable, and the typed value.
#[derive(Clone, Debug, PartialEq)]
pub struct StageOption {
    pub key: String,
    pub flag: &'static str,
    pub value: OptionValue,
}

impl StageOption {
    /// Render as ` -f value`, or ` -f` for switches.
    pub fn render(&self) -> String {
        match self.value {
            OptionValue::Switch => format!(" {}", self.flag),
            ref value => format!(" {} {}", self.flag, shell_words::quote(&value.to_string())),
        }
    }
}

/// Validated, immutable configuration of one stage.
#[derive(Clone, Debug, PartialEq)]
pub struct StageConfig {
    kind: StageKind,
    executable: String,
    options: Vec<StageOption>,
}

impl StageConfig {
    pub fn kind(&self) -> StageKind {
        self.kind
    }

    pub fn executable(&self) -> &str {
        &self.executable
    }

    pub fn options(&self) -> &[StageOption] {
        &self.options
    }

    pub fn option(&self, key: &str) -> Option<&OptionValue> {
        self.options.iter().find(|o| o.key == key).map(|o| &o.value)
    }

    pub fn float(&self, key: &str) -> Option<f64> {
        self.option(key).and_then(OptionValue::as_f64)
    }

    pub fn int(&self, key: &str) -> Option<i64> {
        self.option(key).and_then(OptionValue::as_i64)
    }

    /// Executable followed by every static flag, in configuration order.
    pub fn command_prefix(&self) -> String {
        let mut cmd = shell_words::quote(&self.executable).into_owned();
        for option in &self.options {
            cmd.push_str(&option.render());
        }
        cmd
    }

    /// Ledger representation: `{"executable_path": .., "<key>": {"flag": .., "arg": ..}}`.
    pub fn to_record(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert(
            "executable_path".into(),
            Value::from(self.executable.as_str()),
        );
        for option in &self.options {
            let mut entry = Map::new();
            entry.insert("flag".into(), Value::from(option.flag));
            if let Some(arg) = option.value.to_json() {
                entry.insert("arg".into(), arg);
            }
            map.insert(option.key.clone(), Value::Object(entry));
        }
        map
    }

    // -----------------------------------------------------------------------
    // Validating constructors
    // -----------------------------------------------------------------------

    /// Crop stage. Returns the configured pixel size separately: it feeds the
    /// projections but is never forwarded to the crop executable.
    pub fn crop(raw: &RawOptions) -> Result<(Self, Option<f64>)> {
        let mut b = StageBuilder::new(
            "crop",
            raw,
            &[
                "xy-res",
                "bit-depth",
                "executable_path",
                "cropTop",
                "cropBottom",
                "cropLeft",
                "cropRight",
                "cropFront",
                "cropBack",
            ],
        );
        let xy_res = b.read_float("xy-res", "xy resolution")?;

        let mut sides = Vec::with_capacity(6);
        for key in [
            "cropTop",
            "cropBottom",
            "cropLeft",
            "cropRight",
            "cropFront",
            "cropBack",
        ] {
            sides.push(b.read_count(key)?.unwrap_or(0).to_string());
        }
        b.push("crop", "-c", OptionValue::Text(sides.join(",")));
        b.bit_depth()?;
        Ok((b.finish(StageKind::Crop, "crop"), xy_res))
    }

    /// Flatfield stage. The pixel size is returned separately and passed as a
    /// per-call flag by the planner.
    pub fn flatfield(raw: &RawOptions) -> Result<(Self, Option<f64>)> {
        let mut b = StageBuilder::new(
            "flatfield",
            raw,
            &["xy-res", "bit-depth", "executable_path"],
        );
        let xy_res = b.read_float("xy-res", "xy resolution")?;
        b.bit_depth()?;
        Ok((b.finish(StageKind::Flatfield, "flatfield"), xy_res))
    }

    /// Standalone deskew stage.
    pub fn deskew(raw: &RawOptions) -> Result<Self> {
        let mut b = StageBuilder::new("deskew", raw, DESKEW_KEYS);
        b.float_or("angle", "-a", "angle", DEFAULT_DESKEW_ANGLE)?;
        b.float_or("xy-res", "-x", "xy resolution", DEFAULT_XY_RES)?;
        b.float("fill", "-f", "background fill value")?;
        b.bit_depth()?;
        Ok(b.finish(StageKind::Deskew, "deskew"))
    }

    /// Deskew half of the decon-first branch. Fill and bit depth are always
    /// set because the PSF pre-skew job needs them.
    pub fn decon_first_deskew(raw: &RawOptions) -> Result<Self> {
        let mut b = StageBuilder::new("decon-first deskew", raw, DESKEW_KEYS);
        b.float_or("angle", "-a", "angle", DEFAULT_DESKEW_ANGLE)?;
        b.float_or("xy-res", "-x", "xy resolution", DEFAULT_XY_RES)?;
        b.float_or("fill", "-f", "background fill value", DEFAULT_DECON_FIRST_FILL)?;
        b.bit_depth_or(DEFAULT_DECON_FIRST_BIT_DEPTH)?;
        Ok(b.finish(StageKind::DeconFirst, "deskew"))
    }

    /// Standard deconvolution stage.
    pub fn decon(raw: &RawOptions) -> Result<Self> {
        Self::build_decon(StageKind::Decon, "decon", raw)
    }

    /// Deconvolution half of the decon-first branch.
    pub fn decon_first_decon(raw: &RawOptions) -> Result<Self> {
        Self::build_decon(StageKind::DeconFirst, "decon-first decon", raw)
    }

    fn build_decon(kind: StageKind, label: &str, raw: &RawOptions) -> Result<Self> {
        let mut b = StageBuilder::new(
            label,
            raw,
            &["xy-res", "n", "bit-depth", "subtract", "executable_path"],
        );
        b.float_or("xy-res", "-x", "xy resolution", DEFAULT_XY_RES)?;
        b.int("n", "-n", "iteration number (n)")?;
        b.bit_depth()?;
        b.float("subtract", "-s", "subtract value")?;
        Ok(b.finish(kind, "decon"))
    }

    /// Maximum-intensity projection stage.
    pub fn projection(raw: &RawOptions) -> Result<Self> {
        let mut b = StageBuilder::new(
            "mip",
            raw,
            &["x", "y", "z", "executable_path"],
        );
        for (key, flag) in [("x", "-x"), ("y", "-y"), ("z", "-z")] {
            b.switch(key, flag)?;
        }
        Ok(b.finish(StageKind::Projection, "mip"))
    }
}

const DESKEW_KEYS: &[&str] = &["xy-res", "fill", "bit-depth", "angle", "executable_path"];

/// Collects validated options for one stage; unsupported keys are dropped
/// with a warning as soon as the builder is created.
pub(crate) struct StageBuilder {
    label: String,
    raw: RawOptions,
    options: Vec<StageOption>,
}

impl StageBuilder {
    pub(crate) fn new(label: &str, raw: &RawOptions, supported: &[&str]) -> Self {
        let mut kept = RawOptions::new();
        for (key, value) in raw {
            if supported.contains(&key.as_str()) {
                kept.insert(key.clone(), value.clone());
            } else {
                warn!("{label} option '{key}' is not supported and will be ignored");
            }
        }
        Self {
            label: label.to_string(),
            raw: kept,
            options: Vec::new(),
        }
    }

    fn invalid(&self, what: &str, value: &Value, expected: &str) -> LightsheetError {
        LightsheetError::Config(format!(
            "{} {what} '{value}' {expected}",
            self.label
        ))
    }

    pub(crate) fn push(&mut self, key: &str, flag: &'static str, value: OptionValue) {
        self.options.push(StageOption {
            key: key.to_string(),
            flag,
            value,
        });
    }

    fn read_float(&self, key: &str, what: &str) -> Result<Option<f64>> {
        match self.raw.get(key) {
            None => Ok(None),
            Some(value) => value
                .as_f64()
                .map(Some)
                .ok_or_else(|| self.invalid(what, value, "is not a float")),
        }
    }

    fn read_count(&self, key: &str) -> Result<Option<u64>> {
        match self.raw.get(key) {
            None => Ok(None),
            Some(value) => value
                .as_u64()
                .map(Some)
                .ok_or_else(|| self.invalid(key, value, "is not a non-negative integer")),
        }
    }

    pub(crate) fn float(&mut self, key: &str, flag: &'static str, what: &str) -> Result<()> {
        if let Some(v) = self.read_float(key, what)? {
            self.push(key, flag, OptionValue::Float(v));
        }
        Ok(())
    }

    pub(crate) fn float_or(
        &mut self,
        key: &str,
        flag: &'static str,
        what: &str,
        default: f64,
    ) -> Result<()> {
        let v = match self.read_float(key, what)? {
            Some(v) => v,
            None => {
                warn!("{} {what} not set, using default {default}", self.label);
                default
            }
        };
        self.push(key, flag, OptionValue::Float(v));
        Ok(())
    }

    pub(crate) fn int(&mut self, key: &str, flag: &'static str, what: &str) -> Result<()> {
        if let Some(value) = self.raw.get(key) {
            let v = value
                .as_i64()
                .ok_or_else(|| self.invalid(what, value, "is not an integer"))?;
            self.push(key, flag, OptionValue::Int(v));
        }
        Ok(())
    }

    pub(crate) fn text(&mut self, key: &str, flag: &'static str, what: &str) -> Result<()> {
        if let Some(value) = self.raw.get(key) {
            let v = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                other => return Err(self.invalid(what, other, "is not a string")),
            };
            self.push(key, flag, OptionValue::Text(v));
        }
        Ok(())
    }

    fn read_bit_depth(&self) -> Result<Option<i64>> {
        match self.raw.get("bit-depth") {
            None => Ok(None),
            Some(value) => match value.as_i64() {
                Some(v) if SUPPORTED_BIT_DEPTHS.contains(&v) => Ok(Some(v)),
                _ => Err(self.invalid("bit-depth", value, "must be 8, 16, or 32")),
            },
        }
    }

    pub(crate) fn bit_depth(&mut self) -> Result<()> {
        if let Some(v) = self.read_bit_depth()? {
            self.push("bit-depth", "-b", OptionValue::Int(v));
        }
        Ok(())
    }

    fn bit_depth_or(&mut self, default: i64) -> Result<()> {
        let v = match self.read_bit_depth()? {
            Some(v) => v,
            None => {
                warn!("{} bit-depth not set, using default {default}", self.label);
                default
            }
        };
        self.push("bit-depth", "-b", OptionValue::Int(v));
        Ok(())
    }

    fn switch(&mut self, key: &str, flag: &'static str) -> Result<()> {
        if let Some(value) = self.raw.get(key) {
            match value.as_bool() {
                Some(true) => self.push(key, flag, OptionValue::Switch),
                Some(false) => {}
                None => {
                    return Err(self.invalid(
                        &format!("{key} projection"),
                        value,
                        "is not true or false",
                    ))
                }
            }
        }
        Ok(())
    }

    pub(crate) fn finish(self, kind: StageKind, default_executable: &str) -> StageConfig {
        let executable = self
            .raw
            .get("executable_path")
            .and_then(Value::as_str)
            .unwrap_or(default_executable)
            .to_string();
        StageConfig {
            kind,
            executable,
            options: self.options,
        }
    }

    pub(crate) fn into_options(self) -> Vec<StageOption> {
        self.options
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> RawOptions {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn unsupported_options_are_dropped() {
        let cfg = StageConfig::deskew(&raw(json!({"angle": 31.8, "speed": 3}))).unwrap();
        assert!(cfg.option("speed").is_none());
        assert_eq!(cfg.float("angle"), Some(31.8));
    }

    #[test]
    fn deskew_defaults_are_substituted() {
        let cfg = StageConfig::deskew(&RawOptions::new()).unwrap();
        assert_eq!(cfg.float("angle"), Some(DEFAULT_DESKEW_ANGLE));
        assert_eq!(cfg.float("xy-res"), Some(DEFAULT_XY_RES));
        assert_eq!(cfg.executable(), "deskew");
    }

    #[test]
    fn bit_depth_must_be_supported() {
        let err = StageConfig::decon(&raw(json!({"bit-depth": 12}))).unwrap_err();
        assert!(err.to_string().contains("must be 8, 16, or 32"), "got: {err}");
    }

    #[test]
    fn iteration_count_must_be_integer() {
        assert!(StageConfig::decon(&raw(json!({"n": 10.5}))).is_err());
        let cfg = StageConfig::decon(&raw(json!({"n": 10}))).unwrap();
        assert_eq!(cfg.int("n"), Some(10));
    }

    #[test]
    fn float_options_reject_strings() {
        let err = StageConfig::deskew(&raw(json!({"angle": "wide"}))).unwrap_err();
        assert!(matches!(err, LightsheetError::Config(_)));
    }

    #[test]
    fn crop_sides_render_in_fixed_order() {
        let (cfg, xy) = StageConfig::crop(&raw(json!({
            "cropTop": 5, "cropBack": 2, "xy-res": 0.1, "bit-depth": 16
        })))
        .unwrap();
        assert_eq!(xy, Some(0.1));
        assert_eq!(cfg.command_prefix(), "crop -c 5,0,0,0,0,2 -b 16");
    }

    #[test]
    fn projection_switches_only_when_true() {
        let cfg = StageConfig::projection(&raw(json!({"x": false, "z": true}))).unwrap();
        assert_eq!(cfg.command_prefix(), "mip -z");
        assert!(StageConfig::projection(&raw(json!({"y": 1}))).is_err());
    }

    #[test]
    fn record_contains_flags_and_args() {
        let cfg = StageConfig::deskew(&raw(json!({"angle": 31.8, "executable_path": "/opt/deskew"})))
            .unwrap();
        let record = cfg.to_record();
        assert_eq!(record["executable_path"], json!("/opt/deskew"));
        assert_eq!(record["angle"], json!({"flag": "-a", "arg": 31.8}));
    }

    #[test]
    fn decon_first_decon_defaults_to_decon_executable() {
        let cfg = StageConfig::decon_first_decon(&RawOptions::new()).unwrap();
        assert_eq!(cfg.executable(), "decon");
        assert_eq!(cfg.kind(), StageKind::DeconFirst);
    }
}

use tracing::warn;

use super::stage::{OptionValue, RawOptions, StageBuilder, StageOption};
use crate::consts::{
    DEFAULT_JOB_ESTIMATE_MIN, DEFAULT_JOB_LIMIT_MIN, DEFAULT_JOB_LOG, DEFAULT_JOB_NAME,
    DEFAULT_JOB_SLOTS, SCHEDULER_SUBMIT,
};
use crate::error::Result;

/// Submission flags for the batch scheduler.
#[derive(Clone, Debug, PartialEq)]
pub struct SchedulerConfig {
    options: Vec<StageOption>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        let option = |key: &str, flag, value| StageOption {
            key: key.to_string(),
            flag,
            value,
        };
        Self {
            options: vec![
                option("J", "-J", OptionValue::Text(DEFAULT_JOB_NAME.into())),
                option("o", "-o", OptionValue::Text(DEFAULT_JOB_LOG.into())),
                option("We", "-We", OptionValue::Int(DEFAULT_JOB_ESTIMATE_MIN)),
                option("n", "-n", OptionValue::Int(DEFAULT_JOB_SLOTS)),
                option("W", "-W", OptionValue::Int(DEFAULT_JOB_LIMIT_MIN)),
            ],
        }
    }
}

impl SchedulerConfig {
    /// Overlay user options on the defaults. A missing hard run limit keeps
    /// the default but is reported.
    pub fn from_raw(raw: Option<&RawOptions>) -> Result<Self> {
        let mut config = Self::default();
        let Some(raw) = raw else {
            return Ok(config);
        };

        let mut b = StageBuilder::new(
            "bsub",
            raw,
            &["o", "We", "n", "W", "P"],
        );
        b.text("o", "-o", "output path")?;
        b.int("We", "-We", "estimated run time")?;
        b.int("n", "-n", "slot count")?;
        b.int("W", "-W", "hard run time limit")?;
        b.text("P", "-P", "project")?;

        if !raw.contains_key("W") {
            warn!(
                "bsub hard run time limit (W) not set, jobs are limited to {} minutes",
                DEFAULT_JOB_LIMIT_MIN
            );
        }

        for option in b.into_options() {
            match config.options.iter_mut().find(|o| o.key == option.key) {
                Some(existing) => *existing = option,
                None => config.options.push(option),
            }
        }
        Ok(config)
    }

    pub fn options(&self) -> &[StageOption] {
        &self.options
    }

    /// `bsub -J .. -o .. ...` without the quoted job body.
    pub fn submit_prefix(&self) -> String {
        let mut cmd = SCHEDULER_SUBMIT.to_string();
        for option in &self.options {
            cmd.push_str(&option.render());
        }
        cmd
    }

    /// Wrap a chained job body into one quoted submission.
    pub fn wrap(&self, body: &str) -> String {
        format!("{} {}", self.submit_prefix(), crate::command::double_quote(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_render_in_order() {
        let cfg = SchedulerConfig::default();
        assert_eq!(
            cfg.submit_prefix(),
            "bsub -J lightsheet-pipeline -o /dev/null -We 250 -n 4 -W 480"
        );
    }

    #[test]
    fn user_values_replace_defaults_and_extend() {
        let raw = json!({"n": 8, "P": "imaging", "W": 60, "queue": "fast"});
        let cfg = SchedulerConfig::from_raw(raw.as_object()).unwrap();
        assert_eq!(
            cfg.submit_prefix(),
            "bsub -J lightsheet-pipeline -o /dev/null -We 250 -n 8 -W 60 -P imaging"
        );
    }

    #[test]
    fn slot_count_must_be_integer() {
        let raw = json!({"n": "four"});
        assert!(SchedulerConfig::from_raw(raw.as_object()).is_err());
    }
}

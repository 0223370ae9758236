use crate::error::SetupError;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// One segment of the load profile. Over `duration` the number of virtual users moves linearly
/// from the previous stage's target (zero for the first stage) to this stage's `target`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Stage {
    #[serde(deserialize_with = "deserialize_duration")]
    pub duration: Duration,
    pub target: usize,
}

impl Stage {
    pub fn new(duration: Duration, target: usize) -> Self {
        Self { duration, target }
    }
}

/// A validated, ordered list of stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagePlan {
    stages: Vec<Stage>,
    total_duration: Duration,
}

impl StagePlan {
    pub fn new(stages: Vec<Stage>) -> Result<Self, SetupError> {
        if stages.is_empty() {
            return Err(SetupError::NoStages);
        }

        if let Some(index) = stages.iter().position(|s| s.duration.is_zero()) {
            return Err(SetupError::ZeroStageDuration { index });
        }

        // Every partial sum used by `target_at` fits once the total does.
        let total_duration = stages
            .iter()
            .try_fold(Duration::ZERO, |total, s| total.checked_add(s.duration))
            .ok_or(SetupError::PlanTooLong)?;

        Ok(Self {
            stages,
            total_duration,
        })
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn total_duration(&self) -> Duration {
        self.total_duration
    }

    pub fn peak_target(&self) -> usize {
        self.stages.iter().map(|s| s.target).max().unwrap_or(0)
    }

    pub fn is_finished(&self, elapsed: Duration) -> bool {
        elapsed >= self.total_duration
    }

    /// The number of virtual users the plan asks for at `elapsed` into the run.
    ///
    /// At a stage boundary this is exactly the target of the stage that just ended. Once the plan
    /// is finished this stays at the last stage's target.
    pub fn target_at(&self, elapsed: Duration) -> usize {
        let mut stage_start = Duration::ZERO;
        let mut previous_target = 0;

        for stage in &self.stages {
            let stage_end = stage_start + stage.duration;
            if elapsed < stage_end {
                return interpolate(
                    previous_target,
                    stage.target,
                    elapsed - stage_start,
                    stage.duration,
                );
            }

            stage_start = stage_end;
            previous_target = stage.target;
        }

        previous_target
    }
}

/// Round-to-nearest linear interpolation in integer arithmetic, monotonic in `progress`.
fn interpolate(from: usize, to: usize, progress: Duration, duration: Duration) -> usize {
    let progress = progress.as_nanos();
    let duration = duration.as_nanos();

    if to >= from {
        let delta = (to - from) as u128;
        from + ((delta * progress + duration / 2) / duration) as usize
    } else {
        let delta = (from - to) as u128;
        from - ((delta * progress + duration / 2) / duration) as usize
    }
}

/// A stage duration is either a number of seconds or a string like `500ms`, `30s` or `1m 30s`.
fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    struct StageDurationVisitor;

    impl Visitor<'_> for StageDurationVisitor {
        type Value = Duration;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a number of seconds or a duration string like 500ms, 30s or 1m 30s")
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Duration::from_secs(v))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            u64::try_from(v)
                .map(Duration::from_secs)
                .map_err(|_| E::custom("duration must not be negative"))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if !v.is_finite() || v < 0.0 {
                return Err(E::custom("duration must be a non-negative, finite number"));
            }
            Duration::try_from_secs_f64(v).map_err(E::custom)
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v).map_err(E::custom)
        }
    }

    deserializer.deserialize_any(StageDurationVisitor)
}

/// Accept either a bare list of stages or an object with a `stages` field.
#[derive(Deserialize)]
#[serde(untagged)]
enum StageFile {
    List(Vec<Stage>),
    Options { stages: Vec<Stage> },
}

/// Load stages from a JSON (`.json`) or YAML file.
///
/// The stages are not validated here, pass them to [StagePlan::new] for that.
pub fn load_stages(path: &Path) -> Result<Vec<Stage>, SetupError> {
    let invalid = |reason: String| SetupError::InvalidStageFile {
        path: path.display().to_string(),
        reason,
    };

    let content = std::fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;

    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let file: StageFile = if is_json {
        serde_json::from_str(&content).map_err(|e| invalid(e.to_string()))?
    } else {
        serde_yaml::from_str(&content).map_err(|e| invalid(e.to_string()))?
    };

    Ok(match file {
        StageFile::List(stages) => stages,
        StageFile::Options { stages } => stages,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn load_test_plan() -> StagePlan {
        StagePlan::new(vec![
            Stage::new(secs(30), 60),
            Stage::new(secs(60), 60),
            Stage::new(secs(30), 120),
            Stage::new(secs(60), 120),
            Stage::new(secs(30), 0),
        ])
        .unwrap()
    }

    #[test]
    fn empty_plan_is_rejected() {
        assert_eq!(Err(SetupError::NoStages), StagePlan::new(vec![]));
    }

    #[test]
    fn zero_duration_is_rejected() {
        let result = StagePlan::new(vec![Stage::new(secs(1), 1), Stage::new(Duration::ZERO, 2)]);
        assert_eq!(Err(SetupError::ZeroStageDuration { index: 1 }), result);
    }

    #[test]
    fn plan_longer_than_a_duration_is_rejected() {
        let result = StagePlan::new(vec![
            Stage::new(Duration::from_secs(u64::MAX), 1),
            Stage::new(Duration::from_secs(u64::MAX), 0),
        ]);
        assert_eq!(Err(SetupError::PlanTooLong), result);
    }

    #[test]
    fn target_is_exact_at_every_stage_boundary() {
        let plan = load_test_plan();

        let mut end = Duration::ZERO;
        for stage in plan.stages() {
            end += stage.duration;
            assert_eq!(stage.target, plan.target_at(end), "at {end:?}");
        }
        assert_eq!(secs(210), plan.total_duration());
        assert_eq!(120, plan.peak_target());
    }

    #[test]
    fn ramp_interpolates_linearly() {
        let plan = StagePlan::new(vec![Stage::new(secs(10), 10), Stage::new(secs(10), 0)]).unwrap();

        assert_eq!(0, plan.target_at(Duration::ZERO));
        assert_eq!(5, plan.target_at(secs(5)));
        assert_eq!(10, plan.target_at(secs(10)));
        assert_eq!(7, plan.target_at(secs(13)));
        assert_eq!(0, plan.target_at(secs(20)));
    }

    #[test]
    fn ramps_are_monotonic() {
        let plan = StagePlan::new(vec![
            Stage::new(secs(7), 13),
            Stage::new(secs(3), 13),
            Stage::new(secs(11), 2),
            Stage::new(Duration::from_millis(1_500), 9),
        ])
        .unwrap();

        let mut stage_start = Duration::ZERO;
        let mut previous_target = 0;
        for stage in plan.stages() {
            let step = stage.duration / 97;
            let mut last = plan.target_at(stage_start);
            let mut t = stage_start;
            while t <= stage_start + stage.duration {
                let current = plan.target_at(t);
                if stage.target >= previous_target {
                    assert!(current >= last, "ramp up decreased at {t:?}");
                } else {
                    assert!(current <= last, "ramp down increased at {t:?}");
                }
                last = current;
                t += step;
            }
            stage_start += stage.duration;
            previous_target = stage.target;
        }
    }

    #[test]
    fn zero_target_stage_still_takes_its_time() {
        let plan = StagePlan::new(vec![
            Stage::new(secs(1), 4),
            Stage::new(secs(1), 0),
            Stage::new(secs(5), 0),
            Stage::new(secs(1), 4),
        ])
        .unwrap();

        assert_eq!(0, plan.target_at(secs(4)));
        assert!(!plan.is_finished(secs(7)));
        assert_eq!(2, plan.target_at(Duration::from_millis(7_500)));
        assert!(plan.is_finished(secs(8)));
    }

    fn yaml_stage(duration: &str) -> Result<Stage, serde_yaml::Error> {
        serde_yaml::from_str(&format!("duration: {duration}\ntarget: 1"))
    }

    #[test]
    fn parses_durations() {
        for (value, expected) in [
            ("300ms", Duration::from_millis(300)),
            ("30s", secs(30)),
            ("1m", secs(60)),
            ("1m 30s", secs(90)),
            ("1m30s", secs(90)),
            ("2h", secs(7200)),
            ("45", secs(45)),
            ("1.5", Duration::from_millis(1_500)),
            ("'10s'", secs(10)),
        ] {
            assert_eq!(expected, yaml_stage(value).unwrap().duration, "{value}");
        }
    }

    #[test]
    fn rejects_bad_durations() {
        for value in ["''", "-5", "-0.5", "10x", "s", ".nan", ".inf"] {
            assert!(yaml_stage(value).is_err(), "{value} should be rejected");
        }
    }

    #[test]
    fn overflowing_stage_file_is_a_setup_error() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"[{{"duration": 18446744073709551615, "target": 1}}, {{"duration": 18446744073709551615, "target": 0}}]"#
        )
        .unwrap();

        let stages = load_stages(file.path()).unwrap();

        assert_eq!(Err(SetupError::PlanTooLong), StagePlan::new(stages));
    }

    #[test]
    fn loads_yaml_options_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "stages:\n  - duration: 30s\n    target: 60\n  - duration: 1m\n    target: 120\n  - duration: 15\n    target: 0"
        )
        .unwrap();

        let stages = load_stages(file.path()).unwrap();

        assert_eq!(
            vec![
                Stage::new(secs(30), 60),
                Stage::new(secs(60), 120),
                Stage::new(secs(15), 0),
            ],
            stages
        );
    }

    #[test]
    fn loads_json_list_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"[{{"duration": "500ms", "target": 3}}]"#).unwrap();

        let stages = load_stages(file.path()).unwrap();

        assert_eq!(vec![Stage::new(Duration::from_millis(500), 3)], stages);
    }

    #[test]
    fn negative_target_in_file_is_a_setup_error() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"[{{"duration": "5s", "target": -3}}]"#).unwrap();

        let result = load_stages(file.path());

        assert!(
            matches!(result, Err(SetupError::InvalidStageFile { .. })),
            "{result:?}"
        );
    }

    #[test]
    fn missing_file_is_a_setup_error() {
        let result = load_stages(Path::new("/definitely/not/here.yaml"));
        assert!(matches!(result, Err(SetupError::InvalidStageFile { .. })));
    }
}

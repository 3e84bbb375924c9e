use serde::{Deserialize, Serialize};

/// Reporting interval used when a script does not set `config.statsInterval`.
pub const DEFAULT_STATS_INTERVAL_S: u64 = 10;

/// A load test plan.
///
/// The same type describes the plan the caller hands to the coordinator and the per-worker copies
/// that the work distributor derives from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Script {
    pub config: ScriptConfig,
    #[serde(default)]
    pub scenarios: Vec<ScenarioSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptConfig {
    /// The system under test. Passed through to workers untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Phases are executed in order by every worker.
    pub phases: Vec<PhaseSpec>,
    /// Seconds between two aggregated reports.
    #[serde(default = "default_stats_interval")]
    pub stats_interval: u64,
}

fn default_stats_interval() -> u64 {
    DEFAULT_STATS_INTERVAL_S
}

/// One stage of the plan, such as a warm up, a ramp or a steady state.
///
/// Exactly one of `arrival_rate`, `arrival_count` or `pause` must be set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Length of the phase in seconds. Ignored for pauses.
    #[serde(default)]
    pub duration: u64,
    /// New virtual users per second.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arrival_rate: Option<f64>,
    /// Linearly ramp the arrival rate to this value by the end of the phase.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ramp_to: Option<f64>,
    /// A fixed number of virtual users spread evenly over the phase.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arrival_count: Option<u64>,
    /// Do nothing for this many seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pause: Option<u64>,
}

impl PhaseSpec {
    /// The wall clock time this phase is planned to take, in seconds.
    pub fn planned_duration_s(&self) -> u64 {
        self.pause.unwrap_or(self.duration)
    }

    pub fn display_name(&self, index: u32) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("phase {index}"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Relative chance of a new virtual user picking this scenario.
    #[serde(default = "default_weight")]
    pub weight: u32,
    #[serde(default)]
    pub flow: Vec<FlowStep>,
}

fn default_weight() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum FlowStep {
    Think {
        seconds: f64,
    },
    Request {
        name: String,
        /// Inclusive bounds for the simulated response time.
        latency_ms: (u64, u64),
        #[serde(default)]
        error_rate: f64,
    },
}

#[derive(derive_more::Error, derive_more::Display, Debug)]
#[display("invalid script: {msg}")]
pub struct InvalidScript {
    msg: String,
}

impl InvalidScript {
    fn new(msg: impl Into<String>) -> Self {
        Self { msg: msg.into() }
    }
}

impl Script {
    pub fn validate(&self) -> Result<(), InvalidScript> {
        if self.config.stats_interval == 0 {
            return Err(InvalidScript::new("`statsInterval` must be greater than 0"));
        }
        if self.config.phases.is_empty() {
            return Err(InvalidScript::new("at least one phase is required"));
        }

        for (index, phase) in self.config.phases.iter().enumerate() {
            let modes = [
                phase.arrival_rate.is_some(),
                phase.arrival_count.is_some(),
                phase.pause.is_some(),
            ]
            .into_iter()
            .filter(|set| *set)
            .count();
            if modes != 1 {
                return Err(InvalidScript::new(format!(
                    "phase {index} must set exactly one of `arrivalRate`, `arrivalCount` or `pause`"
                )));
            }
            if phase.pause.is_none() && phase.duration == 0 {
                return Err(InvalidScript::new(format!(
                    "phase {index} needs a `duration` greater than 0"
                )));
            }
            if phase.ramp_to.is_some() && phase.arrival_rate.is_none() {
                return Err(InvalidScript::new(format!(
                    "phase {index} sets `rampTo` without `arrivalRate`"
                )));
            }
            let negative_rate = [phase.arrival_rate, phase.ramp_to]
                .into_iter()
                .flatten()
                .any(|rate| !rate.is_finite() || rate < 0.0);
            if negative_rate {
                return Err(InvalidScript::new(format!(
                    "phase {index} has an arrival rate that is not a finite, positive number"
                )));
            }
        }

        for scenario in &self.scenarios {
            for step in &scenario.flow {
                if let FlowStep::Request {
                    name,
                    latency_ms: (min, max),
                    error_rate,
                } = step
                {
                    if min > max {
                        return Err(InvalidScript::new(format!(
                            "request `{name}` has a minimum latency above its maximum"
                        )));
                    }
                    if !(0.0..=1.0).contains(error_rate) {
                        return Err(InvalidScript::new(format!(
                            "request `{name}` has an `errorRate` outside of 0..=1"
                        )));
                    }
                }
            }
        }

        Ok(())
    }

    /// Sum of the planned phase durations, in seconds.
    pub fn planned_duration_s(&self) -> u64 {
        self.config
            .phases
            .iter()
            .map(PhaseSpec::planned_duration_s)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_script() -> Script {
        serde_json::from_value(serde_json::json!({
            "config": {
                "target": "http://localhost:8080",
                "phases": [
                    { "name": "warm up", "duration": 10, "arrivalRate": 2, "rampTo": 10 },
                    { "pause": 5 },
                    { "duration": 20, "arrivalCount": 100 }
                ]
            },
            "scenarios": [
                {
                    "name": "browse",
                    "flow": [
                        { "request": { "name": "home", "latencyMs": [5, 20] } },
                        { "think": { "seconds": 0.5 } },
                        { "request": { "name": "search", "latencyMs": [10, 40], "errorRate": 0.1 } }
                    ]
                }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn parse_script_with_defaults() {
        let script = sample_script();

        assert_eq!(DEFAULT_STATS_INTERVAL_S, script.config.stats_interval);
        assert_eq!(3, script.config.phases.len());
        assert_eq!(Some(10.0), script.config.phases[0].ramp_to);
        assert_eq!(1, script.scenarios[0].weight);
        assert_eq!(
            FlowStep::Request {
                name: "search".to_string(),
                latency_ms: (10, 40),
                error_rate: 0.1,
            },
            script.scenarios[0].flow[2]
        );
        script.validate().unwrap();
    }

    #[test]
    fn planned_duration_counts_pauses() {
        assert_eq!(35, sample_script().planned_duration_s());
    }

    #[test]
    fn reject_zero_stats_interval() {
        let mut script = sample_script();
        script.config.stats_interval = 0;

        let err = script.validate().unwrap_err();
        assert_eq!(
            "invalid script: `statsInterval` must be greater than 0",
            err.to_string()
        );
    }

    #[test]
    fn reject_phase_with_two_modes() {
        let mut script = sample_script();
        script.config.phases[2].pause = Some(3);

        assert!(script.validate().is_err());
    }

    #[test]
    fn reject_empty_phases() {
        let mut script = sample_script();
        script.config.phases.clear();

        assert!(script.validate().is_err());
    }

    #[test]
    fn reject_inverted_latency_bounds() {
        let mut script = sample_script();
        script.scenarios[0].flow[0] = FlowStep::Request {
            name: "home".to_string(),
            latency_ms: (50, 5),
            error_rate: 0.0,
        };

        assert!(script.validate().is_err());
    }
}

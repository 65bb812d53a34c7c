// Config Validation
// Startup validation: fail fast with actionable errors before any process is spawned

use crate::config::types::{CostParams, GradeError, HarnessConfig, Result, Substitution};
use std::time::Duration;

/// Validation result with detailed errors
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, error: String) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Turn collected errors into a usage error; warnings are logged.
    pub fn into_result(self, what: &str) -> Result<Vec<String>> {
        if !self.is_valid() {
            return Err(GradeError::Usage(format!(
                "{} validation failed:\n{}",
                what,
                self.errors.join("\n")
            )));
        }
        for warning in &self.warnings {
            log::warn!("Configuration warning: {}", warning);
        }
        Ok(self.warnings)
    }
}

/// Validate harness settings before a run
pub fn validate_config(config: &HarnessConfig) -> ValidationResult {
    let mut result = ValidationResult::new();

    validate_timeouts(config, &mut result);
    validate_limits(config, &mut result);
    validate_environment(config, &mut result);

    result
}

fn validate_timeouts(config: &HarnessConfig, result: &mut ValidationResult) {
    if config.read_timeout == Duration::ZERO {
        result.add_error("read_timeout cannot be zero".to_string());
    }
    if config.finish_timeout == Duration::ZERO {
        result.add_error("finish_timeout cannot be zero".to_string());
    }
    if config.read_timeout >= config.finish_timeout && config.finish_timeout != Duration::ZERO {
        result.add_warning(format!(
            "read_timeout ({:?}) >= finish_timeout ({:?}); no scripted input can be delivered",
            config.read_timeout, config.finish_timeout
        ));
    }
    if config.read_timeout < Duration::from_millis(20) && config.read_timeout != Duration::ZERO {
        result.add_warning(format!(
            "read_timeout {:?} is very low, prompts may be answered before they are printed",
            config.read_timeout
        ));
    }
}

fn validate_limits(config: &HarnessConfig, result: &mut ValidationResult) {
    if config.output_limits.stdout_limit == 0 {
        result.add_error("output_limits.stdout_limit cannot be zero".to_string());
    }
    if config.output_limits.stderr_limit == 0 && !config.merge_stderr {
        result.add_warning("stderr_limit is zero, crash text on stderr will be lost".to_string());
    }
}

fn validate_environment(config: &HarnessConfig, result: &mut ValidationResult) {
    for (key, _) in &config.environment {
        if key.is_empty() || key.contains('=') || key.contains('\0') {
            result.add_error(format!("invalid environment variable name: {:?}", key));
        }
    }
    if let Some(ref workdir) = config.workdir {
        if !workdir.is_dir() {
            result.add_error(format!("workdir is not a directory: {:?}", workdir));
        }
    }
}

/// Validate alignment costs and the marker used to render gaps
pub fn validate_costs(costs: &CostParams, gap_marker: char) -> ValidationResult {
    let mut result = ValidationResult::new();

    if gap_marker == '\n' || gap_marker == '\r' {
        result.add_error("gap marker cannot be a line terminator".to_string());
    }
    if costs.gap == 0 {
        result.add_warning("gap cost is zero, every alignment scores zero".to_string());
    }
    if let Substitution::Cost(sub) = costs.substitution {
        if sub > costs.gap.saturating_mul(2) {
            result.add_warning(format!(
                "substitution cost {} exceeds two gaps ({}), substitutions will never be chosen",
                sub,
                costs.gap.saturating_mul(2)
            ));
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let result = validate_config(&HarnessConfig::default());
        assert!(result.is_valid(), "{:?}", result.errors);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn zero_timeouts_are_errors() {
        let config = HarnessConfig::with_timeouts(Duration::ZERO, Duration::ZERO);
        let result = validate_config(&config);
        assert_eq!(result.errors.len(), 2);
        assert!(result.into_result("harness").unwrap_err().is_usage());
    }

    #[test]
    fn read_timeout_past_finish_timeout_warns() {
        let config = HarnessConfig::with_timeouts(Duration::from_secs(5), Duration::from_secs(1));
        let result = validate_config(&config);
        assert!(result.is_valid());
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn bad_environment_names_are_rejected() {
        let mut config = HarnessConfig::default();
        config.environment.push(("A=B".to_string(), "x".to_string()));
        assert!(!validate_config(&config).is_valid());
    }

    #[test]
    fn newline_gap_marker_is_rejected() {
        assert!(!validate_costs(&CostParams::default(), '\n').is_valid());
        assert!(validate_costs(&CostParams::default(), '~').is_valid());
        let expensive = CostParams::new(1, Substitution::Cost(5));
        assert_eq!(validate_costs(&expensive, '~').warnings.len(), 1);
    }
}

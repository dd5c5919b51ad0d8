//! Mode configuration validation and report assembly.
//!
//! Assembly proceeds in three steps:
//! 1. Validate the mode configuration string upfront (duplicates
//!    first, then unknown modes); nothing runs when validation fails
//! 2. Run the selected aggregators one at a time, in registry order
//! 3. Store each payload in the report under its mode letter
//!
//! Aggregators install runtime hooks while they run, so the assembler
//! never overlaps two runs: each aggregator executes the target to
//! completion before the next one starts.

use crate::probe::ProfileTarget;
use crate::report::Report;
use crate::utils::error::{AssembleError, ConfigError, TargetError};
use log::{debug, info};
use serde_json::Value;
use std::collections::HashSet;

/// One mode's aggregation pass over a profiling target
pub trait Aggregator {
    /// Name printed in progress output
    fn name(&self) -> &'static str;

    /// Runs the target under this mode's instrumentation and produces
    /// the mode's report payload
    fn run(&mut self) -> Result<Value, TargetError>;
}

/// Builds one mode's aggregator against a profiling target
pub type AggregatorFactory = Box<dyn Fn(&ProfileTarget) -> Box<dyn Aggregator>>;

/// Available profiling modes, keyed by single-letter code.
///
/// Registration order is run order: `assemble` walks the registry,
/// not the configuration string, so `"hc"` and `"ch"` produce the
/// same report.
#[derive(Default)]
pub struct ModeRegistry {
    entries: Vec<(char, AggregatorFactory)>,
}

impl ModeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, mode: char, factory: AggregatorFactory) {
        self.entries.push((mode, factory));
    }

    pub fn contains(&self, mode: char) -> bool {
        self.entries.iter().any(|(code, _)| *code == mode)
    }

    /// Registered mode letters in run order
    pub fn modes(&self) -> impl Iterator<Item = char> + '_ {
        self.entries.iter().map(|(code, _)| *code)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// **Public** - Validates a mode configuration string.
///
/// The whole string is checked for duplicates before any letter is
/// checked against the registry, so `"cc"` is ambiguous even though
/// `c` is registered, and the unknown-mode error always names the
/// first unrecognized letter.
///
/// # Arguments
/// * `config` - Mode letters requested on the command line, e.g. `"cmh"`
/// * `registry` - Modes available to run
///
/// # Errors
/// `ConfigError::AmbiguousModes` on any repeated letter,
/// `ConfigError::UnknownMode` on the first unregistered one.
pub fn validate_config(config: &str, registry: &ModeRegistry) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for mode in config.chars() {
        if !seen.insert(mode) {
            return Err(ConfigError::AmbiguousModes(config.to_string()));
        }
    }

    for mode in config.chars() {
        if !registry.contains(mode) {
            return Err(ConfigError::UnknownMode(mode));
        }
    }

    Ok(())
}

/// **Public** - Runs the selected aggregators against a target and
/// collects their payloads into one report.
///
/// # Arguments
/// * `target` - The program being profiled
/// * `config` - Mode letters to run
/// * `registry` - Available modes in run order
///
/// # Returns
/// A report holding one payload per requested mode, keyed by mode
/// letter in registry order
///
/// # Errors
/// `AssembleError::Config` when validation fails (no aggregator has
/// been built or run at that point), `AssembleError::Aggregator` when
/// a mode's run fails.
///
/// # Example
/// ```no_run
/// use profviz::aggregator::{assemble, ModeRegistry};
/// use profviz::probe::ProfileTarget;
///
/// let target = ProfileTarget::resolve("app.py").unwrap();
/// let registry = ModeRegistry::new();
/// let report = assemble(&target, "", &registry).unwrap();
/// assert!(report.is_empty());
/// ```
pub fn assemble(
    target: &ProfileTarget,
    config: &str,
    registry: &ModeRegistry,
) -> Result<Report, AssembleError> {
    validate_config(config, registry)?;
    debug!("Mode configuration '{}' validated", config);

    let mut report = Report::new();
    for (mode, factory) in &registry.entries {
        if !config.contains(*mode) {
            continue;
        }

        let mut aggregator = factory(target);
        info!("Running {}...", aggregator.name());

        let payload = aggregator
            .run()
            .map_err(|source| AssembleError::Aggregator {
                mode: *mode,
                source,
            })?;
        report.insert(*mode, payload);
    }

    debug!("Assembled {} mode payload(s)", report.len());
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::RefCell;
    use std::path::PathBuf;
    use std::rc::Rc;

    struct RecordingAggregator {
        mode: char,
        log: Rc<RefCell<Vec<char>>>,
    }

    impl Aggregator for RecordingAggregator {
        fn name(&self) -> &'static str {
            "RecordingAggregator"
        }

        fn run(&mut self) -> Result<Value, TargetError> {
            self.log.borrow_mut().push(self.mode);
            Ok(json!({ "mode": self.mode.to_string() }))
        }
    }

    fn recording_registry(log: &Rc<RefCell<Vec<char>>>) -> ModeRegistry {
        let mut registry = ModeRegistry::new();
        for mode in ['m', 'c', 'h', 'p'] {
            let log = Rc::clone(log);
            registry.register(
                mode,
                Box::new(move |_| {
                    Box::new(RecordingAggregator {
                        mode,
                        log: Rc::clone(&log),
                    })
                }),
            );
        }
        registry
    }

    fn test_target() -> ProfileTarget {
        ProfileTarget::Module {
            path: PathBuf::from("app.py"),
            args: vec![],
        }
    }

    #[test]
    fn test_validate_config_accepts_registered_modes() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let registry = recording_registry(&log);

        assert!(validate_config("cmh", &registry).is_ok());
        assert!(validate_config("", &registry).is_ok());
    }

    #[test]
    fn test_validate_config_rejects_duplicates() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let registry = recording_registry(&log);

        let result = validate_config("cc", &registry);
        assert_eq!(
            result,
            Err(ConfigError::AmbiguousModes("cc".to_string()))
        );
    }

    #[test]
    fn test_validate_config_duplicates_win_over_unknown() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let registry = recording_registry(&log);

        // 'z' is unregistered, but the repeated letter is reported first.
        let result = validate_config("zz", &registry);
        assert_eq!(
            result,
            Err(ConfigError::AmbiguousModes("zz".to_string()))
        );
    }

    #[test]
    fn test_validate_config_names_first_unknown_mode() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let registry = recording_registry(&log);

        let result = validate_config("czq", &registry);
        assert_eq!(result, Err(ConfigError::UnknownMode('z')));
    }

    #[test]
    fn test_assemble_runs_in_registry_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let registry = recording_registry(&log);

        let report = assemble(&test_target(), "hc", &registry).unwrap();

        // Registry order is m, c, h, p; the configuration order does
        // not matter.
        assert_eq!(*log.borrow(), vec!['c', 'h']);
        let keys: Vec<&str> = report.keys().collect();
        assert_eq!(keys, vec!["c", "h"]);
    }

    #[test]
    fn test_assemble_invokes_nothing_on_invalid_config() {
        let invocations = Rc::new(RefCell::new(0));
        let mut registry = ModeRegistry::new();
        for mode in ['c', 'm'] {
            let invocations = Rc::clone(&invocations);
            let log = Rc::new(RefCell::new(Vec::new()));
            registry.register(
                mode,
                Box::new(move |_| {
                    *invocations.borrow_mut() += 1;
                    Box::new(RecordingAggregator {
                        mode,
                        log: Rc::clone(&log),
                    })
                }),
            );
        }

        assert!(assemble(&test_target(), "cc", &registry).is_err());
        assert!(assemble(&test_target(), "cz", &registry).is_err());
        assert_eq!(*invocations.borrow(), 0);
    }

    #[test]
    fn test_assemble_propagates_aggregator_failure() {
        struct FailingAggregator;

        impl Aggregator for FailingAggregator {
            fn name(&self) -> &'static str {
                "FailingAggregator"
            }

            fn run(&mut self) -> Result<Value, TargetError> {
                Err(TargetError::RunFailed("target exited".to_string()))
            }
        }

        let mut registry = ModeRegistry::new();
        registry.register('c', Box::new(|_| Box::new(FailingAggregator)));

        let result = assemble(&test_target(), "c", &registry);
        match result {
            Err(AssembleError::Aggregator { mode, .. }) => assert_eq!(mode, 'c'),
            other => panic!("Expected aggregator error, got {:?}", other),
        }
    }

    #[test]
    fn test_assemble_empty_config_produces_empty_report() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let registry = recording_registry(&log);

        let report = assemble(&test_target(), "", &registry).unwrap();
        assert!(report.is_empty());
        assert!(log.borrow().is_empty());
    }
}

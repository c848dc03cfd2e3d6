//! Per-call build-out configuration.

use crate::invocation::{Arg, ResultMap};
use serde_json::Value;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Options for one build-out.
///
/// `args` and `kwargs` are forwarded unchanged to every producer that runs.
///
/// # Example
///
/// ```
/// use convenient_flags::BuildOptions;
/// use serde_json::json;
///
/// let options = BuildOptions::new()
///     .arg(json!("bucket-name"))
///     .kwarg("region", json!("us-east-1"))
///     .pass_snapshot_always(true);
/// assert!(options.snapshot_always());
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct BuildOptions {
    pass_snapshot_always: bool,
    args: Vec<Arg>,
    kwargs: ResultMap,
}

impl BuildOptions {
    /// Defaults: snapshot only for producers with dependencies, no extra arguments.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand every producer a snapshot, dependencies or not.
    #[must_use]
    pub fn pass_snapshot_always(mut self, always: bool) -> Self {
        self.pass_snapshot_always = always;
        self
    }

    /// Append a positional argument.
    #[must_use]
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(Arg::Value(value.into()));
        self
    }

    /// Append the live result as a positional argument.
    ///
    /// Producers then receive the snapshot at this position instead of as a
    /// leading argument.
    #[must_use]
    pub fn live_result_arg(mut self) -> Self {
        self.args.push(Arg::LiveResult);
        self
    }

    /// Set a keyword argument.
    #[must_use]
    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let _ = self.kwargs.insert(name.into(), value.into());
        self
    }

    /// Whether every producer receives a snapshot.
    #[must_use]
    pub fn snapshot_always(&self) -> bool {
        self.pass_snapshot_always
    }

    /// Positional arguments.
    #[must_use]
    pub fn args(&self) -> &[Arg] {
        &self.args
    }

    /// Keyword arguments.
    #[must_use]
    pub fn kwargs(&self) -> &ResultMap {
        &self.kwargs
    }

    /// True when the live result is already among the positional arguments.
    #[must_use]
    pub fn carries_live_result(&self) -> bool {
        self.args.iter().any(|arg| matches!(arg, Arg::LiveResult))
    }

    /// Whether a producer with `has_dependencies` gets a leading snapshot.
    #[must_use]
    pub fn leads_with_snapshot(&self, has_dependencies: bool) -> bool {
        (has_dependencies || self.pass_snapshot_always) && !self.carries_live_result()
    }
}

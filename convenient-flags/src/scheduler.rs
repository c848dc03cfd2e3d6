//! Multi-pass execution of producers in dependency order.
//!
//! Each pass walks the queue in registration order. A producer is dropped
//! when none of its flags were asked for, kept when its dependencies are not
//! yet executed, and otherwise run once. Passes repeat until the queue drains.
//! A pass that runs nothing while producers are still queued is a deadlock,
//! whether the queued producers wait on each other or on a flag no producer
//! provides.

use crate::error::{CycleStage, FlagError, FlagResult};
use crate::flags::FlagMask;
use crate::invocation::{Invocation, ResultMap};
use crate::options::BuildOptions;
use crate::registry::{Entry, ProducerId, Registry, Slot};
use crate::resolver::DependencyResolver;
use serde_json::Value;

/// Outcome of a single pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Producers run in this pass, in order.
    pub executed: Vec<ProducerId>,
    /// Producers dropped because none of their flags were wanted.
    pub skipped: usize,
    /// Producers left queued for a later pass.
    pub blocked: usize,
}

impl PassReport {
    /// True when the pass ran something.
    #[must_use]
    pub fn made_progress(&self) -> bool {
        !self.executed.is_empty()
    }
}

/// Summary of a finished build-out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    /// Mask the caller asked for.
    pub requested: FlagMask,
    /// Mask after dependency expansion.
    pub expanded: FlagMask,
    /// Flags of every producer that ran.
    pub executed: FlagMask,
    /// Names of the producers that ran, in execution order.
    pub producers: Vec<String>,
    /// Number of passes.
    pub passes: usize,
}

/// Scheduling state of one build-out.
#[derive(Debug)]
pub struct Scheduler<'r> {
    registry: &'r Registry,
    requested: FlagMask,
    wanted: FlagMask,
    queue: Vec<ProducerId>,
    executed: FlagMask,
    history: Vec<ProducerId>,
    passes: usize,
}

impl<'r> Scheduler<'r> {
    /// Expand `requested` and queue every registered producer.
    ///
    /// # Errors
    ///
    /// Returns `FlagError::CircularDependency` if expansion finds a cycle.
    pub fn new(registry: &'r Registry, requested: FlagMask) -> FlagResult<Self> {
        let wanted = DependencyResolver::new(registry).expand(requested)?;
        let mut scheduler = Self::with_queue(registry, wanted, registry.ids());
        scheduler.requested = requested;
        Ok(scheduler)
    }

    /// Schedule an explicit queue against an already expanded mask.
    #[must_use]
    pub fn with_queue(
        registry: &'r Registry,
        wanted: FlagMask,
        queue: impl IntoIterator<Item = ProducerId>,
    ) -> Self {
        Self {
            registry,
            requested: wanted,
            wanted,
            queue: queue.into_iter().collect(),
            executed: FlagMask::NONE,
            history: Vec::new(),
            passes: 0,
        }
    }

    /// Flags of every producer run so far.
    #[must_use]
    pub fn executed(&self) -> FlagMask {
        self.executed
    }

    /// The mask producers are matched against.
    #[must_use]
    pub fn wanted(&self) -> FlagMask {
        self.wanted
    }

    /// Number of producers still queued.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// True once the queue is empty.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.queue.is_empty()
    }

    /// Passes run so far.
    #[must_use]
    pub fn passes(&self) -> usize {
        self.passes
    }

    /// Run one pass over the queue, writing outputs into `result`.
    ///
    /// # Errors
    ///
    /// - `FlagError::CircularDependency` if nothing could run while producers
    ///   are still queued
    /// - any error from a producer or from storing its return value; the
    ///   queue keeps the failed producer and everything after it
    pub fn run_pass(&mut self, result: &mut ResultMap, options: &BuildOptions) -> FlagResult<PassReport> {
        let registry = self.registry;
        self.passes += 1;
        let mut report = PassReport::default();
        let queue = std::mem::take(&mut self.queue);
        let mut next = Vec::with_capacity(queue.len());

        for (position, &id) in queue.iter().enumerate() {
            let slot = registry.slot(id);
            let flag = slot.method_flag();

            if !flag.intersects(self.wanted) {
                report.skipped += 1;
                continue;
            }
            if !self.executed.contains(slot.method_dependencies()) {
                report.blocked += 1;
                next.push(id);
                continue;
            }

            if let Err(err) = self.invoke(slot, result, options) {
                next.extend_from_slice(&queue[position..]);
                self.queue = next;
                return Err(err);
            }
            self.executed |= flag;
            self.history.push(id);
            report.executed.push(id);
        }
        self.queue = next;

        if !report.made_progress() && !self.queue.is_empty() {
            return Err(self.deadlock());
        }

        tracing::debug!(
            "Pass {}: executed {}, blocked {}, skipped {}",
            self.passes,
            report.executed.len(),
            report.blocked,
            report.skipped
        );
        Ok(report)
    }

    /// Run passes until the queue drains.
    ///
    /// # Errors
    ///
    /// See [`Scheduler::run_pass`].
    pub fn run(mut self, result: &mut ResultMap, options: &BuildOptions) -> FlagResult<BuildReport> {
        while !self.is_finished() {
            let _ = self.run_pass(result, options)?;
        }

        Ok(BuildReport {
            requested: self.requested,
            expanded: self.wanted,
            executed: self.executed,
            producers: self.history.iter().map(|&id| self.registry.name(id)).collect(),
            passes: self.passes,
        })
    }

    fn invoke(&self, slot: &Slot, result: &mut ResultMap, options: &BuildOptions) -> FlagResult<()> {
        let producer = &slot.producer;
        let lead = options.leads_with_snapshot(!slot.method_dependencies().is_empty());
        let snapshot = (lead || options.carries_live_result()).then(|| result.clone());
        let invocation = Invocation::new(
            producer.name(),
            snapshot,
            lead,
            options.args(),
            options.kwargs(),
        );

        tracing::trace!(
            "Invoking '{}' with {} arg(s), snapshot: {}",
            producer.name(),
            invocation.args().len(),
            invocation.snapshot().is_some()
        );
        let value = producer
            .call(&invocation)
            .map_err(|source| FlagError::Producer {
                producer: producer.name().to_string(),
                source,
            })?;

        self.store(slot, value, result)
    }

    fn store(&self, slot: &Slot, value: Value, result: &mut ResultMap) -> FlagResult<()> {
        let name = slot.producer.name();
        if let [entry] = slot.entries.as_slice() {
            return self.store_entry(name, entry, value, result);
        }

        let expected = slot.entries.len();
        let values = match value {
            Value::Array(values) if values.len() == expected => values,
            Value::Array(values) => {
                return Err(FlagError::ReturnArity {
                    producer: name.to_string(),
                    expected,
                    found: values.len(),
                });
            }
            _ => {
                return Err(FlagError::ReturnArity {
                    producer: name.to_string(),
                    expected,
                    found: 1,
                });
            }
        };

        for entry in &slot.entries {
            self.store_entry(name, entry, values[entry.return_index].clone(), result)?;
        }
        Ok(())
    }

    // Outputs outside the wanted mask were computed for a sibling entry only.
    fn store_entry(&self, name: &str, entry: &Entry, value: Value, result: &mut ResultMap) -> FlagResult<()> {
        if !entry.flag.intersects(self.wanted) {
            tracing::trace!("Discarding unrequested output {} of '{}'", entry.flag, name);
            return Ok(());
        }

        match (&entry.key, value) {
            (Some(key), value) => {
                let _ = result.insert(key.clone(), value);
            }
            (None, Value::Object(map)) => result.extend(map),
            (None, _) => {
                return Err(FlagError::NotAMapping {
                    producer: name.to_string(),
                    flag: entry.flag,
                });
            }
        }
        Ok(())
    }

    fn outstanding(&self, id: ProducerId) -> FlagMask {
        self.registry
            .slot(id)
            .method_dependencies()
            .difference(self.executed)
    }

    fn deadlock(&self) -> FlagError {
        let flags = self
            .queue
            .iter()
            .fold(FlagMask::NONE, |acc, &id| acc | self.outstanding(id));
        tracing::warn!(
            "Pass {} made no progress with {} producer(s) queued, waiting on {}",
            self.passes,
            self.queue.len(),
            flags
        );
        FlagError::CircularDependency {
            stage: CycleStage::Scheduling,
            producers: self.queue.iter().map(|&id| self.registry.name(id)).collect(),
            flags,
        }
    }
}

impl Registry {
    /// Run every producer needed for `requested` and collect their outputs
    /// in a fresh mapping.
    ///
    /// # Errors
    ///
    /// See [`Registry::build_out_into`].
    pub fn build_out(&self, requested: FlagMask, options: &BuildOptions) -> FlagResult<ResultMap> {
        let mut result = ResultMap::new();
        let _ = self.build_out_into(requested, &mut result, options)?;
        Ok(result)
    }

    /// Like [`Registry::build_out`], seeding from and writing into `start_with`.
    ///
    /// On failure `start_with` keeps whatever was written before the error.
    ///
    /// # Errors
    ///
    /// - `FlagError::CircularDependency` from expansion or a stuck pass
    /// - `FlagError::Producer` when a producer fails
    /// - `FlagError::ReturnArity` / `FlagError::NotAMapping` for return values
    ///   that do not fit the declared entries
    pub fn build_out_into(
        &self,
        requested: FlagMask,
        start_with: &mut ResultMap,
        options: &BuildOptions,
    ) -> FlagResult<BuildReport> {
        let span = tracing::debug_span!("build_out", requested = %requested);
        let _enter = span.enter();

        let report = Scheduler::new(self, requested)?.run(start_with, options)?;
        tracing::debug!(
            "Built out {} in {} pass(es): {:?}",
            report.expanded,
            report.passes,
            report.producers
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::FlagSet;
    use crate::registry::{Producer, Registration};
    use serde_json::json;
    use std::collections::HashSet;
    use tracing_test::traced_test;

    fn keys(result: &ResultMap) -> HashSet<&str> {
        result.keys().map(String::as_str).collect()
    }

    #[test]
    fn test_do_method_pass_requires_another_pass() {
        let flags = FlagSet::allocate(["ONE", "TWO"]).unwrap();
        let one = flags.get("ONE").unwrap();
        let two = flags.get("TWO").unwrap();

        let mut registry = Registry::new();
        let method_one = registry
            .register(&Producer::new("method_one", |_| Ok(json!(1))), Registration::new(one).key("one"))
            .unwrap();
        let method_two = registry
            .register(
                &Producer::new("method_two", |_| Ok(json!(2))),
                Registration::new(two).key("two").depends_on(one),
            )
            .unwrap();

        let mut result = ResultMap::new();
        let options = BuildOptions::default();
        let mut scheduler = Scheduler::with_queue(&registry, one | two, [method_two, method_one]);

        let first = scheduler.run_pass(&mut result, &options).unwrap();
        assert_eq!(first.executed, vec![method_one]);
        assert_eq!(first.blocked, 1);
        assert_eq!(scheduler.pending(), 1);
        assert_eq!(scheduler.executed(), one);
        assert_eq!(keys(&result), HashSet::from(["one"]));

        let second = scheduler.run_pass(&mut result, &options).unwrap();
        assert_eq!(second.executed, vec![method_two]);
        assert!(scheduler.is_finished());
        assert_eq!(scheduler.executed(), one | two);
        assert_eq!(scheduler.passes(), 2);
        assert_eq!(keys(&result), HashSet::from(["one", "two"]));
    }

    #[test]
    fn test_circular_pass() {
        let flags = FlagSet::allocate(["ONE", "TWO"]).unwrap();
        let one = flags.get("ONE").unwrap();
        let two = flags.get("TWO").unwrap();

        let mut registry = Registry::new();
        let method_one = registry
            .register(
                &Producer::new("method_one", |_| Ok(Value::Null)),
                Registration::new(one).key("one").depends_on(two),
            )
            .unwrap();
        let method_two = registry
            .register(
                &Producer::new("method_two", |_| Ok(Value::Null)),
                Registration::new(two).key("two").depends_on(one),
            )
            .unwrap();

        let mut scheduler = Scheduler::with_queue(&registry, one | two, [method_one, method_two]);
        let err = scheduler
            .run_pass(&mut ResultMap::new(), &BuildOptions::default())
            .unwrap_err();

        match err {
            FlagError::CircularDependency { stage, producers, flags } => {
                assert_eq!(stage, CycleStage::Scheduling);
                assert_eq!(producers, vec!["method_one", "method_two"]);
                assert_eq!(flags, one | two);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_irrelevant_producers_are_skipped() {
        let flags = FlagSet::allocate(["A", "B"]).unwrap();
        let mut registry = Registry::new();
        let _ = registry
            .register(&Producer::new("a", |_| Ok(json!("a"))), Registration::new(flags.get("A").unwrap()).key("a"))
            .unwrap();
        let _ = registry
            .register(
                &Producer::new("b", |_| Err("must not run".into())),
                Registration::new(flags.get("B").unwrap()).key("b"),
            )
            .unwrap();

        let mut scheduler = Scheduler::new(&registry, flags.get("A").unwrap()).unwrap();
        let mut result = ResultMap::new();
        let pass = scheduler.run_pass(&mut result, &BuildOptions::default()).unwrap();

        assert_eq!(pass.skipped, 1);
        assert_eq!(pass.executed.len(), 1);
        assert!(scheduler.is_finished());
        assert_eq!(result, json!({"a": "a"}).as_object().cloned().unwrap());
    }

    #[traced_test]
    #[test]
    fn test_unprovided_dependency_deadlocks() {
        let flags = FlagSet::allocate(["BASE", "ORPHAN", "CONSUMER", "GHOST"]).unwrap();
        let base = flags.get("BASE").unwrap();
        let orphan = flags.get("ORPHAN").unwrap();
        let consumer = flags.get("CONSUMER").unwrap();
        let ghost = flags.get("GHOST").unwrap();

        let mut registry = Registry::new();
        let _ = registry
            .register(&Producer::new("base", |_| Ok(json!(true))), Registration::new(base).key("base"))
            .unwrap();
        let _ = registry
            .register(
                &Producer::new("orphan", |_| Ok(json!(true))),
                Registration::new(orphan).key("orphan").depends_on(ghost),
            )
            .unwrap();
        let _ = registry
            .register(
                &Producer::new("consumer", |_| Ok(json!(true))),
                Registration::new(consumer).key("consumer").depends_on(orphan | base),
            )
            .unwrap();

        let mut result = ResultMap::new();
        let err = registry
            .build_out_into(consumer, &mut result, &BuildOptions::default())
            .unwrap_err();

        match err {
            FlagError::CircularDependency { stage, producers, flags } => {
                assert_eq!(stage, CycleStage::Scheduling);
                assert_eq!(producers, vec!["orphan", "consumer"]);
                assert_eq!(flags, ghost | orphan);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(keys(&result), HashSet::from(["base"]));
        assert!(logs_contain("Pass 1: executed 1, blocked 2"));
        assert!(logs_contain("Pass 2 made no progress with 2 producer(s) queued"));
    }

    #[test]
    fn test_failed_producer_stays_queued() {
        let flags = FlagSet::allocate(["OK", "BAD", "LATER"]).unwrap();
        let ok = flags.get("OK").unwrap();
        let bad = flags.get("BAD").unwrap();
        let later = flags.get("LATER").unwrap();

        let mut registry = Registry::new();
        let _ = registry
            .register(&Producer::new("ok", |_| Ok(json!(1))), Registration::new(ok).key("ok"))
            .unwrap();
        let _ = registry
            .register(&Producer::new("bad", |_| Err("denied".into())), Registration::new(bad).key("bad"))
            .unwrap();
        let _ = registry
            .register(&Producer::new("later", |_| Ok(json!(3))), Registration::new(later).key("later"))
            .unwrap();

        let mut scheduler = Scheduler::new(&registry, flags.all()).unwrap();
        let mut result = ResultMap::new();
        let err = scheduler.run_pass(&mut result, &BuildOptions::default()).unwrap_err();

        assert!(matches!(err, FlagError::Producer { ref producer, .. } if producer == "bad"));
        assert_eq!(scheduler.pending(), 2);
        assert_eq!(scheduler.executed(), ok);
        assert_eq!(keys(&result), HashSet::from(["ok"]));
    }

    #[test]
    fn test_return_arity_is_checked() {
        let flags = FlagSet::allocate(["A", "B"]).unwrap();
        let both = [flags.get("A").unwrap(), flags.get("B").unwrap()];

        let mut short = Registry::new();
        let _ = short
            .register(&Producer::new("short", |_| Ok(json!(["only"]))), Registration::multi(both).keys(["a", "b"]))
            .unwrap();
        let err = short.build_out(flags.all(), &BuildOptions::default()).unwrap_err();
        assert!(matches!(err, FlagError::ReturnArity { expected: 2, found: 1, .. }));

        let mut scalar = Registry::new();
        let _ = scalar
            .register(&Producer::new("scalar", |_| Ok(json!("x"))), Registration::multi(both).keys(["a", "b"]))
            .unwrap();
        let err = scalar.build_out(flags.all(), &BuildOptions::default()).unwrap_err();
        assert!(matches!(err, FlagError::ReturnArity { expected: 2, found: 1, .. }));
    }

    #[test]
    fn test_keyless_entry_requires_mapping() {
        let flags = FlagSet::allocate(["A"]).unwrap();
        let mut registry = Registry::new();
        let _ = registry
            .register(&Producer::new("scalar", |_| Ok(json!(42))), Registration::new(flags.get("A").unwrap()))
            .unwrap();

        let err = registry.build_out(flags.all(), &BuildOptions::default()).unwrap_err();
        assert!(matches!(err, FlagError::NotAMapping { ref producer, .. } if producer == "scalar"));
    }
}

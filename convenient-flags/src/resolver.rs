//! Transitive dependency expansion over flag-declared edges.
//!
//! Dependencies name flags, not producers. Following an edge means asking the
//! whole registry which producers carry one of the wanted flags.

use crate::error::{CycleStage, FlagError, FlagResult};
use crate::flags::FlagMask;
use crate::registry::{Producer, ProducerId, Registry};
use std::collections::HashMap;

/// Expands requested masks with everything they transitively depend on.
#[derive(Debug, Clone, Copy)]
pub struct DependencyResolver<'r> {
    registry: &'r Registry,
}

impl<'r> DependencyResolver<'r> {
    /// Resolver over `registry`.
    #[must_use]
    pub fn new(registry: &'r Registry) -> Self {
        Self { registry }
    }

    /// `requested` plus the dependency closure of every producer it touches.
    ///
    /// # Errors
    ///
    /// Returns `FlagError::CircularDependency` if a touched producer depends,
    /// directly or not, on itself.
    pub fn expand(&self, requested: FlagMask) -> FlagResult<FlagMask> {
        let mut closures = HashMap::new();
        let mut expanded = requested;

        for id in self.registry.matching_ids(requested) {
            let mut path = vec![id];
            expanded |= self.closure(id, &mut path, &mut closures)?;
        }

        tracing::debug!("Expanded request {} to {}", requested, expanded);
        Ok(expanded)
    }

    /// Every flag `producer` needs executed before it can run, transitively.
    ///
    /// An unregistered producer has no dependencies.
    ///
    /// # Errors
    ///
    /// Returns `FlagError::CircularDependency` if the chain revisits a producer.
    pub fn dependency_closure(&self, producer: &Producer) -> FlagResult<FlagMask> {
        match self.registry.id_of(producer) {
            Some(id) => self.closure(id, &mut vec![id], &mut HashMap::new()),
            None => Ok(FlagMask::NONE),
        }
    }

    // `path` holds the producers on the current chain only; finished subtrees
    // are popped before siblings are visited.
    fn closure(
        &self,
        id: ProducerId,
        path: &mut Vec<ProducerId>,
        closures: &mut HashMap<ProducerId, FlagMask>,
    ) -> FlagResult<FlagMask> {
        if let Some(&done) = closures.get(&id) {
            return Ok(done);
        }

        let mut dependencies = self.registry.slot(id).method_dependencies();
        let providers: Vec<ProducerId> = self.registry.matching_ids(dependencies).collect();

        for provider in providers {
            if let Some(start) = path.iter().position(|&on_path| on_path == provider) {
                return Err(self.cycle(&path[start..], dependencies));
            }
            path.push(provider);
            dependencies |= self.closure(provider, path, closures)?;
            let _ = path.pop();
        }

        let _ = closures.insert(id, dependencies);
        Ok(dependencies)
    }

    fn cycle(&self, members: &[ProducerId], flags: FlagMask) -> FlagError {
        let mut producers: Vec<String> = members.iter().map(|&id| self.registry.name(id)).collect();
        if let Some(&first) = members.first() {
            producers.push(self.registry.name(first));
        }
        FlagError::CircularDependency {
            stage: CycleStage::Expansion,
            producers,
            flags,
        }
    }
}

impl Registry {
    /// Shorthand for [`DependencyResolver::expand`].
    ///
    /// # Errors
    ///
    /// See [`DependencyResolver::expand`].
    pub fn expand(&self, requested: FlagMask) -> FlagResult<FlagMask> {
        DependencyResolver::new(self).expand(requested)
    }

    /// Shorthand for [`DependencyResolver::dependency_closure`].
    ///
    /// # Errors
    ///
    /// See [`DependencyResolver::dependency_closure`].
    pub fn dependency_closure(&self, producer: &Producer) -> FlagResult<FlagMask> {
        DependencyResolver::new(self).dependency_closure(producer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::FlagSet;
    use crate::registry::Registration;
    use serde_json::Value;

    fn noop(name: &str) -> Producer {
        Producer::new(name, |_| Ok(Value::Null))
    }

    #[test]
    fn test_validate_flags() {
        let flags = FlagSet::allocate(["ONE", "TWO", "THREE", "FOUR"]).unwrap();
        let one = flags.get("ONE").unwrap();
        let two = flags.get("TWO").unwrap();
        let three = flags.get("THREE").unwrap();
        let four = flags.get("FOUR").unwrap();

        let mut registry = Registry::new();
        let method_four = noop("method_four");
        let _ = registry.register(&noop("method_one"), Registration::new(one).key("one")).unwrap();
        let _ = registry
            .register(&noop("method_two"), Registration::new(two).key("two").depends_on(one))
            .unwrap();
        let _ = registry.register(&noop("method_three"), Registration::new(three).key("three")).unwrap();
        let _ = registry
            .register(&method_four, Registration::new(four).key("four").depends_on(two))
            .unwrap();

        assert_eq!(registry.dependency_closure(&method_four).unwrap(), one | two);

        // FOUR needs TWO, which needs ONE
        assert_eq!(registry.expand(four).unwrap(), one | two | four);
        assert_eq!(registry.expand(three).unwrap(), three);
        assert_eq!(registry.expand(two).unwrap(), one | two);
        assert_eq!(registry.expand(FlagMask::NONE).unwrap(), FlagMask::NONE);
    }

    #[test]
    fn test_circular() {
        let flags = FlagSet::allocate(["ONE", "TWO"]).unwrap();
        let one = flags.get("ONE").unwrap();
        let two = flags.get("TWO").unwrap();

        let mut registry = Registry::new();
        let method_two = noop("method_two");
        let _ = registry
            .register(&noop("method_one"), Registration::new(one).key("one").depends_on(two))
            .unwrap();
        let _ = registry
            .register(&method_two, Registration::new(two).key("two").depends_on(one))
            .unwrap();

        let err = registry.dependency_closure(&method_two).unwrap_err();
        match err {
            FlagError::CircularDependency { stage, producers, .. } => {
                assert_eq!(stage, CycleStage::Expansion);
                assert_eq!(producers, vec!["method_two", "method_one", "method_two"]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(registry.expand(one).unwrap_err().is_circular());
    }

    #[test]
    fn test_self_dependency() {
        let flags = FlagSet::allocate(["LOOP"]).unwrap();
        let looped = flags.get("LOOP").unwrap();
        let mut registry = Registry::new();
        let _ = registry
            .register(&noop("ouroboros"), Registration::new(looped).depends_on(looped))
            .unwrap();

        assert!(registry.expand(looped).unwrap_err().is_circular());
    }

    #[test]
    fn test_shared_ancestor_is_not_a_cycle() {
        // root <- left <- top, root <- right <- top
        let flags = FlagSet::allocate(["ROOT", "LEFT", "RIGHT", "TOP"]).unwrap();
        let root = flags.get("ROOT").unwrap();
        let left = flags.get("LEFT").unwrap();
        let right = flags.get("RIGHT").unwrap();
        let top = flags.get("TOP").unwrap();

        let mut registry = Registry::new();
        let _ = registry.register(&noop("root"), Registration::new(root)).unwrap();
        let _ = registry
            .register(&noop("left"), Registration::new(left).depends_on(root))
            .unwrap();
        let _ = registry
            .register(&noop("right"), Registration::new(right).depends_on(root))
            .unwrap();
        let _ = registry
            .register(&noop("top"), Registration::new(top).depends_on(left | right))
            .unwrap();

        assert_eq!(registry.expand(top).unwrap(), flags.all());
        assert_eq!(registry.expand(left | right).unwrap(), root | left | right);
    }

    #[test]
    fn test_unregistered_dependency_is_kept() {
        let flags = FlagSet::allocate(["A", "GHOST"]).unwrap();
        let a = flags.get("A").unwrap();
        let ghost = flags.get("GHOST").unwrap();
        let mut registry = Registry::new();
        let _ = registry
            .register(&noop("a"), Registration::new(a).depends_on(ghost))
            .unwrap();

        assert_eq!(registry.expand(a).unwrap(), a | ghost);
        assert_eq!(registry.dependency_closure(&noop("unknown")).unwrap(), FlagMask::NONE);
    }
}

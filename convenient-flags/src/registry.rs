//! Producer registration and the entry table.

use crate::error::{BoxError, FlagError, FlagResult};
use crate::flags::FlagMask;
use crate::invocation::Invocation;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

type ProducerFn = dyn Fn(&Invocation<'_>) -> Result<Value, BoxError> + Send + Sync;

/// A registered callable.
///
/// Identity follows the callable, not the name: clones of one `Producer`
/// are the same producer, two `Producer::new` calls never are.
#[derive(Clone)]
pub struct Producer {
    name: Arc<str>,
    func: Arc<ProducerFn>,
}

impl Producer {
    /// Wrap a callable. `name` only shows up in logs and errors.
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&Invocation<'_>) -> Result<Value, BoxError> + Send + Sync + 'static,
    {
        Self {
            name: Arc::from(name.into()),
            func: Arc::new(func),
        }
    }

    /// Diagnostic name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True when both handles refer to the same registration target.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.func, &other.func)
    }

    pub(crate) fn call(&self, invocation: &Invocation<'_>) -> Result<Value, BoxError> {
        (self.func)(invocation)
    }
}

impl fmt::Debug for Producer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer").field("name", &self.name).finish_non_exhaustive()
    }
}

/// Producer index in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProducerId(usize);

impl ProducerId {
    /// Position in registration order.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ProducerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Producer({})", self.0)
    }
}

/// One declared output of a producer.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Entry {
    /// Flag gating this output.
    pub flag: FlagMask,
    /// Result key; `None` merges a mapping into the top level.
    pub key: Option<String>,
    /// Flags that must be executed before the producer runs.
    pub depends_on: FlagMask,
    /// Position of this output in the producer's return value.
    pub return_index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Keys {
    Unset,
    One(String),
    Many(Vec<Option<String>>),
}

/// Arguments of one [`Registry::register`] call.
///
/// # Example
///
/// ```
/// use convenient_flags::{FlagSet, Registration};
///
/// let flags = FlagSet::allocate(["GRANTS", "OWNER", "POLICY"]).unwrap();
/// let grants = Registration::multi([flags.get("GRANTS").unwrap(), flags.get("OWNER").unwrap()])
///     .keys(["grants", "owner"])
///     .depends_on(flags.get("POLICY").unwrap());
/// # let _ = grants;
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    flags: Vec<FlagMask>,
    keys: Keys,
    depends_on: FlagMask,
}

impl Registration {
    /// A single output gated by `flag`.
    #[must_use]
    pub fn new(flag: FlagMask) -> Self {
        Self::multi([flag])
    }

    /// One output per flag, in order.
    #[must_use]
    pub fn multi(flags: impl IntoIterator<Item = FlagMask>) -> Self {
        Self {
            flags: flags.into_iter().collect(),
            keys: Keys::Unset,
            depends_on: FlagMask::NONE,
        }
    }

    /// Key for a single-output registration.
    #[must_use]
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.keys = Keys::One(key.into());
        self
    }

    /// One key per flag, in order.
    #[must_use]
    pub fn keys<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.keys = Keys::Many(keys.into_iter().map(|key| Some(key.into())).collect());
        self
    }

    /// One optional key per flag; `None` positions merge into the top level.
    #[must_use]
    pub fn keys_optional(mut self, keys: impl IntoIterator<Item = Option<String>>) -> Self {
        self.keys = Keys::Many(keys.into_iter().collect());
        self
    }

    /// Dependencies shared by every output of this registration.
    #[must_use]
    pub fn depends_on(mut self, depends_on: FlagMask) -> Self {
        self.depends_on = depends_on;
        self
    }

    fn into_entries(self) -> FlagResult<Vec<Entry>> {
        if self.flags.is_empty() {
            return Err(FlagError::Configuration(
                "registration declares no flags".to_string(),
            ));
        }
        if let Some(position) = self.flags.iter().position(|flag| flag.is_empty()) {
            return Err(FlagError::Configuration(format!(
                "flag at position {position} is empty"
            )));
        }

        let keys = match self.keys {
            Keys::Unset => vec![None; self.flags.len()],
            Keys::One(key) if self.flags.len() == 1 => vec![Some(key)],
            Keys::One(_) => {
                return Err(FlagError::Configuration(format!(
                    "1 key given for {} flags",
                    self.flags.len()
                )));
            }
            Keys::Many(keys) if keys.len() == self.flags.len() => keys,
            Keys::Many(keys) => {
                return Err(FlagError::Configuration(format!(
                    "{} keys given for {} flags",
                    keys.len(),
                    self.flags.len()
                )));
            }
        };

        let depends_on = self.depends_on;
        Ok(self
            .flags
            .into_iter()
            .zip(keys)
            .enumerate()
            .map(|(return_index, (flag, key))| Entry {
                flag,
                key,
                depends_on,
                return_index,
            })
            .collect())
    }
}

/// A producer and everything registered for it.
#[derive(Debug, Clone)]
pub(crate) struct Slot {
    pub(crate) producer: Producer,
    pub(crate) entries: Vec<Entry>,
}

impl Slot {
    pub(crate) fn method_flag(&self) -> FlagMask {
        self.entries
            .iter()
            .fold(FlagMask::NONE, |acc, entry| acc | entry.flag)
    }

    pub(crate) fn method_dependencies(&self) -> FlagMask {
        self.entries
            .iter()
            .fold(FlagMask::NONE, |acc, entry| acc | entry.depends_on)
    }
}

/// Table of producers and their entries, in registration order.
///
/// Built during setup, then only read. Sharing one registry between
/// threads is fine; every build-out keeps its own state.
///
/// # Example
///
/// ```
/// use convenient_flags::{BuildOptions, FlagSet, Producer, Registration, Registry};
/// use serde_json::json;
///
/// let flags = FlagSet::allocate(["PEOPLE", "GREETING"]).unwrap();
/// let people = flags.get("PEOPLE").unwrap();
/// let greeting = flags.get("GREETING").unwrap();
///
/// let mut registry = Registry::new();
/// registry
///     .register(
///         &Producer::new("people", |_| Ok(json!(["simon", "george"]))),
///         Registration::new(people).key("people"),
///     )
///     .unwrap();
/// registry
///     .register(
///         &Producer::new("greeting", |call| {
///             let people = call.snapshot().and_then(|s| s.get("people")).cloned();
///             Ok(json!(format!("hello {}", people.unwrap_or_default())))
///         }),
///         Registration::new(greeting).key("greeting").depends_on(people),
///     )
///     .unwrap();
///
/// let result = registry.build_out(greeting, &BuildOptions::default()).unwrap();
/// assert!(result.contains_key("people"));
/// assert!(result.contains_key("greeting"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Registry {
    slots: Vec<Slot>,
}

impl Registry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self { slots: Vec::new() }
    }

    /// Register `producer` for the outputs described by `registration`.
    ///
    /// Registering the same producer again appends entries; its
    /// `return_index` values restart at 0 for the new call.
    ///
    /// # Errors
    ///
    /// Returns `FlagError::Configuration` if the flags and keys differ in
    /// length, or no usable flag was given.
    pub fn register(&mut self, producer: &Producer, registration: Registration) -> FlagResult<ProducerId> {
        let entries = registration.into_entries()?;

        let id = match self.id_of(producer) {
            Some(id) => id,
            None => {
                self.slots.push(Slot {
                    producer: producer.clone(),
                    entries: Vec::new(),
                });
                ProducerId(self.slots.len() - 1)
            }
        };

        tracing::trace!(
            "Registered {} entr{} for '{}' ({})",
            entries.len(),
            if entries.len() == 1 { "y" } else { "ies" },
            producer.name(),
            id
        );
        self.slots[id.0].entries.extend(entries);
        Ok(id)
    }

    /// Id of a registered producer.
    #[must_use]
    pub fn id_of(&self, producer: &Producer) -> Option<ProducerId> {
        self.slots
            .iter()
            .position(|slot| slot.producer.same_as(producer))
            .map(ProducerId)
    }

    /// Entries of a registered producer.
    #[must_use]
    pub fn entries(&self, producer: &Producer) -> Option<&[Entry]> {
        self.id_of(producer).map(|id| self.slots[id.0].entries.as_slice())
    }

    /// Union of the producer's entry flags; `NONE` if unregistered.
    #[must_use]
    pub fn method_flag(&self, producer: &Producer) -> FlagMask {
        self.id_of(producer)
            .map_or(FlagMask::NONE, |id| self.slots[id.0].method_flag())
    }

    /// Union of the producer's dependency masks; `NONE` if unregistered.
    #[must_use]
    pub fn method_dependencies(&self, producer: &Producer) -> FlagMask {
        self.id_of(producer)
            .map_or(FlagMask::NONE, |id| self.slots[id.0].method_dependencies())
    }

    /// Producers whose flags intersect `mask`, in registration order.
    #[must_use]
    pub fn find_producers_matching(&self, mask: FlagMask) -> Vec<&Producer> {
        self.matching_ids(mask)
            .map(|id| &self.slots[id.0].producer)
            .collect()
    }

    /// Registered producers in registration order.
    pub fn producers(&self) -> impl Iterator<Item = &Producer> {
        self.slots.iter().map(|slot| &slot.producer)
    }

    /// Producer behind an id.
    #[must_use]
    pub fn producer(&self, id: ProducerId) -> Option<&Producer> {
        self.slots.get(id.0).map(|slot| &slot.producer)
    }

    /// Number of registered producers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub(crate) fn slot(&self, id: ProducerId) -> &Slot {
        &self.slots[id.0]
    }

    pub(crate) fn ids(&self) -> impl Iterator<Item = ProducerId> + '_ {
        (0..self.slots.len()).map(ProducerId)
    }

    pub(crate) fn matching_ids(&self, mask: FlagMask) -> impl Iterator<Item = ProducerId> + '_ {
        self.ids()
            .filter(move |id| self.slots[id.0].method_flag().intersects(mask))
    }

    pub(crate) fn name(&self, id: ProducerId) -> String {
        self.slots[id.0].producer.name().to_string()
    }
}

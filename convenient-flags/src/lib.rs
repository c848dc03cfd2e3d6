//! Flag-driven producer registry.
//!
//! Callers ask for a subset of named features as a bitmask. The registry runs
//! exactly the producers backing those features, plus whatever they
//! transitively depend on, each once and in dependency order, and collects
//! their outputs into a single result mapping.
//!
//! # Features
//!
//! - One bit per named flag, with synthetic `ALL` and `NONE` members
//! - Multi-output producers, one entry per output flag
//! - Dependencies declared as flags, resolved against the whole registry
//! - Static cycle detection during expansion, and a deadlock check per pass
//! - Optional serde support
//!
//! # Example
//!
//! ```
//! use convenient_flags::{BuildOptions, FlagSet, Producer, Registration, Registry};
//! use serde_json::json;
//!
//! let flags = FlagSet::allocate(["PEOPLE", "HOBBIES"]).unwrap();
//! let people = flags.get("PEOPLE").unwrap();
//! let hobbies = flags.get("HOBBIES").unwrap();
//!
//! let mut registry = Registry::new();
//! registry
//!     .register(
//!         &Producer::new("people", |_| Ok(json!({"simon": "123", "george": "234"}))),
//!         Registration::new(people).key("people"),
//!     )
//!     .unwrap();
//! registry
//!     .register(
//!         &Producer::new("hobbies", |call| {
//!             let known = call.snapshot().map_or(0, |s| s["people"].as_object().map_or(0, |p| p.len()));
//!             Ok(json!(known))
//!         }),
//!         Registration::new(hobbies).key("hobbies").depends_on(people),
//!     )
//!     .unwrap();
//!
//! // Asking for HOBBIES pulls in PEOPLE first.
//! let result = registry.build_out(hobbies, &BuildOptions::default()).unwrap();
//! assert_eq!(result["people"], json!({"simon": "123", "george": "234"}));
//! assert_eq!(result["hobbies"], json!(2));
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![warn(unused_results)]

pub mod error;
pub mod flags;
pub mod invocation;
pub mod options;
pub mod registry;
pub mod resolver;
pub mod scheduler;

pub use error::{BoxError, CycleStage, FlagError, FlagResult};
pub use flags::{FlagMask, FlagSet, MAX_FLAGS};
pub use invocation::{Arg, Invocation, ResultMap};
pub use options::BuildOptions;
pub use registry::{Entry, Producer, ProducerId, Registration, Registry};
pub use resolver::DependencyResolver;
pub use scheduler::{BuildReport, PassReport, Scheduler};

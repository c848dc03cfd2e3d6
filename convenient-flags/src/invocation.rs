//! What a producer sees when it is called.

use serde_json::{Map, Value};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The mapping a build-out assembles.
pub type ResultMap = Map<String, Value>;

/// A positional argument forwarded to every producer.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Arg {
    /// A plain value, forwarded unchanged.
    Value(Value),
    /// Stands for the result being built. Replaced by the snapshot at each
    /// call, and suppresses the leading snapshot argument.
    ///
    /// Only this marker suppresses it. An `Arg::Value` equal to the current
    /// result is an ordinary argument, and the producer still gets the
    /// leading snapshot too.
    LiveResult,
}

impl From<Value> for Arg {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

/// Arguments of a single producer call.
#[derive(Debug, Clone)]
pub struct Invocation<'a> {
    producer: &'a str,
    args: Vec<Value>,
    kwargs: &'a ResultMap,
    snapshot_at: Option<usize>,
}

impl<'a> Invocation<'a> {
    /// Assemble the call. `snapshot` is the copy of the live result; it is
    /// prepended when `lead_with_snapshot` is set and substituted for every
    /// [`Arg::LiveResult`].
    pub(crate) fn new(
        producer: &'a str,
        snapshot: Option<ResultMap>,
        lead_with_snapshot: bool,
        extra: &[Arg],
        kwargs: &'a ResultMap,
    ) -> Self {
        let snapshot = snapshot.map(Value::Object);
        let mut args = Vec::with_capacity(extra.len() + 1);
        let mut snapshot_at = None;

        if lead_with_snapshot {
            if let Some(snapshot) = &snapshot {
                args.push(snapshot.clone());
                snapshot_at = Some(0);
            }
        }

        for arg in extra {
            match arg {
                Arg::Value(value) => args.push(value.clone()),
                Arg::LiveResult => {
                    let _ = snapshot_at.get_or_insert(args.len());
                    args.push(snapshot.clone().unwrap_or_else(|| Value::Object(Map::new())));
                }
            }
        }

        Self {
            producer,
            args,
            kwargs,
            snapshot_at,
        }
    }

    /// Name of the producer being called.
    #[must_use]
    pub fn producer(&self) -> &str {
        self.producer
    }

    /// Positional arguments, leading snapshot included.
    #[must_use]
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// Positional argument at `index`.
    #[must_use]
    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.args.get(index)
    }

    /// Keyword arguments.
    #[must_use]
    pub fn kwargs(&self) -> &ResultMap {
        self.kwargs
    }

    /// Keyword argument by name.
    #[must_use]
    pub fn kwarg(&self, name: &str) -> Option<&Value> {
        self.kwargs.get(name)
    }

    /// The snapshot of the result, if this call received one.
    #[must_use]
    pub fn snapshot(&self) -> Option<&ResultMap> {
        self.snapshot_at
            .and_then(|index| self.args.get(index))
            .and_then(Value::as_object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn seed() -> ResultMap {
        let mut map = ResultMap::new();
        let _ = map.insert("hello".to_string(), json!("goodbye"));
        map
    }

    #[test]
    fn test_leading_snapshot() {
        let kwargs = ResultMap::new();
        let extra = [Arg::Value(json!(7))];
        let call = Invocation::new("p", Some(seed()), true, &extra, &kwargs);

        assert_eq!(call.args().len(), 2);
        assert_eq!(call.arg(0), Some(&json!({"hello": "goodbye"})));
        assert_eq!(call.arg(1), Some(&json!(7)));
        assert_eq!(call.snapshot().and_then(|s| s.get("hello")), Some(&json!("goodbye")));
    }

    #[test]
    fn test_live_result_substituted_in_place() {
        let kwargs = ResultMap::new();
        let extra = [Arg::Value(json!("first")), Arg::LiveResult];
        let call = Invocation::new("p", Some(seed()), false, &extra, &kwargs);

        assert_eq!(call.args().len(), 2);
        assert_eq!(call.arg(0), Some(&json!("first")));
        assert_eq!(call.arg(1), Some(&json!({"hello": "goodbye"})));
        assert!(call.snapshot().is_some());
    }

    #[test]
    fn test_plain_call_has_no_snapshot() {
        let mut kwargs = ResultMap::new();
        let _ = kwargs.insert("region".to_string(), json!("us-east-1"));
        let call = Invocation::new("p", None, false, &[], &kwargs);

        assert!(call.args().is_empty());
        assert!(call.snapshot().is_none());
        assert_eq!(call.kwarg("region"), Some(&json!("us-east-1")));
        assert_eq!(call.producer(), "p");
    }
}

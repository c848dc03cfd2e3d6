//! Demo registry wired up by the command line tool.

use convenient_flags::{
    BoxError, FlagResult, FlagSet, Invocation, Producer, Registration, Registry, ResultMap,
};
use serde_json::{Value, json};

/// Flags known to the demo registry, in bit order.
pub const DEMO_FLAGS: [&str; 6] = [
    "PEOPLE",
    "HOBBIES",
    "PETS",
    "FARM_ANIMALS",
    "WILD_ANIMALS",
    "GREETING",
];

fn people(_: &Invocation<'_>) -> Result<Value, BoxError> {
    Ok(json!({"simon": "123", "george": "234"}))
}

fn hobbies(call: &Invocation<'_>) -> Result<Value, BoxError> {
    let catalogue = json!({
        "123": ["mountain biking", "skiing"],
        "234": ["snail collecting", "roaring like a dinosaur"],
    });
    let people = call
        .snapshot()
        .and_then(|snapshot| snapshot.get("people"))
        .and_then(Value::as_object)
        .ok_or("people missing from snapshot")?;

    let mut hobbies = ResultMap::new();
    for (person, uid) in people {
        let found = uid
            .as_str()
            .and_then(|uid| catalogue.get(uid))
            .cloned()
            .unwrap_or(Value::Null);
        let _ = hobbies.insert(person.clone(), found);
    }
    Ok(Value::Object(hobbies))
}

fn animals(_: &Invocation<'_>) -> Result<Value, BoxError> {
    Ok(json!(["cat", "pig", "rhino"]))
}

// Keyless: the returned mapping lands in the top level.
fn greeting(call: &Invocation<'_>) -> Result<Value, BoxError> {
    let salutation = call
        .kwarg("salutation")
        .and_then(Value::as_str)
        .unwrap_or("hello");
    let mut names: Vec<&str> = call
        .snapshot()
        .and_then(|snapshot| snapshot.get("people"))
        .and_then(Value::as_object)
        .map(|people| people.keys().map(String::as_str).collect())
        .unwrap_or_default();
    names.sort_unstable();
    Ok(json!({"greeting": format!("{salutation} {}", names.join(" and "))}))
}

/// Allocate the demo flags and register the demo producers.
///
/// # Errors
///
/// Only fails if the demo declarations themselves are inconsistent.
pub fn demo_registry() -> FlagResult<(FlagSet, Registry)> {
    let flags = FlagSet::allocate(DEMO_FLAGS)?;
    let mut registry = Registry::new();

    let _ = registry.register(
        &Producer::new("people", people),
        Registration::new(flags.get("PEOPLE")?).key("people"),
    )?;
    let _ = registry.register(
        &Producer::new("hobbies", hobbies),
        Registration::new(flags.get("HOBBIES")?)
            .key("hobbies")
            .depends_on(flags.get("PEOPLE")?),
    )?;
    let _ = registry.register(
        &Producer::new("animals", animals),
        Registration::multi([
            flags.get("PETS")?,
            flags.get("FARM_ANIMALS")?,
            flags.get("WILD_ANIMALS")?,
        ])
        .keys(["pets", "farm", "wild"]),
    )?;
    let _ = registry.register(
        &Producer::new("greeting", greeting),
        Registration::new(flags.get("GREETING")?).depends_on(flags.get("PEOPLE")?),
    )?;

    Ok((flags, registry))
}

/*!
 * Storage schema helpers
 *
 * Field-exclusion policy, serializability pre-check and the shape rules a
 * decoded result has to satisfy.
 */

use std::borrow::Cow;
use tracing::debug;

use crate::result::{ObjectiveCallable, OptimizeResult, SpecValue};
use crate::storage::error::{DecodeError, DecodeResult, EncodeError, EncodeResult};

/// The view of `result` that actually gets written.
///
/// Borrows the caller's result unless the callable has to be dropped and is
/// actually there; in that case only the run specification is rebuilt and
/// every other field is shared with the original.
pub fn prepare_for_storage(result: &OptimizeResult, include_callable: bool) -> Cow<'_, OptimizeResult> {
    if include_callable || !result.specs.has_callable_key() {
        return Cow::Borrowed(result);
    }

    debug!(
        "dropping callable from run specification ({} args)",
        result.specs.args.len()
    );
    Cow::Owned(result.with_specs(result.specs.without_callable()))
}

/// Fail on the first value that has no byte representation, naming where
/// it sits in the result.
pub fn check_serializable(result: &OptimizeResult) -> EncodeResult<()> {
    for (key, value) in &result.specs.args {
        check_value(&format!("specs.args.{}", key), value)?;
    }
    if let Some(metadata) = &result.metadata {
        for (key, value) in metadata.iter() {
            check_value(&format!("metadata.{}", key), value)?;
        }
    }
    Ok(())
}

fn check_value(path: &str, value: &SpecValue) -> EncodeResult<()> {
    match value {
        SpecValue::Callable(ObjectiveCallable::NotSerializable(native)) => {
            Err(EncodeError::unserializable(
                path,
                format!(
                    "callable `{}` wraps live state with no byte form",
                    native.description()
                ),
            ))
        }
        SpecValue::List(items) => items
            .iter()
            .enumerate()
            .try_for_each(|(i, item)| check_value(&format!("{}[{}]", path, i), item)),
        SpecValue::Map(entries) => entries
            .iter()
            .try_for_each(|(key, item)| check_value(&format!("{}.{}", path, key), item)),
        _ => Ok(()),
    }
}

fn shape_error(result: &OptimizeResult) -> Option<String> {
    if result.x_iters.len() != result.func_vals.len() {
        return Some(format!(
            "{} evaluated points but {} observed values",
            result.x_iters.len(),
            result.func_vals.len()
        ));
    }
    None
}

pub fn validate_for_encode(result: &OptimizeResult) -> EncodeResult<()> {
    match shape_error(result) {
        Some(reason) => Err(EncodeError::MalformedResult(reason)),
        None => Ok(()),
    }
}

pub fn validate_decoded(result: &OptimizeResult) -> DecodeResult<()> {
    match shape_error(result) {
        Some(reason) => Err(DecodeError::schema(reason)),
        None => Ok(()),
    }
}

/// Locations of every opaque callable carried by `result`
pub fn callable_locations(result: &OptimizeResult) -> Vec<(String, ObjectiveCallable)> {
    let mut found = Vec::new();
    for (key, value) in &result.specs.args {
        collect_callables(&format!("specs.args.{}", key), value, &mut found);
    }
    if let Some(metadata) = &result.metadata {
        for (key, value) in metadata.iter() {
            collect_callables(&format!("metadata.{}", key), value, &mut found);
        }
    }
    found
}

fn collect_callables(path: &str, value: &SpecValue, found: &mut Vec<(String, ObjectiveCallable)>) {
    match value {
        SpecValue::Callable(callable @ ObjectiveCallable::Opaque(_)) => {
            found.push((path.to_string(), callable.clone()));
        }
        SpecValue::List(items) => {
            for (i, item) in items.iter().enumerate() {
                collect_callables(&format!("{}[{}]", path, i), item, found);
            }
        }
        SpecValue::Map(entries) => {
            for (key, item) in entries {
                collect_callables(&format!("{}.{}", path, key), item, found);
            }
        }
        _ => {}
    }
}

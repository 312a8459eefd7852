/*!
 * Objective callable capability
 *
 * The objective function lives in the run specification as a tagged value:
 * explicitly empty, an opaque serializable payload, or a live in-process
 * callable that can be invoked but never written out.
 */

use serde::de::Deserializer;
use serde::ser::{Error as _, Serializer};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use super::types::ParamValue;
use crate::storage::error::{EncodeError, ResolveError};

/// Something that maps a point of the search space to an objective value.
pub trait Objective: Send + Sync {
    fn evaluate(&self, point: &[ParamValue]) -> f64;
}

impl<F> Objective for F
where
    F: Fn(&[ParamValue]) -> f64 + Send + Sync,
{
    fn evaluate(&self, point: &[ParamValue]) -> f64 {
        self(point)
    }
}

/// An objective that can describe itself as `(kind, payload)` bytes.
///
/// `kind` selects the factory in an `ObjectiveRegistry` that rebuilds it.
pub trait PersistableObjective: Objective {
    fn kind(&self) -> &str;

    /// Fails when the objective holds state that has no byte form.
    fn to_payload(&self) -> Result<Vec<u8>, String>;
}

/// Serializable form of an objective: a registry kind plus opaque bytes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpaqueCallable {
    pub kind: String,
    pub payload: Vec<u8>,
}

/// A live callable that cannot be converted to bytes, such as a closure
/// over a connection to an external worker process
#[derive(Clone)]
pub struct NativeCallable {
    description: String,
    handle: Arc<dyn Objective>,
}

impl NativeCallable {
    pub fn new(description: impl Into<String>, handle: Arc<dyn Objective>) -> Self {
        Self {
            description: description.into(),
            handle,
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn evaluate(&self, point: &[ParamValue]) -> f64 {
        self.handle.evaluate(point)
    }
}

impl fmt::Debug for NativeCallable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeCallable")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

impl PartialEq for NativeCallable {
    fn eq(&self, other: &Self) -> bool {
        Arc::as_ptr(&self.handle) as *const () == Arc::as_ptr(&other.handle) as *const ()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ObjectiveCallable {
    /// Present but explicitly empty
    Absent,
    Opaque(OpaqueCallable),
    NotSerializable(NativeCallable),
}

impl ObjectiveCallable {
    pub fn opaque(kind: impl Into<String>, payload: Vec<u8>) -> Self {
        Self::Opaque(OpaqueCallable {
            kind: kind.into(),
            payload,
        })
    }

    pub fn native(description: impl Into<String>, handle: Arc<dyn Objective>) -> Self {
        Self::NotSerializable(NativeCallable::new(description, handle))
    }

    /// Capture a persistable objective as opaque bytes.
    pub fn capture(objective: &dyn PersistableObjective) -> Result<Self, EncodeError> {
        let payload = objective
            .to_payload()
            .map_err(|reason| EncodeError::unserializable(objective.kind(), reason))?;
        Ok(Self::opaque(objective.kind(), payload))
    }

    pub fn is_serializable(&self) -> bool {
        !matches!(self, Self::NotSerializable(_))
    }
}

// Wire shape. `NotSerializable` has no representation on purpose.
#[derive(Serialize)]
#[serde(rename = "ObjectiveCallable")]
enum StoredCallableRef<'a> {
    Absent,
    Opaque(&'a OpaqueCallable),
}

#[derive(Deserialize)]
#[serde(rename = "ObjectiveCallable")]
enum StoredCallable {
    Absent,
    Opaque(OpaqueCallable),
}

impl Serialize for ObjectiveCallable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Absent => StoredCallableRef::Absent.serialize(serializer),
            Self::Opaque(callable) => StoredCallableRef::Opaque(callable).serialize(serializer),
            Self::NotSerializable(native) => Err(S::Error::custom(format!(
                "native callable `{}` has no byte representation",
                native.description()
            ))),
        }
    }
}

impl<'de> Deserialize<'de> for ObjectiveCallable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match StoredCallable::deserialize(deserializer)? {
            StoredCallable::Absent => Self::Absent,
            StoredCallable::Opaque(callable) => Self::Opaque(callable),
        })
    }
}

type ObjectiveFactory = Box<dyn Fn(&[u8]) -> Result<Arc<dyn Objective>, String> + Send + Sync>;

/// Rebuilds invocable objectives from decoded opaque payloads.
///
/// Only factories registered by the caller are ever run. Resolving a
/// callable read from an untrusted artifact hands control to whatever the
/// payload makes the factory build.
#[derive(Default)]
pub struct ObjectiveRegistry {
    factories: HashMap<String, ObjectiveFactory>,
}

impl ObjectiveRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, kind: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&[u8]) -> Result<Arc<dyn Objective>, String> + Send + Sync + 'static,
    {
        let kind = kind.into();
        debug!("registering objective factory: {}", kind);
        self.factories.insert(kind, Box::new(factory));
        self
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    pub fn resolve(&self, callable: &OpaqueCallable) -> Result<Arc<dyn Objective>, ResolveError> {
        let factory = self
            .factories
            .get(&callable.kind)
            .ok_or_else(|| ResolveError::UnknownKind {
                kind: callable.kind.clone(),
            })?;

        factory(&callable.payload).map_err(|reason| ResolveError::Rejected {
            kind: callable.kind.clone(),
            reason,
        })
    }
}

impl fmt::Debug for ObjectiveRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<&String> = self.factories.keys().collect();
        kinds.sort();
        f.debug_struct("ObjectiveRegistry")
            .field("kinds", &kinds)
            .finish()
    }
}

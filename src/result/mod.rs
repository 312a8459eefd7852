/*!
 * Optimization result model
 *
 * Typed representation of what an optimizer run hands to the storage layer:
 * the best point, the evaluation history, the search space and the run
 * specification, including the capability slot for the objective callable.
 */

pub mod callable;
pub mod types;

pub use callable::{
    NativeCallable, Objective, ObjectiveCallable, ObjectiveRegistry, OpaqueCallable,
    PersistableObjective,
};
pub use types::{
    Dimension, Metadata, OptimizeResult, OptimizeResultBuilder, ParamValue, Prior,
    RunSpecification, Space, SpecValue, CALLABLE_KEY,
};

/*!
 * Result data types
 *
 * `OptimizeResult` keeps its potentially large sequences behind `Arc` so the
 * storage layer can build a structural copy of the outer record without
 * touching the evaluation history.
 */

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::callable::ObjectiveCallable;

/// Key of the objective callable inside `RunSpecification::args`
pub const CALLABLE_KEY: &str = "func";

/// Auxiliary key/value data attached to a result
pub type Metadata = BTreeMap<String, SpecValue>;

/// A single coordinate of a point in the search space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParamValue {
    Real(f64),
    Integer(i64),
    Categorical(String),
}

impl ParamValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Real(v) => Some(*v),
            Self::Integer(v) => Some(*v as f64),
            Self::Categorical(_) => None,
        }
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Categorical(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Prior {
    Uniform,
    LogUniform,
}

/// One search-space dimension. Integer bounds are inclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Dimension {
    Real { low: f64, high: f64, prior: Prior },
    Integer { low: i64, high: i64 },
    Categorical { categories: Vec<String> },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Space {
    pub dimensions: Vec<Dimension>,
}

impl Space {
    pub fn new(dimensions: Vec<Dimension>) -> Self {
        Self { dimensions }
    }

    pub fn n_dims(&self) -> usize {
        self.dimensions.len()
    }
}

/// Value stored in a run specification or in result metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SpecValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    List(Vec<SpecValue>),
    Map(BTreeMap<String, SpecValue>),
    Callable(ObjectiveCallable),
}

impl SpecValue {
    pub fn as_callable(&self) -> Option<&ObjectiveCallable> {
        match self {
            Self::Callable(callable) => Some(callable),
            _ => None,
        }
    }
}

impl From<bool> for SpecValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for SpecValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for SpecValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for SpecValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for SpecValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<ObjectiveCallable> for SpecValue {
    fn from(value: ObjectiveCallable) -> Self {
        Self::Callable(value)
    }
}

/// The configuration an optimizer run was launched with
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSpecification {
    /// Name of the optimizer entry point, e.g. `forest_minimize`
    pub function: String,
    pub args: BTreeMap<String, SpecValue>,
}

impl RunSpecification {
    pub fn new(function: impl Into<String>) -> Self {
        Self {
            function: function.into(),
            args: BTreeMap::new(),
        }
    }

    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<SpecValue>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }

    /// Whether the `func` key exists at all, whatever its value
    pub fn has_callable_key(&self) -> bool {
        self.args.contains_key(CALLABLE_KEY)
    }

    /// The objective callable, if `func` holds one
    pub fn callable(&self) -> Option<&ObjectiveCallable> {
        self.args.get(CALLABLE_KEY).and_then(SpecValue::as_callable)
    }

    /// Take the `func` entry out in place.
    pub fn remove_callable(&mut self) -> Option<SpecValue> {
        self.args.remove(CALLABLE_KEY)
    }

    /// A new specification with every entry except `func`.
    ///
    /// Only this mapping is rebuilt; the cost is proportional to the number
    /// of arguments, not to the size of the result that embeds it.
    pub fn without_callable(&self) -> Self {
        let args = self
            .args
            .iter()
            .filter(|(key, _)| key.as_str() != CALLABLE_KEY)
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Self {
            function: self.function.clone(),
            args,
        }
    }
}

/// Outcome of an optimization run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizeResult {
    /// Objective value at the optimum
    pub fun: f64,
    /// Location of the optimum
    pub x: Arc<Vec<ParamValue>>,
    /// Every evaluated point, in evaluation order
    pub x_iters: Arc<Vec<Vec<ParamValue>>>,
    /// Observed objective value for each entry of `x_iters`
    pub func_vals: Arc<Vec<f64>>,
    #[serde(default)]
    pub space: Arc<Space>,
    pub specs: RunSpecification,
    #[serde(default)]
    pub metadata: Option<Arc<Metadata>>,
}

impl OptimizeResult {
    pub fn builder(function: impl Into<String>) -> OptimizeResultBuilder {
        OptimizeResultBuilder::new(function)
    }

    pub fn n_evaluations(&self) -> usize {
        self.x_iters.len()
    }

    /// Structural copy carrying `specs` in place of the current
    /// specification. All other fields share storage with `self`.
    pub fn with_specs(&self, specs: RunSpecification) -> Self {
        Self {
            fun: self.fun,
            x: Arc::clone(&self.x),
            x_iters: Arc::clone(&self.x_iters),
            func_vals: Arc::clone(&self.func_vals),
            space: Arc::clone(&self.space),
            specs,
            metadata: self.metadata.clone(),
        }
    }
}

/// Assembles an `OptimizeResult` the way an optimizer loop produces one:
/// evaluations are appended one at a time and the optimum defaults to the
/// best observed value.
#[derive(Debug, Clone)]
pub struct OptimizeResultBuilder {
    fun: Option<f64>,
    x: Option<Vec<ParamValue>>,
    x_iters: Vec<Vec<ParamValue>>,
    func_vals: Vec<f64>,
    space: Space,
    specs: RunSpecification,
    metadata: Option<Metadata>,
}

impl OptimizeResultBuilder {
    pub fn new(function: impl Into<String>) -> Self {
        Self {
            fun: None,
            x: None,
            x_iters: Vec::new(),
            func_vals: Vec::new(),
            space: Space::default(),
            specs: RunSpecification::new(function),
            metadata: None,
        }
    }

    pub fn evaluation(mut self, point: Vec<ParamValue>, value: f64) -> Self {
        self.x_iters.push(point);
        self.func_vals.push(value);
        self
    }

    pub fn optimum(mut self, x: Vec<ParamValue>, fun: f64) -> Self {
        self.x = Some(x);
        self.fun = Some(fun);
        self
    }

    pub fn space(mut self, space: Space) -> Self {
        self.space = space;
        self
    }

    pub fn arg(mut self, key: impl Into<String>, value: impl Into<SpecValue>) -> Self {
        self.specs.args.insert(key.into(), value.into());
        self
    }

    pub fn objective(self, callable: ObjectiveCallable) -> Self {
        self.arg(CALLABLE_KEY, callable)
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<SpecValue>) -> Self {
        self.metadata
            .get_or_insert_with(Metadata::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> OptimizeResult {
        let (x, fun) = match (self.x, self.fun) {
            (Some(x), Some(fun)) => (x, fun),
            _ => best_observed(&self.x_iters, &self.func_vals),
        };

        OptimizeResult {
            fun,
            x: Arc::new(x),
            x_iters: Arc::new(self.x_iters),
            func_vals: Arc::new(self.func_vals),
            space: Arc::new(self.space),
            specs: self.specs,
            metadata: self.metadata.map(Arc::new),
        }
    }
}

fn best_observed(x_iters: &[Vec<ParamValue>], func_vals: &[f64]) -> (Vec<ParamValue>, f64) {
    func_vals
        .iter()
        .enumerate()
        .filter(|(_, v)| !v.is_nan())
        .min_by(|a, b| a.1.total_cmp(b.1))
        .and_then(|(i, v)| x_iters.get(i).map(|x| (x.clone(), *v)))
        .unwrap_or((Vec::new(), f64::NAN))
}

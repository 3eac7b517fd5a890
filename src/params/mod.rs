//! Parameter specifications and the values generated from them.

mod faker;
mod generator;
mod spec;
mod value;

pub use faker::{FakerFn, FakerRegistry};
pub use generator::ParameterGenerator;
pub use spec::{compile_parameters, normalize_name, ConcatPart, Parameter, ParameterSpec, ValueKind};
pub use value::{Coercion, ParamSet, ParamValue};

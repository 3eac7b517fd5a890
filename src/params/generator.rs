use chrono::Utc;
use rand::seq::SliceRandom;
use rand::Rng;

use super::faker::FakerRegistry;
use super::spec::{ConcatPart, Parameter, ValueKind};
use super::value::{ParamSet, ParamValue};
use crate::error::GenerationError;
use crate::rng::RandomSource;

/// Materializes parameter values. Shared by every simulated client; holds no
/// per-request state.
#[derive(Debug, Default)]
pub struct ParameterGenerator {
    faker: FakerRegistry,
    rng: RandomSource,
}

impl ParameterGenerator {
    pub fn new(faker: FakerRegistry, rng: RandomSource) -> Self {
        Self { faker, rng }
    }

    pub fn faker(&self) -> &FakerRegistry {
        &self.faker
    }

    /// Produces one value. `generated` holds the values already produced for
    /// the same unit, which `concat` parameters read from.
    pub fn generate(
        &self,
        param: &Parameter,
        generated: &ParamSet,
    ) -> Result<ParamValue, GenerationError> {
        let native = match &param.kind {
            ValueKind::RandomInt { start, end } => {
                ParamValue::Int(self.rng.with_rng(|rng| rng.gen_range(*start..=*end)))
            }
            ValueKind::RandomIntAsString { start, end } => ParamValue::Text(
                self.rng
                    .with_rng(|rng| rng.gen_range(*start..=*end))
                    .to_string(),
            ),
            ValueKind::Guid => {
                let bytes: [u8; 16] = self.rng.with_rng(|rng| rng.gen());
                ParamValue::Text(
                    uuid::Builder::from_random_bytes(bytes)
                        .into_uuid()
                        .hyphenated()
                        .to_string(),
                )
            }
            ValueKind::Date => ParamValue::Text(Utc::now().format("%Y-%m-%d").to_string()),
            ValueKind::DateTime => ParamValue::Timestamp(Utc::now()),
            ValueKind::DateTimeIso => ParamValue::Text(Utc::now().to_rfc3339()),
            ValueKind::Constant(value) => value.clone(),
            ValueKind::RandomList(values) => self
                .rng
                .with_rng(|rng| values.choose(rng).cloned())
                .unwrap_or(ParamValue::Null),
            ValueKind::RandomBool => ParamValue::Bool(self.rng.with_rng(|rng| rng.gen())),
            ValueKind::Faker(method) => self
                .rng
                .with_rng(|rng| self.faker.generate(method, rng))
                .ok_or_else(|| GenerationError::UnknownFakerMethod {
                    param: param.name.clone(),
                    method: method.clone(),
                })?,
            ValueKind::Concat(parts) => {
                let mut out = String::new();
                for part in parts {
                    match part {
                        ConcatPart::Literal(text) => out.push_str(text),
                        ConcatPart::Reference(reference) => {
                            let value = generated.get(reference).ok_or_else(|| {
                                GenerationError::UnresolvedReference {
                                    param: param.name.clone(),
                                    reference: reference.clone(),
                                }
                            })?;
                            out.push_str(&value.to_string());
                        }
                    }
                }
                ParamValue::Text(out)
            }
        };

        match param.coerce {
            Some(target) => native.coerce(target, &param.name),
            None => Ok(native),
        }
    }

    /// Generates a fresh value for every parameter, in declaration order.
    pub fn generate_set(&self, params: &[Parameter]) -> Result<ParamSet, GenerationError> {
        let mut set = ParamSet::new();
        for param in params {
            let value = self.generate(param, &set)?;
            set.insert(param.name.clone(), value);
        }
        Ok(set)
    }
}

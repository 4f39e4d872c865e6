//! Capacity prototypes: the typed signature every implementation honours

use crate::error::{CapacityError, CapacityResult};
use agora_types::CapacityId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Accepted shape of one parameter
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    Any,
    Bool,
    Integer,
    Number,
    String,
    Array,
    Object,
}

impl ParamKind {
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            ParamKind::Any => true,
            ParamKind::Bool => value.is_boolean(),
            ParamKind::Integer => value.is_i64() || value.is_u64(),
            ParamKind::Number => value.is_number(),
            ParamKind::String => value.is_string(),
            ParamKind::Array => value.is_array(),
            ParamKind::Object => value.is_object(),
        }
    }
}

/// One named parameter slot
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamKind,
    #[serde(default)]
    pub optional: bool,
}

impl ParamSpec {
    pub fn required(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            kind,
            optional: false,
        }
    }

    pub fn optional(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            kind,
            optional: true,
        }
    }
}

/// Declared signature of a capacity
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityPrototype {
    pub capacity: CapacityId,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub inputs: Vec<ParamSpec>,
    #[serde(default)]
    pub outputs: Vec<ParamSpec>,
}

impl CapacityPrototype {
    pub fn new(capacity: impl Into<CapacityId>) -> Self {
        Self {
            capacity: capacity.into(),
            description: String::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_input(mut self, param: ParamSpec) -> Self {
        self.inputs.push(param);
        self
    }

    pub fn with_output(mut self, param: ParamSpec) -> Self {
        self.outputs.push(param);
        self
    }

    pub fn validate_inputs(&self, values: &[Value]) -> CapacityResult<()> {
        check_slots(&self.inputs, values).map_err(|reason| CapacityError::InvalidInput {
            capacity: self.capacity.clone(),
            reason,
        })
    }

    pub fn validate_outputs(&self, values: &[Value]) -> CapacityResult<()> {
        check_slots(&self.outputs, values).map_err(|reason| CapacityError::InvalidOutput {
            capacity: self.capacity.clone(),
            reason,
        })
    }
}

fn check_slots(specs: &[ParamSpec], values: &[Value]) -> Result<(), String> {
    let required = specs.iter().filter(|s| !s.optional).count();
    if values.len() < required || values.len() > specs.len() {
        return Err(format!(
            "expected {}..={} values, got {}",
            required,
            specs.len(),
            values.len()
        ));
    }
    for (spec, value) in specs.iter().zip(values) {
        if !spec.kind.accepts(value) {
            return Err(format!("{} must be {:?}, got {}", spec.name, spec.kind, value));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sum() -> CapacityPrototype {
        CapacityPrototype::new("Sum")
            .with_input(ParamSpec::required("a", ParamKind::Integer))
            .with_input(ParamSpec::required("b", ParamKind::Integer))
            .with_input(ParamSpec::optional("label", ParamKind::String))
            .with_output(ParamSpec::required("total", ParamKind::Integer))
    }

    #[test]
    fn accepts_required_and_optional() {
        let proto = sum();
        assert!(proto.validate_inputs(&[json!(2), json!(3)]).is_ok());
        assert!(proto.validate_inputs(&[json!(2), json!(3), json!("x")]).is_ok());
    }

    #[test]
    fn rejects_arity_and_kind() {
        let proto = sum();
        assert!(matches!(
            proto.validate_inputs(&[json!(2)]),
            Err(CapacityError::InvalidInput { .. })
        ));
        assert!(proto
            .validate_inputs(&[json!(2), json!(3), json!("x"), json!(4)])
            .is_err());
        let err = proto.validate_inputs(&[json!(2), json!("3")]).unwrap_err();
        assert!(err.to_string().contains("b must be Integer"));
    }

    #[test]
    fn output_validation_reports_output_error() {
        let proto = sum();
        assert!(proto.validate_outputs(&[json!(5)]).is_ok());
        assert!(matches!(
            proto.validate_outputs(&[json!(5.5)]),
            Err(CapacityError::InvalidOutput { .. })
        ));
    }
}

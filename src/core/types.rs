//! Type descriptors for properties and event inputs.
//!
//! A descriptor is either a primitive name or an object whose fields are
//! further descriptors:
//!
//! ```
//! use cardscript::core::TypeDescriptor;
//! use serde_json::json;
//!
//! let ty: TypeDescriptor = serde_json::from_value(json!({
//!     "player": "number",
//!     "target": "number",
//!     "cardId": "string",
//! })).unwrap();
//!
//! assert!(ty.conforms(&json!({"player": 1, "target": 2, "cardId": "bolt"})));
//! assert!(!ty.conforms(&json!({"player": 1})));
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Primitive type names.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveType {
    String,
    Number,
    Boolean,
    Void,
}

impl std::fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PrimitiveType::String => "string",
            PrimitiveType::Number => "number",
            PrimitiveType::Boolean => "boolean",
            PrimitiveType::Void => "void",
        };
        f.write_str(name)
    }
}

/// A primitive-or-nested type descriptor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TypeDescriptor {
    Primitive(PrimitiveType),
    Object(BTreeMap<String, TypeDescriptor>),
}

impl Default for TypeDescriptor {
    fn default() -> Self {
        TypeDescriptor::Primitive(PrimitiveType::Void)
    }
}

impl TypeDescriptor {
    /// Check whether `value` has this type.
    ///
    /// Objects must carry every declared field; extra fields are allowed.
    #[must_use]
    pub fn conforms(&self, value: &Value) -> bool {
        match self {
            TypeDescriptor::Primitive(PrimitiveType::String) => value.is_string(),
            TypeDescriptor::Primitive(PrimitiveType::Number) => value.is_number(),
            TypeDescriptor::Primitive(PrimitiveType::Boolean) => value.is_boolean(),
            TypeDescriptor::Primitive(PrimitiveType::Void) => value.is_null(),
            TypeDescriptor::Object(fields) => match value.as_object() {
                Some(object) => fields.iter().all(|(name, ty)| {
                    object.get(name).is_some_and(|field| ty.conforms(field))
                }),
                None => false,
            },
        }
    }

    /// The zero value of this type.
    #[must_use]
    pub fn default_value(&self) -> Value {
        match self {
            TypeDescriptor::Primitive(PrimitiveType::String) => Value::String(String::new()),
            TypeDescriptor::Primitive(PrimitiveType::Number) => Value::from(0),
            TypeDescriptor::Primitive(PrimitiveType::Boolean) => Value::Bool(false),
            TypeDescriptor::Primitive(PrimitiveType::Void) => Value::Null,
            TypeDescriptor::Object(fields) => {
                let object: Map<String, Value> = fields
                    .iter()
                    .map(|(name, ty)| (name.clone(), ty.default_value()))
                    .collect();
                Value::Object(object)
            }
        }
    }

    /// Fill missing object fields with their defaults.
    ///
    /// Scripts drop fields by assigning `nil`; this restores them. Values of
    /// the wrong type are left alone for `conforms` to reject.
    #[must_use]
    pub fn fill_defaults(&self, value: Value) -> Value {
        match (self, value) {
            (_, Value::Null) => self.default_value(),
            (TypeDescriptor::Object(fields), Value::Object(mut object)) => {
                for (name, ty) in fields {
                    let current = object.remove(name).unwrap_or(Value::Null);
                    object.insert(name.clone(), ty.fill_defaults(current));
                }
                Value::Object(object)
            }
            (_, value) => value,
        }
    }

    /// Short human-readable form for error messages.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            TypeDescriptor::Primitive(primitive) => primitive.to_string(),
            TypeDescriptor::Object(fields) => {
                let inner: Vec<String> = fields
                    .iter()
                    .map(|(name, ty)| format!("{}: {}", name, ty.describe()))
                    .collect();
                format!("{{{}}}", inner.join(", "))
            }
        }
    }
}

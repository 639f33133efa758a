use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparison {
    Eq,
    Neq,
}

impl Comparison {
    /// Only a string field value can equal the condition value.
    pub fn compare(self, actual: &Value, expected: &str) -> bool {
        let equal = matches!(actual, Value::String(actual) if actual == expected);

        match self {
            Comparison::Eq => equal,
            Comparison::Neq => !equal,
        }
    }
}

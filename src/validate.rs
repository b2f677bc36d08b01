use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════════════════════════
// INVARIANT CODES
// ═══════════════════════════════════════════════════════════════════════════════

pub const INV_DUPLICATE_BINDING: &str = "R-ERR-BIND-001";
pub const INV_READONLY_BINDING: &str = "R-ERR-BIND-002";
pub const INV_UNKNOWN_BINDING: &str = "R-ERR-BIND-003";
pub const INV_INVALID_BINDING_NAME: &str = "R-ERR-BIND-004";
pub const INV_STORE_NOT_WRITABLE: &str = "R-ERR-STORE-001";
pub const INV_UNKNOWN_STORE: &str = "R-ERR-STORE-002";
pub const INV_STATEMENT_SYNTAX: &str = "R-ERR-SYNTAX-001";

// ═══════════════════════════════════════════════════════════════════════════════
// GUARANTEES
// ═══════════════════════════════════════════════════════════════════════════════

fn get_guarantee(code: &str) -> &'static str {
    match code {
        INV_DUPLICATE_BINDING => "Binding names are unique within a component's top-level scope.",
        INV_READONLY_BINDING => "Non-writable bindings are never mutated at runtime.",
        INV_UNKNOWN_BINDING => "Every binding access resolves to a declared top-level name.",
        INV_INVALID_BINDING_NAME => "Binding names are valid identifiers.",
        INV_STORE_NOT_WRITABLE => {
            "Writes to a store-prefixed binding go through the store's set method."
        }
        INV_UNKNOWN_STORE => {
            "A store-prefixed binding corresponds to a top-level-declared store reference."
        }
        INV_STATEMENT_SYNTAX => "Every reactive statement parses before the component runs.",
        _ => "Unknown invariant.",
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RUNTIME ERROR
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeError {
    pub code: String,
    pub error_type: String,
    pub message: String,
    pub guarantee: String,
    pub component: String,
    pub binding: Option<String>,
}

impl RuntimeError {
    pub fn new(code: &str, message: &str, component: &str) -> Self {
        RuntimeError {
            code: code.to_string(),
            error_type: error_type_for(code).to_string(),
            message: message.to_string(),
            guarantee: get_guarantee(code).to_string(),
            component: component.to_string(),
            binding: None,
        }
    }

    pub fn with_binding(code: &str, message: &str, component: &str, binding: &str) -> Self {
        let mut err = Self::new(code, message, component);
        err.binding = Some(binding.to_string());
        err
    }
}

fn error_type_for(code: &str) -> &'static str {
    match code {
        INV_STORE_NOT_WRITABLE | INV_UNKNOWN_STORE => "STORE_CONTRACT_VIOLATION",
        INV_STATEMENT_SYNTAX => "STATEMENT_SYNTAX_ERROR",
        _ => "BINDING_INVARIANT_VIOLATION",
    }
}

impl std::fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {} ({})", self.code, self.message, self.component)
    }
}

impl std::error::Error for RuntimeError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_carries_guarantee() {
        let err = RuntimeError::with_binding(
            INV_DUPLICATE_BINDING,
            "Binding \"count\" is already declared.",
            "Counter",
            "count",
        );
        assert_eq!(err.code, INV_DUPLICATE_BINDING);
        assert_eq!(err.error_type, "BINDING_INVARIANT_VIOLATION");
        assert_eq!(err.binding.as_deref(), Some("count"));
        assert!(err.guarantee.contains("unique"));
    }

    #[test]
    fn test_store_errors_are_store_typed() {
        let err = RuntimeError::new(INV_STORE_NOT_WRITABLE, "no set method", "Counter");
        assert_eq!(err.error_type, "STORE_CONTRACT_VIOLATION");
    }

    #[test]
    fn test_display_includes_code_and_component() {
        let err = RuntimeError::new(INV_UNKNOWN_BINDING, "Unknown binding \"x\".", "App");
        let rendered = format!("{}", err);
        assert!(rendered.contains("R-ERR-BIND-003"));
        assert!(rendered.contains("App"));
    }
}

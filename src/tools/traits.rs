//! The contract every tool implementation satisfies.

use async_trait::async_trait;
use serde_json::Value;

use super::result::ToolResult;

/// A callable tool, uniform regardless of whether it runs in-process, over
/// MCP, or via HTTP.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema describing the arguments object this tool accepts.
    fn parameters_schema(&self) -> Value;

    /// Validates `args` against [`Self::parameters_schema`] before
    /// dispatch, using the schema every tool already publishes for
    /// introspection. A schema that fails to compile is treated as
    /// permissive rather than blocking every call.
    fn validate_args(&self, args: &Value) -> Result<(), String> {
        let schema = self.parameters_schema();
        match jsonschema::validator_for(&schema) {
            Ok(validator) => {
                if validator.is_valid(args) {
                    Ok(())
                } else {
                    let errors: Vec<String> =
                        validator.iter_errors(args).map(|e| e.to_string()).collect();
                    Err(errors.join("; "))
                }
            }
            Err(_) => Ok(()),
        }
    }

    async fn call(&self, args: Value) -> Result<ToolResult, String>;
}

//! Tool contract, registry, and adapters (C2).

mod adapters;
mod external;
mod registry;
mod result;
mod traits;

pub use adapters::{HttpTool, LocalFnTool, McpTool, McpToolClient};
pub use external::{ExecutionResult, InMemorySandbox, InMemoryVectorStore, SandboxClient, VectorRecord, VectorStoreClient};
pub use registry::{ToolDescriptor, ToolRegistry};
pub use result::{ToolResult, ToolResultBuilder, ToolStatus};
pub use traits::Tool;

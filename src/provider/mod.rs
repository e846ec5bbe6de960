//! Provider abstraction and client pool (C4).

mod http_chat;
mod local_rpc;
mod pool;
mod traits;

pub use http_chat::HttpChatProvider;
pub use local_rpc::LocalRpcProvider;
pub use pool::ClientPool;
pub use traits::{CompletionRequest, CompletionResponse, LLMProvider, Message, Role};

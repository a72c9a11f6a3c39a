//! Model-facing half of the pipeline: prompts in, raw completion text out

pub mod dialect;
pub mod http;
pub mod prompts;
pub mod transport;

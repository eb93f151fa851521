pub mod http;
pub mod json_safe;
pub mod retry;
pub mod run_context;

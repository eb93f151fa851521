pub mod context_cmd;

pub mod context_builder;
pub mod context_store;
pub mod history_kline;
pub mod kline_context;
pub mod news_ranker;
pub mod prediction_outcome;
pub mod scheduler;

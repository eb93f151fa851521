pub mod context;
pub mod news;
pub mod prediction;
pub mod settings;
pub mod snapshot;
pub mod watchlist;

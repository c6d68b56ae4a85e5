pub mod cache;
pub mod fetcher;
pub mod proxy;
pub mod push;

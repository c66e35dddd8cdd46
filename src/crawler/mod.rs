pub mod controller;
pub mod fetcher;
pub mod scheduler;
pub mod task;

pub use controller::CrawlerController;

pub mod config;
pub mod dataset;
pub mod fetch;
pub mod flatten;
pub mod http_cache;
pub mod http_client;
pub mod logging;
pub mod session;
pub mod state;
pub mod store;
pub mod tba;
pub mod worker;
pub mod workbook;

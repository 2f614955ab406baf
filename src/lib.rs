pub mod api;
pub mod app;
pub mod error;
pub mod reconcile;
pub mod session;
pub mod timeline;
pub mod timestamp;
pub mod transport;
pub mod ui;
pub mod utils;

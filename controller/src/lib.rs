pub mod api;
pub mod connectivity;
pub mod device;
pub mod host;
pub mod scheduler;
pub mod sim;
pub mod store;
pub mod tasks;

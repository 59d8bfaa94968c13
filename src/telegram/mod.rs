pub mod alerts;
pub mod api;

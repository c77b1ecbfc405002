//! HTTP adapters.

mod gateway;

pub use gateway::{HttpOrderGateway, extract_orders};

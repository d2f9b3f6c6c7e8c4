pub mod audit;
pub mod document;
pub mod error;
pub mod raci;
pub mod risk;
pub mod service;
pub mod trail;
pub mod utils;

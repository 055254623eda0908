// src/application/service/mod.rs
// Application services

pub mod ledger_engine;
pub mod price_oracle;

pub use ledger_engine::LedgerEngine;
pub use price_oracle::{PriceOracle, DEFAULT_STALENESS_MINUTES};

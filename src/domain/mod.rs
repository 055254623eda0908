// src/domain/mod.rs
pub mod calendar;
pub mod errors;
pub mod fees;
pub mod models;
pub mod repository;
pub mod service;

// Re-export common types for convenience
pub use errors::{AppError, AppResult, RewardError, RewardResult};
pub use fees::FeeBreakdown;
pub use models::{
    round_inr, round_quantity, DailyValuation, EntryKind, Holdings, LedgerEntry, NewLedgerEntry,
    NewRewardGrant, Portfolio, PortfolioHolding, PriceSample, ReversalOutcome, RewardGrant,
    StockConfig, TodayStats,
};

// src/infrastructure/mod.rs
pub mod clock;
pub mod market;
pub mod storage;

pub use clock::{FixedClock, SystemClock};
pub use market::{StaticPriceFeed, SyntheticPriceFeed};
pub use storage::SqliteStore;

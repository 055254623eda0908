pub mod coordinator;

pub use coordinator::RewardCoordinator;

pub mod reward_recorder;
pub mod valuation;

// Re-export public API
pub use reward_recorder::{RecordedReward, RewardRecorder, RewardRecordingUseCase};
pub use valuation::{ValuationAggregator, ValuationUseCase};

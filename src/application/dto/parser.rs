// src/application/dto/parser.rs
// Parsers for DTOs

use chrono::{DateTime, Utc};

use super::CreateRewardRequest;
use crate::domain::errors::{RewardError, RewardResult};
use crate::domain::models::NewRewardGrant;

/// Parse a JSON reward request into an unvalidated claim.
///
/// Shape errors and timestamps without an offset are reported as
/// `RewardError::Validation`; range checks happen in the recorder.
pub fn parse_create_reward(body: &str) -> RewardResult<NewRewardGrant> {
    let request: CreateRewardRequest = serde_json::from_str(body)
        .map_err(|e| RewardError::validation(format!("invalid reward request: {}", e)))?;

    request.try_into()
}

/// RFC 3339 instant with an explicit offset, normalised to UTC.
pub fn parse_timestamp(raw: &str) -> RewardResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| RewardError::validation(format!("invalid timestamp {:?}: {}", raw, e)))
}

impl TryFrom<CreateRewardRequest> for NewRewardGrant {
    type Error = RewardError;

    fn try_from(request: CreateRewardRequest) -> Result<Self, Self::Error> {
        Ok(NewRewardGrant {
            user_id: request.user_id,
            symbol: request.symbol,
            quantity: request.quantity,
            event_ts: parse_timestamp(&request.timestamp)?,
        })
    }
}

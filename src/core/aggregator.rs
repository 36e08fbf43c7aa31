//! Reduction of attempt outcomes into the payload returned to the caller.
use hyper::StatusCode;
use serde::{Deserialize, Serialize};

use crate::core::dispatcher::AttemptOutcome;

/// One entry of the aggregate report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetReport {
    pub status_code: u16,
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&AttemptOutcome> for TargetReport {
    fn from(outcome: &AttemptOutcome) -> Self {
        let error = match outcome {
            AttemptOutcome::Failed { error, .. } => Some(error.to_string()),
            AttemptOutcome::Completed { .. } => None,
        };
        Self {
            status_code: outcome.status_code().as_u16(),
            address: outcome.address().map(str::to_string),
            error,
        }
    }
}

/// Per-address report plus the overall verdict. Only `responses` is
/// serialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateResult {
    pub responses: Vec<TargetReport>,
    #[serde(skip)]
    pub all_succeeded: bool,
}

impl AggregateResult {
    /// 200 when every target answered 2xx, 400 otherwise.
    pub fn verdict(&self) -> StatusCode {
        if self.all_succeeded {
            StatusCode::OK
        } else {
            StatusCode::BAD_REQUEST
        }
    }
}

/// Build the aggregate from outcomes already ordered like the addresses.
pub fn aggregate(outcomes: &[AttemptOutcome]) -> AggregateResult {
    AggregateResult {
        responses: outcomes.iter().map(TargetReport::from).collect(),
        all_succeeded: outcomes.iter().all(AttemptOutcome::is_success),
    }
}

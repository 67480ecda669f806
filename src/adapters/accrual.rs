//! HTTP client for the external accrual engine.
//!
//! The engine is an opaque calculator: orders are submitted with
//! `POST /api/orders` and polled with `GET /api/orders/{number}`. Replies
//! are normalized into the pipeline's vocabulary here; floating-point
//! accrual amounts are converted to integer minor units at this boundary
//! and nowhere else.

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use crate::domain::accrual_to_minor_units;
use crate::error::{Result, TallyError};

/// Reply to an order submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitReply {
    /// 202: the engine took the order
    Accepted,
    /// 409: the engine already knows the order
    AlreadyRegistered,
}

/// Reply to a status poll.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StatusReply {
    /// Registered upstream, computation not started
    Registered,
    /// Still computing
    Processing,
    /// Terminal: no points for this order
    Invalid,
    /// Terminal: credited amount in minor units
    Processed { amount: i64 },
    /// 204: the engine does not know the order yet
    Unknown,
}

impl StatusReply {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StatusReply::Invalid | StatusReply::Processed { .. })
    }
}

#[derive(Debug, Deserialize)]
struct StatusBody {
    #[allow(dead_code)]
    order: String,
    status: String,
    accrual: Option<f64>,
}

/// Accrual engine client
#[derive(Clone)]
pub struct AccrualClient {
    http: Client,
    base_url: String,
    timeout: Duration,
}

impl AccrualClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .user_agent("tally/0.1")
            .build()
            .map_err(|e| TallyError::Internal(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Submit an order for accrual computation.
    pub async fn register_order(&self, number: &str) -> Result<SubmitReply> {
        let url = format!("{}/api/orders", self.base_url);
        let response = self
            .http
            .post(&url)
            .timeout(self.timeout)
            .json(&json!({ "order": number }))
            .send()
            .await?;

        match response.status() {
            StatusCode::ACCEPTED => Ok(SubmitReply::Accepted),
            StatusCode::CONFLICT => Ok(SubmitReply::AlreadyRegistered),
            StatusCode::TOO_MANY_REQUESTS => Err(TallyError::RateLimited(format!(
                "submission of order {}",
                number
            ))),
            status if status.is_server_error() => Err(TallyError::Upstream(status.as_u16())),
            status => Err(TallyError::UpstreamRejected(status.as_u16())),
        }
    }

    /// Poll the engine for the current accrual status of an order.
    pub async fn order_status(&self, number: &str) -> Result<StatusReply> {
        let url = format!("{}/api/orders/{}", self.base_url, number);
        let response = self.http.get(&url).timeout(self.timeout).send().await?;

        match response.status() {
            StatusCode::OK => {}
            StatusCode::NO_CONTENT => return Ok(StatusReply::Unknown),
            StatusCode::TOO_MANY_REQUESTS => {
                return Err(TallyError::RateLimited(format!(
                    "status poll of order {}",
                    number
                )))
            }
            status if status.is_server_error() => {
                return Err(TallyError::Upstream(status.as_u16()))
            }
            status => return Err(TallyError::UpstreamRejected(status.as_u16())),
        }

        let body: StatusBody = response.json().await?;
        debug!("Order {} upstream status {}", number, body.status);

        match body.status.as_str() {
            "REGISTERED" => Ok(StatusReply::Registered),
            "PROCESSING" => Ok(StatusReply::Processing),
            "INVALID" => Ok(StatusReply::Invalid),
            "PROCESSED" => {
                let accrual = body.accrual.ok_or_else(|| {
                    TallyError::Internal(format!(
                        "engine reported order {} PROCESSED without an accrual amount",
                        number
                    ))
                })?;
                Ok(StatusReply::Processed {
                    amount: accrual_to_minor_units(accrual)?,
                })
            }
            other => Err(TallyError::Internal(format!(
                "unknown accrual status {} for order {}",
                other, number
            ))),
        }
    }
}

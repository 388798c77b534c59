//! Compliance screening connector.

use std::time::Duration;

use async_trait::async_trait;
use clearline_core::clients::{ClientError, ComplianceHook};
use clearline_core::transaction::Transaction;
use serde::Deserialize;

use crate::error::ConnectorError;
use crate::http::JsonEndpoint;

#[derive(Debug, Deserialize)]
struct ScreeningDecision {
    hold: bool,
}

/// Asks the compliance service whether a transaction must wait for approval.
#[derive(Debug, Clone)]
pub struct HttpComplianceHook {
    endpoint: JsonEndpoint,
}

impl HttpComplianceHook {
    /// Creates a compliance client for `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is empty or malformed.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ConnectorError> {
        Ok(Self {
            endpoint: JsonEndpoint::new("compliance", base_url, timeout)?,
        })
    }
}

#[async_trait]
impl ComplianceHook for HttpComplianceHook {
    async fn should_hold(&self, transaction: &Transaction) -> Result<bool, ClientError> {
        let decision: ScreeningDecision = self.endpoint.post("screenings", transaction).await?;
        Ok(decision.hold)
    }
}

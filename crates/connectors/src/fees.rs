//! Fee calculation connector.

use std::time::Duration;

use async_trait::async_trait;
use clearline_core::clients::{ClientError, FeeCalculator, FeeContext, FeeLine};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::ConnectorError;
use crate::http::JsonEndpoint;

#[derive(Debug, Deserialize)]
struct FeeQuote {
    #[serde(default)]
    lines: Vec<FeeLine>,
}

/// Prices transactions through the fee service.
#[derive(Debug, Clone)]
pub struct HttpFeeCalculator {
    endpoint: JsonEndpoint,
}

impl HttpFeeCalculator {
    /// Creates a fee client for `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is empty or malformed.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ConnectorError> {
        Ok(Self {
            endpoint: JsonEndpoint::new("fees", base_url, timeout)?,
        })
    }
}

#[async_trait]
impl FeeCalculator for HttpFeeCalculator {
    async fn calculate(&self, context: &FeeContext) -> Result<Vec<FeeLine>, ClientError> {
        let quote: FeeQuote = self.endpoint.post("fee-quotes", context).await?;
        if let Some(line) = quote
            .lines
            .iter()
            .find(|line| line.fee < Decimal::ZERO || line.tax < Decimal::ZERO)
        {
            return Err(ClientError::Protocol(format!(
                "negative charge in fee line {}",
                line.code
            )));
        }
        Ok(quote.lines)
    }
}

//! Ledger posting connector.

use std::time::Duration;

use async_trait::async_trait;
use clearline_core::clients::{ClientError, LedgerClient, PostingInstruction, PostingOutcome};

use crate::error::ConnectorError;
use crate::http::JsonEndpoint;

/// Posts movements to the ledger service.
///
/// The ledger dedupes on `idempotency_ref` and answers with the outcome of
/// the original posting on a repeat, so resending after a timeout is safe.
#[derive(Debug, Clone)]
pub struct HttpLedgerClient {
    endpoint: JsonEndpoint,
}

impl HttpLedgerClient {
    /// Creates a ledger client for `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is empty or malformed.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ConnectorError> {
        Ok(Self {
            endpoint: JsonEndpoint::new("ledger", base_url, timeout)?,
        })
    }
}

#[async_trait]
impl LedgerClient for HttpLedgerClient {
    async fn post(&self, instruction: &PostingInstruction) -> Result<PostingOutcome, ClientError> {
        self.endpoint.post("postings", instruction).await
    }
}

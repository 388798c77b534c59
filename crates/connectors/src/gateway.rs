//! Inter-bank settlement gateway connector.

use std::time::Duration;

use async_trait::async_trait;
use clearline_core::clients::{
    ClientError, FundsTransferRequest, FundsTransferResponse, NameEnquiryResponse,
    SettlementGateway,
};
use serde::Serialize;

use crate::error::ConnectorError;
use crate::http::JsonEndpoint;

#[derive(Debug, Serialize)]
struct NameEnquiryRequest<'a> {
    bank_code: &'a str,
    account_number: &'a str,
}

/// Talks to the switch for name enquiries and funds transfers.
#[derive(Debug, Clone)]
pub struct HttpSettlementGateway {
    endpoint: JsonEndpoint,
}

impl HttpSettlementGateway {
    /// Creates a gateway client for `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is empty or malformed.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ConnectorError> {
        Ok(Self {
            endpoint: JsonEndpoint::new("gateway", base_url, timeout)?,
        })
    }
}

#[async_trait]
impl SettlementGateway for HttpSettlementGateway {
    async fn name_enquiry(
        &self,
        bank_code: &str,
        account_number: &str,
    ) -> Result<NameEnquiryResponse, ClientError> {
        self.endpoint
            .post(
                "name-enquiries",
                &NameEnquiryRequest {
                    bank_code,
                    account_number,
                },
            )
            .await
    }

    async fn funds_transfer(
        &self,
        request: &FundsTransferRequest,
    ) -> Result<FundsTransferResponse, ClientError> {
        self.endpoint.post("funds-transfers", request).await
    }
}

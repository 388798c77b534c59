//! HTTP connectors for Clearline's external collaborators.
//!
//! Each connector implements one of the core client contracts over JSON:
//!
//! | Connector                | Contract            | Endpoint                     |
//! |--------------------------|---------------------|------------------------------|
//! | [`HttpLedgerClient`]     | `LedgerClient`      | `POST /postings`             |
//! | [`HttpSettlementGateway`]| `SettlementGateway` | `POST /name-enquiries`, `POST /funds-transfers` |
//! | [`HttpFeeCalculator`]    | `FeeCalculator`     | `POST /fee-quotes`           |
//! | [`HttpComplianceHook`]   | `ComplianceHook`    | `POST /screenings`           |
//!
//! Transport failures are classified so the core can tell a request that
//! never left (`Unavailable`) from one whose effect is unknown (`Timeout`).

pub mod compliance;
pub mod error;
pub mod fees;
pub mod gateway;
mod http;
pub mod ledger;

pub use compliance::HttpComplianceHook;
pub use error::ConnectorError;
pub use fees::HttpFeeCalculator;
pub use gateway::HttpSettlementGateway;
pub use ledger::HttpLedgerClient;

use std::sync::Arc;

use clearline_core::clients::Clients;
use clearline_shared::config::{ConnectorsConfig, ProcessingConfig};
use tracing::info;

/// Builds every collaborator from configuration.
///
/// The fee calculator and compliance hook are optional; when their URL is
/// unset the core's defaults apply (no fees, never hold).
///
/// # Errors
///
/// Returns an error if a URL is missing or malformed.
pub fn clients_from_config(
    connectors: &ConnectorsConfig,
    processing: &ProcessingConfig,
) -> Result<Clients, ConnectorError> {
    let ledger = HttpLedgerClient::new(&connectors.ledger_url, processing.ledger_timeout())?;
    let gateway =
        HttpSettlementGateway::new(&connectors.gateway_url, processing.gateway_timeout())?;
    let mut clients = Clients::new(Arc::new(ledger), Arc::new(gateway));

    if let Some(url) = connectors.fees_url.as_deref() {
        let fees = HttpFeeCalculator::new(url, processing.advisory_timeout())?;
        clients = clients.with_fees(Arc::new(fees));
    }
    if let Some(url) = connectors.compliance_url.as_deref() {
        let compliance = HttpComplianceHook::new(url, processing.advisory_timeout())?;
        clients = clients.with_compliance(Arc::new(compliance));
    }

    info!(
        ledger = %connectors.ledger_url,
        gateway = %connectors.gateway_url,
        fees = connectors.fees_url.is_some(),
        compliance = connectors.compliance_url.is_some(),
        "Connectors configured"
    );
    Ok(clients)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_ledger_url_is_rejected() {
        let connectors = ConnectorsConfig {
            gateway_url: "http://switch.local".into(),
            ..ConnectorsConfig::default()
        };

        let err = clients_from_config(&connectors, &ProcessingConfig::default()).err();
        assert!(matches!(err, Some(ConnectorError::MissingUrl("ledger"))));
    }

    #[test]
    fn test_optional_services_may_be_unset() {
        let connectors = ConnectorsConfig {
            ledger_url: "http://ledger.local".into(),
            gateway_url: "http://switch.local".into(),
            fees_url: None,
            compliance_url: None,
        };

        assert!(clients_from_config(&connectors, &ProcessingConfig::default()).is_ok());
    }
}

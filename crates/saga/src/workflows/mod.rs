//! Business workflows built on the saga core: each one authenticates the
//! caller, runs its pre-checks, builds the step list and submits it.

mod add_to_cart;
mod place_order;

use std::sync::Arc;

pub use add_to_cart::AddToCartRequest;
pub use place_order::PlaceOrderRequest;

use crate::precheck::PreCheckGate;
use crate::submitter::SagaSubmitter;

/// Base URL the coordinator uses to reach this service's participants,
/// e.g. `http://shop:8080/saga`.
#[derive(Debug, Clone)]
pub struct Endpoints {
    base_url: String,
}

impl Endpoints {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Full URL of a participant path.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// The add-to-cart and place-order workflows.
pub struct ShopWorkflows {
    gate: Arc<PreCheckGate>,
    submitter: SagaSubmitter,
    endpoints: Endpoints,
}

impl ShopWorkflows {
    pub fn new(gate: Arc<PreCheckGate>, submitter: SagaSubmitter, endpoints: Endpoints) -> Self {
        Self {
            gate,
            submitter,
            endpoints,
        }
    }

    pub fn gate(&self) -> &PreCheckGate {
        &self.gate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_urls() {
        let endpoints = Endpoints::new("http://shop:8080/saga/");
        assert_eq!(endpoints.base_url(), "http://shop:8080/saga");
        assert_eq!(
            endpoints.url(crate::services::RESERVE_STOCK),
            "http://shop:8080/saga/stock/reserve"
        );
    }
}

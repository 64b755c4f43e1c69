//! REST client for the shared inventory service.
//!
//! Endpoints:
//! - `GET  /api/health`: reachability probe (HEAD)
//! - `GET  /api/products/{id}`: `{"id", "name", "quantity"}`, 404 if missing
//! - `GET  /api/actions/{id}`: 200 if the action was recorded, 404 otherwise
//! - `POST /api/sales`, `POST /api/restocks`: atomic applies keyed by `actionId`
//!
//! A 409 answer carries `{"error": "already_applied"}` or
//! `{"error": "insufficient_stock", "productId", "available"}`; a 404 with a
//! `productId` names a product that no longer exists.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};

use super::{ConnectivityProbe, InventoryRemote, RemoteError, RestockOutcome, SaleOutcome};
use crate::sync::action::{ActionId, Actor, RestockPayload, SaleLine, SalePayload};

const API_KEY_HEADER: &str = "X-Api-Key";
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// HTTP-backed inventory.
#[derive(Debug, Clone)]
pub struct HttpInventory {
    client: Client,
    base_url: String,
    base: Url,
    api_key: Option<String>,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct ProductResponse {
    quantity: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConflictResponse {
    error: String,
    #[serde(default)]
    product_id: Option<String>,
    #[serde(default)]
    available: Option<u32>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SaleRequest<'a> {
    action_id: String,
    items: &'a [SaleLine],
    attendant: &'a Actor,
    total_cents: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RestockRequest<'a> {
    action_id: String,
    product_id: &'a str,
    quantity: u32,
    actor: &'a Actor,
}

enum Applied {
    Applied,
    AlreadyApplied,
    InsufficientStock { product_id: String, available: u32 },
}

impl HttpInventory {
    /// Create a client for the service at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns `Rejected` if `base_url` is not an http(s) URL or the HTTP
    /// client cannot be built.
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, RemoteError> {
        let base_url = base_url.trim_end_matches('/');
        let base = Url::parse(base_url)
            .map_err(|e| RemoteError::Rejected(format!("Invalid base URL {base_url}: {e}")))?;
        if base.cannot_be_a_base() || !matches!(base.scheme(), "http" | "https") {
            return Err(RemoteError::Rejected(format!(
                "Invalid base URL {base_url}: expected http or https"
            )));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::Rejected(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.to_string(),
            base,
            api_key,
            timeout,
        })
    }

    /// The service base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Endpoint URL under the base; each segment is percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        // Checked in `new`: the base is never cannot-be-a-base.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, segments: &[&str]) -> RequestBuilder {
        let builder = self.client.request(method, self.endpoint(segments));
        match &self.api_key {
            Some(key) => builder.header(API_KEY_HEADER, key),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, RemoteError> {
        builder.send().await.map_err(|e| self.transport_error(&e))
    }

    fn transport_error(&self, err: &reqwest::Error) -> RemoteError {
        if err.is_timeout() {
            RemoteError::Timeout(self.timeout)
        } else {
            RemoteError::Unavailable(err.to_string())
        }
    }

    async fn post_apply<T: Serialize + Sync>(
        &self,
        segments: &[&str],
        body: &T,
    ) -> Result<Applied, RemoteError> {
        let response = self
            .send(self.request(Method::POST, segments).json(body))
            .await?;
        let status = response.status();

        if status.is_success() {
            return Ok(Applied::Applied);
        }
        if status == StatusCode::CONFLICT {
            let body = response.text().await.map_err(|e| self.transport_error(&e))?;
            let conflict: ConflictResponse = serde_json::from_str(&body).unwrap_or_default();
            return match conflict.error.as_str() {
                "already_applied" => Ok(Applied::AlreadyApplied),
                "insufficient_stock" => Ok(Applied::InsufficientStock {
                    product_id: conflict.product_id.unwrap_or_default(),
                    available: conflict.available.unwrap_or(0),
                }),
                _ => Err(RemoteError::Rejected(format!("{status}: {body}"))),
            };
        }
        if status == StatusCode::NOT_FOUND {
            let body = response.text().await.unwrap_or_default();
            let conflict: ConflictResponse = serde_json::from_str(&body).unwrap_or_default();
            if let Some(product_id) = conflict.product_id {
                return Err(RemoteError::ProductNotFound(product_id));
            }
            return Err(RemoteError::Rejected(format!("{status}: {body}")));
        }

        Err(status_error(status, response.text().await.unwrap_or_default()))
    }
}

/// Map an unexpected status to an error: server-side trouble is transient.
fn status_error(status: StatusCode, body: String) -> RemoteError {
    if status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
    {
        RemoteError::Unavailable(format!("{status}"))
    } else {
        RemoteError::Rejected(format!("{status}: {body}"))
    }
}

#[async_trait]
impl InventoryRemote for HttpInventory {
    async fn product_stock(&self, product_id: &str) -> Result<u32, RemoteError> {
        let response = self
            .send(self.request(Method::GET, &["api", "products", product_id]))
            .await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(RemoteError::ProductNotFound(product_id.to_string()));
        }
        if !status.is_success() {
            return Err(status_error(status, response.text().await.unwrap_or_default()));
        }

        let product: ProductResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::Rejected(format!("Malformed product response: {e}")))?;
        Ok(product.quantity)
    }

    async fn is_applied(&self, action_id: &ActionId) -> Result<bool, RemoteError> {
        let action_id = action_id.to_string();
        let response = self
            .send(self.request(Method::GET, &["api", "actions", action_id.as_str()]))
            .await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        if status.is_success() {
            return Ok(true);
        }
        Err(status_error(status, response.text().await.unwrap_or_default()))
    }

    async fn apply_sale(
        &self,
        action_id: &ActionId,
        sale: &SalePayload,
    ) -> Result<SaleOutcome, RemoteError> {
        let body = SaleRequest {
            action_id: action_id.to_string(),
            items: &sale.items,
            attendant: &sale.attendant,
            total_cents: sale.total_cents(),
        };

        match self.post_apply(&["api", "sales"], &body).await? {
            Applied::Applied => Ok(SaleOutcome::Applied),
            Applied::AlreadyApplied => Ok(SaleOutcome::AlreadyApplied),
            Applied::InsufficientStock {
                product_id,
                available,
            } => Ok(SaleOutcome::InsufficientStock {
                product_id,
                available,
            }),
        }
    }

    async fn apply_restock(
        &self,
        action_id: &ActionId,
        restock: &RestockPayload,
    ) -> Result<RestockOutcome, RemoteError> {
        let body = RestockRequest {
            action_id: action_id.to_string(),
            product_id: &restock.product_id,
            quantity: restock.quantity,
            actor: &restock.actor,
        };

        match self.post_apply(&["api", "restocks"], &body).await? {
            Applied::Applied => Ok(RestockOutcome::Applied),
            Applied::AlreadyApplied => Ok(RestockOutcome::AlreadyApplied),
            Applied::InsufficientStock { .. } => Err(RemoteError::Rejected(
                "restock answered with insufficient_stock".to_string(),
            )),
        }
    }
}

#[async_trait]
impl ConnectivityProbe for HttpInventory {
    async fn is_online(&self) -> bool {
        let result = self
            .request(Method::HEAD, &["api", "health"])
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await;

        match result {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(error = %e, "health check failed");
                false
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_classification() {
        assert!(status_error(StatusCode::BAD_GATEWAY, String::new()).is_transient());
        assert!(status_error(StatusCode::TOO_MANY_REQUESTS, String::new()).is_transient());
        assert!(!status_error(StatusCode::BAD_REQUEST, "bad".to_string()).is_transient());
        assert!(!status_error(StatusCode::FORBIDDEN, String::new()).is_transient());
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let inventory =
            HttpInventory::new("http://localhost:8080/", None, Duration::from_secs(1)).unwrap();
        assert_eq!(inventory.base_url(), "http://localhost:8080");
    }

    #[test]
    fn test_endpoint_encodes_segments() {
        let inventory =
            HttpInventory::new("http://localhost:8080/inv/", None, Duration::from_secs(1)).unwrap();
        assert_eq!(
            inventory.endpoint(&["api", "products", "sku#7/a?b"]).as_str(),
            "http://localhost:8080/inv/api/products/sku%237%2Fa%3Fb"
        );
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        for base in ["not a url", "mailto:shop@example.com", "ftp://example.com"] {
            let err = HttpInventory::new(base, None, Duration::from_secs(1)).unwrap_err();
            assert!(matches!(err, RemoteError::Rejected(_)), "{base}");
        }
    }

    #[test]
    fn test_sale_request_body() {
        let sale = SalePayload {
            items: vec![SaleLine {
                product_id: "p1".to_string(),
                product_name: "Milk".to_string(),
                quantity: 2,
                unit_price_cents: 150,
            }],
            attendant: Actor::new("u1", "u1@shop"),
        };
        let body = SaleRequest {
            action_id: "abc".to_string(),
            items: &sale.items,
            attendant: &sale.attendant,
            total_cents: sale.total_cents(),
        };

        let json: serde_json::Value = serde_json::to_value(&body).unwrap();
        assert_eq!(json["actionId"], "abc");
        assert_eq!(json["items"][0]["productId"], "p1");
        assert_eq!(json["totalCents"], 300);
    }
}

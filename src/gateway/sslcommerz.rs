use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::config::GatewayConfig;

use super::{
    CheckoutRequest, CheckoutSession, GatewayError, PaymentGateway, ValidationReport,
    ValidationStatus,
};

const INIT_PATH: &str = "/gwprocess/v4/api.php";
const VALIDATION_PATH: &str = "/validator/api/validationserverAPI.php";

/// Hosted-checkout client for SSLCommerz. Every call is bounded by the configured timeout.
pub struct SslCommerzGateway {
    http: reqwest::Client,
    store_id: String,
    store_password: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct InitResponse {
    status: String,
    sessionkey: Option<String>,
    #[serde(rename = "GatewayPageURL")]
    gateway_page_url: Option<String>,
    failedreason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ValidationResponse {
    status: String,
    tran_id: Option<String>,
}

impl SslCommerzGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| GatewayError::Transport(format!("failed to build client: {err}")))?;

        Ok(Self {
            http,
            store_id: config.store_id.clone(),
            store_password: config.store_password.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn checkout_form(&self, request: &CheckoutRequest) -> Vec<(&'static str, String)> {
        vec![
            ("store_id", self.store_id.clone()),
            ("store_passwd", self.store_password.clone()),
            ("total_amount", request.amount.to_string()),
            ("currency", request.currency.clone()),
            ("tran_id", request.transaction_id.clone()),
            ("success_url", request.callbacks.success.clone()),
            ("fail_url", request.callbacks.fail.clone()),
            ("cancel_url", request.callbacks.cancel.clone()),
            ("ipn_url", request.callbacks.ipn.clone()),
            ("cus_name", request.customer.name.clone()),
            ("cus_email", request.customer.email.clone()),
            ("cus_add1", request.pickup_location.clone()),
            ("cus_city", "Dhaka".to_string()),
            ("cus_country", "Bangladesh".to_string()),
            ("cus_phone", request.customer.phone.clone()),
            (
                "product_name",
                format!(
                    "Ride Payment - {} to {}",
                    request.pickup_location, request.dropoff_location
                ),
            ),
            ("product_category", "Transportation".to_string()),
            ("product_profile", "general".to_string()),
            ("shipping_method", "NO".to_string()),
            ("ship_name", request.customer.name.clone()),
            ("ship_add1", request.dropoff_location.clone()),
            ("ship_city", "Dhaka".to_string()),
            ("ship_country", "Bangladesh".to_string()),
            ("value_a", request.ride_id.to_string()),
            ("value_b", request.user_id.to_string()),
        ]
    }

    async fn read_json(response: reqwest::Response) -> Result<Value, GatewayError> {
        let response = response
            .error_for_status()
            .map_err(transport_error)?;

        response.json::<Value>().await.map_err(|err| {
            if err.is_timeout() {
                GatewayError::Timeout
            } else {
                GatewayError::Malformed(err.without_url().to_string())
            }
        })
    }
}

/// The validation URL carries the store password in its query, so it never
/// reaches the error text.
fn transport_error(err: reqwest::Error) -> GatewayError {
    if err.is_timeout() {
        GatewayError::Timeout
    } else {
        GatewayError::Transport(err.without_url().to_string())
    }
}

#[async_trait]
impl PaymentGateway for SslCommerzGateway {
    async fn initialize(&self, request: &CheckoutRequest) -> Result<CheckoutSession, GatewayError> {
        let response = self
            .http
            .post(format!("{}{INIT_PATH}", self.base_url))
            .form(&self.checkout_form(request))
            .send()
            .await
            .map_err(transport_error)?;

        let raw = Self::read_json(response).await?;
        let parsed: InitResponse = serde_json::from_value(raw.clone())
            .map_err(|err| GatewayError::Malformed(err.to_string()))?;

        if !parsed.status.eq_ignore_ascii_case("SUCCESS") {
            let reason = parsed
                .failedreason
                .unwrap_or_else(|| "Unknown error".to_string());
            warn!(
                transaction_id = %request.transaction_id,
                reason = %reason,
                "gateway refused checkout"
            );
            return Err(GatewayError::Rejected { reason, raw });
        }

        let session_key = parsed
            .sessionkey
            .ok_or_else(|| GatewayError::Malformed("missing sessionkey".to_string()))?;
        let gateway_url = parsed
            .gateway_page_url
            .ok_or_else(|| GatewayError::Malformed("missing GatewayPageURL".to_string()))?;

        Ok(CheckoutSession {
            session_key,
            gateway_url,
            raw,
        })
    }

    async fn validate(&self, val_id: &str) -> Result<ValidationReport, GatewayError> {
        let response = self
            .http
            .get(format!("{}{VALIDATION_PATH}", self.base_url))
            .query(&[
                ("val_id", val_id),
                ("store_id", self.store_id.as_str()),
                ("store_passwd", self.store_password.as_str()),
                ("format", "json"),
            ])
            .send()
            .await
            .map_err(transport_error)?;

        let raw = Self::read_json(response).await?;
        let parsed: ValidationResponse = serde_json::from_value(raw.clone())
            .map_err(|err| GatewayError::Malformed(err.to_string()))?;

        // VALIDATED means a previous validation call already succeeded.
        let status = match parsed.status.as_str() {
            "VALID" | "VALIDATED" => ValidationStatus::Valid,
            _ => ValidationStatus::Invalid,
        };

        Ok(ValidationReport {
            status,
            transaction_id: parsed.tran_id,
            raw,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use mockito::Matcher;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    use super::SslCommerzGateway;
    use crate::config::GatewayConfig;
    use crate::gateway::{CallbackUrls, CheckoutRequest, GatewayError, PaymentGateway, ValidationStatus};
    use crate::models::payment::CustomerSnapshot;

    fn gateway(base_url: String, timeout: Duration) -> SslCommerzGateway {
        SslCommerzGateway::new(&GatewayConfig {
            store_id: "teststore".to_string(),
            store_password: "secret".to_string(),
            base_url,
            timeout,
        })
        .unwrap()
    }

    fn checkout() -> CheckoutRequest {
        CheckoutRequest {
            transaction_id: "CHOLEN_1700000000_abc".to_string(),
            amount: dec!(350.50),
            currency: "BDT".to_string(),
            ride_id: Uuid::from_u128(1),
            user_id: Uuid::from_u128(2),
            customer: CustomerSnapshot {
                name: "Rahim".to_string(),
                email: "rahim@example.com".to_string(),
                phone: "01700000000".to_string(),
            },
            pickup_location: "Gulshan".to_string(),
            dropoff_location: "Banani".to_string(),
            callbacks: CallbackUrls::under("http://localhost:3000/"),
        }
    }

    #[tokio::test]
    async fn successful_checkout_returns_session_and_gateway_url() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/gwprocess/v4/api.php")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("tran_id".into(), "CHOLEN_1700000000_abc".into()),
                Matcher::UrlEncoded("total_amount".into(), "350.50".into()),
                Matcher::UrlEncoded("value_a".into(), Uuid::from_u128(1).to_string()),
                Matcher::UrlEncoded(
                    "ipn_url".into(),
                    "http://localhost:3000/payments/ipn".into(),
                ),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"status":"SUCCESS","sessionkey":"SK123","GatewayPageURL":"https://sandbox.sslcommerz.com/pay/SK123"}"#,
            )
            .create_async()
            .await;

        let session = gateway(server.url(), Duration::from_secs(5))
            .initialize(&checkout())
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(session.session_key, "SK123");
        assert!(session.gateway_url.ends_with("/pay/SK123"));
    }

    #[tokio::test]
    async fn refused_checkout_carries_reason_and_raw_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/gwprocess/v4/api.php")
            .with_status(200)
            .with_body(r#"{"status":"FAILED","failedreason":"Invalid store"}"#)
            .create_async()
            .await;

        let err = gateway(server.url(), Duration::from_secs(5))
            .initialize(&checkout())
            .await
            .unwrap_err();

        match err {
            GatewayError::Rejected { reason, raw } => {
                assert_eq!(reason, "Invalid store");
                assert_eq!(raw["status"], "FAILED");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unparseable_body_is_malformed() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/gwprocess/v4/api.php")
            .with_status(200)
            .with_body("<html>maintenance</html>")
            .create_async()
            .await;

        let err = gateway(server.url(), Duration::from_secs(5))
            .initialize(&checkout())
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::Malformed(_)));
    }

    #[tokio::test]
    async fn failed_validation_call_keeps_credentials_out_of_the_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/validator/api/validationserverAPI.php")
            .match_query(Matcher::Any)
            .with_status(503)
            .create_async()
            .await;

        let err = gateway(server.url(), Duration::from_secs(5))
            .validate("V1")
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::Transport(_)));
        let text = err.to_string();
        assert!(text.contains("503"));
        assert!(!text.contains("store_passwd"));
        assert!(!text.contains("secret"));
        assert!(!err.raw_response().to_string().contains("secret"));
    }

    #[tokio::test]
    async fn validated_and_valid_both_count_as_valid() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/validator/api/validationserverAPI.php")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("val_id".into(), "VAL1".into()),
                Matcher::UrlEncoded("format".into(), "json".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"status":"VALIDATED","tran_id":"CHOLEN_1_x"}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/validator/api/validationserverAPI.php")
            .match_query(Matcher::UrlEncoded("val_id".into(), "VAL2".into()))
            .with_status(200)
            .with_body(r#"{"status":"INVALID_TRANSACTION"}"#)
            .create_async()
            .await;

        let client = gateway(server.url(), Duration::from_secs(5));
        let first = client.validate("VAL1").await.unwrap();
        let second = client.validate("VAL2").await.unwrap();

        assert_eq!(first.status, ValidationStatus::Valid);
        assert!(first.confirms("CHOLEN_1_x"));
        assert!(!first.confirms("CHOLEN_2_y"));
        assert_eq!(second.status, ValidationStatus::Invalid);
    }

    #[tokio::test]
    async fn silent_gateway_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let err = gateway(format!("http://{addr}"), Duration::from_millis(200))
            .validate("VAL1")
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::Timeout));
    }
}

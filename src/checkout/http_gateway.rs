use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use super::payment::{CaptureError, CaptureRequest, ChargeReceipt, PaymentGateway};

/// Charges endpoint of a Stripe-style HTTP payment gateway.
#[derive(Clone)]
pub struct HttpPaymentGateway {
    client: Client,
    base_url: String,
    secret_key: String,
}

#[derive(Debug, Deserialize)]
struct ChargeResponse {
    id: String,
    amount: i64,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: GatewayErrorBody,
}

#[derive(Debug, Default, Deserialize)]
struct GatewayErrorBody {
    #[serde(rename = "type")]
    kind: Option<String>,
    code: Option<String>,
    message: Option<String>,
    param: Option<String>,
}

impl HttpPaymentGateway {
    pub fn new(
        base_url: impl Into<String>,
        secret_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            secret_key: secret_key.into(),
        })
    }

    fn charges_url(&self) -> String {
        format!("{}/v1/charges", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn capture(&self, request: &CaptureRequest) -> Result<ChargeReceipt, CaptureError> {
        let form = [
            ("amount", request.amount.to_string()),
            ("currency", request.currency.to_ascii_lowercase()),
            ("source", request.source_token.clone()),
        ];

        // Any transport failure leaves the outcome unknown. Retrying with the
        // same idempotency key resolves it without a second charge.
        let response = self
            .client
            .post(self.charges_url())
            .bearer_auth(&self.secret_key)
            .header("Idempotency-Key", request.idempotency_key.as_str())
            .form(&form)
            .send()
            .await
            .map_err(|err| CaptureError::GatewayUnavailable(err.to_string()))?;

        let status = response.status();
        if status.is_success() {
            let charge = response
                .json::<ChargeResponse>()
                .await
                .map_err(|err| CaptureError::GatewayUnavailable(err.to_string()))?;
            return Ok(ChargeReceipt {
                external_id: charge.id,
                captured_amount: charge.amount,
            });
        }

        let body = response
            .json::<ErrorEnvelope>()
            .await
            .map(|envelope| envelope.error)
            .unwrap_or_default();
        Err(classify(status, body))
    }
}

fn classify(status: StatusCode, body: GatewayErrorBody) -> CaptureError {
    let message = body
        .message
        .clone()
        .or_else(|| body.code.clone())
        .unwrap_or_else(|| status.to_string());

    if status == StatusCode::PAYMENT_REQUIRED || body.kind.as_deref() == Some("card_error") {
        return CaptureError::CardDeclined(message);
    }

    match status {
        StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND
            if body.param.as_deref() == Some("source")
                || body.code.as_deref() == Some("resource_missing") =>
        {
            CaptureError::InvalidSource(message)
        }
        // 409 means a request with this key is still in flight on the gateway.
        StatusCode::REQUEST_TIMEOUT | StatusCode::CONFLICT | StatusCode::TOO_MANY_REQUESTS => {
            CaptureError::GatewayUnavailable(message)
        }
        s if s.is_server_error() => CaptureError::GatewayUnavailable(message),
        _ => CaptureError::Rejected(message),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use mockito::Matcher;
    use uuid::Uuid;

    use super::*;
    use crate::checkout::{payment::IdempotencyKey, snapshot::BagSnapshot};

    fn request() -> CaptureRequest {
        let snapshot = BagSnapshot::new(Uuid::new_v4(), vec![], Utc::now());
        CaptureRequest {
            amount: 2200,
            currency: "USD".into(),
            source_token: "tok_visa".into(),
            idempotency_key: IdempotencyKey::derive(&snapshot, 2200, "USD", "tok_visa", 600),
        }
    }

    fn gateway(url: String) -> HttpPaymentGateway {
        HttpPaymentGateway::new(url, "sk_test", Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn successful_charge_returns_receipt_and_sends_idempotency_key() {
        let mut server = mockito::Server::new_async().await;
        let req = request();

        let mock = server
            .mock("POST", "/v1/charges")
            .match_header("authorization", "Bearer sk_test")
            .match_header("idempotency-key", req.idempotency_key.as_str())
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("amount".into(), "2200".into()),
                Matcher::UrlEncoded("currency".into(), "usd".into()),
                Matcher::UrlEncoded("source".into(), "tok_visa".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":"ch_1","amount":2200,"currency":"usd","status":"succeeded"}"#)
            .create_async()
            .await;

        let receipt = gateway(server.url()).capture(&req).await.unwrap();

        mock.assert_async().await;
        assert_eq!(
            receipt,
            ChargeReceipt {
                external_id: "ch_1".into(),
                captured_amount: 2200
            }
        );
    }

    #[tokio::test]
    async fn declined_card_maps_to_card_declined() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/charges")
            .with_status(402)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"error":{"type":"card_error","code":"card_declined","message":"Your card was declined."}}"#,
            )
            .create_async()
            .await;

        let err = gateway(server.url()).capture(&request()).await.unwrap_err();
        assert_eq!(err, CaptureError::CardDeclined("Your card was declined.".into()));
    }

    #[tokio::test]
    async fn bad_source_maps_to_invalid_source() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/charges")
            .with_status(400)
            .with_body(
                r#"{"error":{"type":"invalid_request_error","param":"source","message":"No such token"}}"#,
            )
            .create_async()
            .await;

        let err = gateway(server.url()).capture(&request()).await.unwrap_err();
        assert!(matches!(err, CaptureError::InvalidSource(_)));
    }

    #[tokio::test]
    async fn server_error_maps_to_gateway_unavailable() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/charges")
            .with_status(503)
            .create_async()
            .await;

        let err = gateway(server.url()).capture(&request()).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn unreadable_success_body_is_retryable() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/charges")
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;

        let err = gateway(server.url()).capture(&request()).await.unwrap_err();
        assert!(matches!(err, CaptureError::GatewayUnavailable(_)));
    }

    #[test]
    fn auth_failure_is_rejected_not_retried() {
        let err = classify(StatusCode::UNAUTHORIZED, GatewayErrorBody::default());
        assert!(matches!(err, CaptureError::Rejected(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn idempotency_conflict_is_retryable() {
        let err = classify(StatusCode::CONFLICT, GatewayErrorBody::default());
        assert!(err.is_retryable());
    }
}

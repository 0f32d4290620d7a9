//! JSON-over-HTTP ledger gateway.
//!
//! Talks to a ledger front end exposing:
//! - `GET  {url}/status`
//! - `POST {url}/transfer` answering `{"Ok": <block>}` or `{"Err": <TransferError>}`
//! - `GET  {url}/blocks/{index}` answering 404 until the block is settled
//! - `POST {url}/account_balance` answering `{"e8s": <n>}`

use crate::{GatewayError, GatewayFactory, GatewayRegistry, LedgerGateway};
use async_trait::async_trait;
use ledger_types::{
	BlockIndex, ConfirmationData, Identity, ImplementationRegistry, Tokens, TransferError,
	TransferRequest,
};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::RwLock;

/// Header carrying the caller's principal on every authenticated request.
const IDENTITY_HEADER: &str = "x-ledger-identity";

/// Configuration for the HTTP gateway.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpGatewayConfig {
	/// Base URL of the ledger front end.
	pub url: String,
	/// Per-request timeout.
	#[serde(default = "default_timeout_seconds")]
	pub timeout_seconds: u64,
}

fn default_timeout_seconds() -> u64 {
	10
}

#[derive(Debug, Deserialize)]
enum TransferResponse {
	Ok(BlockIndex),
	Err(TransferError),
}

#[derive(Debug, Serialize)]
struct BalanceRequest<'a> {
	account: &'a str,
}

/// HTTP ledger gateway.
pub struct HttpLedgerGateway {
	client: reqwest::Client,
	base_url: String,
	identity: RwLock<Option<Identity>>,
}

impl HttpLedgerGateway {
	pub fn new(config: HttpGatewayConfig) -> Result<Self, GatewayError> {
		let client = reqwest::Client::builder()
			.timeout(Duration::from_secs(config.timeout_seconds))
			.build()
			.map_err(|e| GatewayError::Configuration(format!("Failed to build client: {}", e)))?;

		Ok(Self {
			client,
			base_url: config.url.trim_end_matches('/').to_string(),
			identity: RwLock::new(None),
		})
	}

	fn endpoint(&self, path: &str) -> String {
		format!("{}/{}", self.base_url, path)
	}

	async fn principal(&self) -> Result<String, GatewayError> {
		self.identity
			.read()
			.await
			.as_ref()
			.map(|identity| identity.principal.clone())
			.ok_or(GatewayError::NotConnected)
	}
}

fn network_error(e: reqwest::Error) -> GatewayError {
	GatewayError::Network(e.to_string())
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, GatewayError> {
	let status = response.status();
	if status.is_success() {
		return Ok(response);
	}
	let body = response.text().await.unwrap_or_default();
	if status.is_server_error() {
		Err(GatewayError::Network(format!("HTTP {}: {}", status, body)))
	} else {
		Err(GatewayError::InvalidResponse(format!(
			"HTTP {}: {}",
			status, body
		)))
	}
}

#[async_trait]
impl LedgerGateway for HttpLedgerGateway {
	async fn connect(&self, identity: &Identity) -> Result<(), GatewayError> {
		let response = self
			.client
			.get(self.endpoint("status"))
			.header(IDENTITY_HEADER, &identity.principal)
			.send()
			.await
			.map_err(network_error)?;
		ensure_success(response).await?;

		*self.identity.write().await = Some(identity.clone());
		tracing::info!(url = %self.base_url, identity = %identity, "Connected to ledger");
		Ok(())
	}

	async fn submit_transfer(&self, request: &TransferRequest) -> Result<BlockIndex, GatewayError> {
		let principal = self.principal().await?;
		let response = self
			.client
			.post(self.endpoint("transfer"))
			.header(IDENTITY_HEADER, principal)
			.json(request)
			.send()
			.await
			.map_err(network_error)?;
		let response = ensure_success(response).await?;

		match response
			.json::<TransferResponse>()
			.await
			.map_err(|e| GatewayError::InvalidResponse(e.to_string()))?
		{
			TransferResponse::Ok(index) => Ok(index),
			TransferResponse::Err(e) => Err(GatewayError::Rejected(e)),
		}
	}

	async fn check_confirmation(
		&self,
		index: BlockIndex,
	) -> Result<Option<ConfirmationData>, GatewayError> {
		let principal = self.principal().await?;
		let response = self
			.client
			.get(self.endpoint(&format!("blocks/{}", index)))
			.header(IDENTITY_HEADER, principal)
			.send()
			.await
			.map_err(network_error)?;

		if response.status() == StatusCode::NOT_FOUND {
			return Ok(None);
		}
		let response = ensure_success(response).await?;
		let data = response
			.json::<ConfirmationData>()
			.await
			.map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
		Ok(Some(data))
	}

	async fn get_balance(&self, account: &str) -> Result<Tokens, GatewayError> {
		let principal = self.principal().await?;
		let response = self
			.client
			.post(self.endpoint("account_balance"))
			.header(IDENTITY_HEADER, principal)
			.json(&BalanceRequest { account })
			.send()
			.await
			.map_err(network_error)?;
		let response = ensure_success(response).await?;
		response
			.json::<Tokens>()
			.await
			.map_err(|e| GatewayError::InvalidResponse(e.to_string()))
	}
}

/// Factory function to create an HTTP gateway from configuration.
///
/// Configuration parameters:
/// - `url`: Base URL of the ledger front end (required)
/// - `timeout_seconds`: Per-request timeout (default: 10)
pub fn create_gateway(config: &toml::Value) -> Result<Box<dyn LedgerGateway>, GatewayError> {
	let http_config: HttpGatewayConfig = config
		.clone()
		.try_into()
		.map_err(|e| GatewayError::Configuration(format!("Invalid http gateway config: {}", e)))?;

	if !http_config.url.starts_with("http://") && !http_config.url.starts_with("https://") {
		return Err(GatewayError::Configuration(format!(
			"url must start with http:// or https://, got '{}'",
			http_config.url
		)));
	}
	if http_config.timeout_seconds == 0 {
		return Err(GatewayError::Configuration(
			"timeout_seconds must be greater than zero".into(),
		));
	}

	Ok(Box::new(HttpLedgerGateway::new(http_config)?))
}

/// Registry for the HTTP gateway implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "http";
	type Factory = GatewayFactory;

	fn factory() -> Self::Factory {
		create_gateway
	}
}

impl GatewayRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;
	use wiremock::matchers::{body_json, body_partial_json, header, method, path};
	use wiremock::{Mock, MockServer, ResponseTemplate};

	fn gateway(url: &str) -> HttpLedgerGateway {
		HttpLedgerGateway::new(HttpGatewayConfig {
			url: url.to_string(),
			timeout_seconds: 1,
		})
		.unwrap()
	}

	#[test]
	fn test_factory_config() {
		let config: toml::Value = toml::from_str("url = \"http://localhost:8080/\"").unwrap();
		assert!(create_gateway(&config).is_ok());

		let config: toml::Value = toml::from_str("url = \"localhost:8080\"").unwrap();
		assert!(matches!(
			create_gateway(&config),
			Err(GatewayError::Configuration(_))
		));

		let config: toml::Value = toml::from_str("timeout_seconds = 5").unwrap();
		assert!(matches!(
			create_gateway(&config),
			Err(GatewayError::Configuration(_))
		));
	}

	#[test]
	fn test_endpoint_trims_trailing_slash() {
		let gateway = gateway("http://localhost:8080/");
		assert_eq!(gateway.endpoint("status"), "http://localhost:8080/status");
	}

	#[test]
	fn test_transfer_response_shape() {
		let ok: TransferResponse = serde_json::from_str(r#"{"Ok": 123}"#).unwrap();
		assert!(matches!(ok, TransferResponse::Ok(123)));

		let err: TransferResponse =
			serde_json::from_str(r#"{"Err": {"InsufficientFunds": {"balance": {"e8s": 500000}}}}"#)
				.unwrap();
		assert!(matches!(
			err,
			TransferResponse::Err(TransferError::InsufficientFunds { balance }) if balance.e8s == 500_000
		));
	}

	#[tokio::test]
	async fn test_calls_before_connect_fail() {
		let gateway = gateway("http://127.0.0.1:9");
		let request = TransferRequest {
			to: "account-id".into(),
			amount: Tokens::from_e8s(1),
			fee: Tokens::from_e8s(10_000),
			memo: 0,
			from_subaccount: None,
			created_at_time: None,
		};
		assert!(matches!(
			gateway.submit_transfer(&request).await,
			Err(GatewayError::NotConnected)
		));
		assert!(matches!(
			gateway.check_confirmation(1).await,
			Err(GatewayError::NotConnected)
		));
	}

	async fn connected(server: &MockServer) -> HttpLedgerGateway {
		Mock::given(method("GET"))
			.and(path("/status"))
			.and(header(IDENTITY_HEADER, "aaaaa-aa"))
			.respond_with(ResponseTemplate::new(200))
			.mount(server)
			.await;
		let gateway = gateway(&server.uri());
		gateway.connect(&Identity::new("aaaaa-aa")).await.unwrap();
		gateway
	}

	fn transfer_request(amount: u64) -> TransferRequest {
		TransferRequest {
			to: "account-id".into(),
			amount: Tokens::from_e8s(amount),
			fee: Tokens::from_e8s(10_000),
			memo: 7,
			from_subaccount: None,
			created_at_time: Some(1_700_000_000_000_000_000),
		}
	}

	#[tokio::test]
	async fn test_submit_transfer_accepted() {
		let server = MockServer::start().await;
		let gateway = connected(&server).await;
		Mock::given(method("POST"))
			.and(path("/transfer"))
			.and(header(IDENTITY_HEADER, "aaaaa-aa"))
			.and(body_partial_json(json!({
				"to": "account-id",
				"amount": {"e8s": 1_000_000},
				"memo": 7,
			})))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({"Ok": 123})))
			.expect(1)
			.mount(&server)
			.await;

		let index = gateway
			.submit_transfer(&transfer_request(1_000_000))
			.await
			.unwrap();
		assert_eq!(index, 123);
	}

	#[tokio::test]
	async fn test_submit_transfer_rejected() {
		let server = MockServer::start().await;
		let gateway = connected(&server).await;
		Mock::given(method("POST"))
			.and(path("/transfer"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({
				"Err": {"InsufficientFunds": {"balance": {"e8s": 500_000}}}
			})))
			.mount(&server)
			.await;

		let result = gateway.submit_transfer(&transfer_request(1_000_000)).await;
		assert!(matches!(
			result,
			Err(GatewayError::Rejected(TransferError::InsufficientFunds { balance })) if balance.e8s == 500_000
		));
	}

	#[tokio::test]
	async fn test_status_codes_are_mapped() {
		let server = MockServer::start().await;
		let gateway = connected(&server).await;
		Mock::given(method("POST"))
			.and(path("/transfer"))
			.respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
			.mount(&server)
			.await;
		Mock::given(method("POST"))
			.and(path("/account_balance"))
			.respond_with(ResponseTemplate::new(400).set_body_string("bad account"))
			.mount(&server)
			.await;

		let result = gateway.submit_transfer(&transfer_request(1)).await;
		assert!(matches!(result, Err(GatewayError::Network(msg)) if msg.contains("overloaded")));

		let result = gateway.get_balance("account-id").await;
		assert!(matches!(result, Err(GatewayError::InvalidResponse(_))));
	}

	#[tokio::test]
	async fn test_check_confirmation() {
		let server = MockServer::start().await;
		let gateway = connected(&server).await;
		Mock::given(method("GET"))
			.and(path("/blocks/5"))
			.and(header(IDENTITY_HEADER, "aaaaa-aa"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({
				"block_index": 5,
				"settled_at": 1_700_000_000_000u64,
			})))
			.mount(&server)
			.await;
		Mock::given(method("GET"))
			.and(path("/blocks/6"))
			.respond_with(ResponseTemplate::new(404))
			.mount(&server)
			.await;

		let confirmation = gateway.check_confirmation(5).await.unwrap().unwrap();
		assert_eq!(confirmation.block_index, 5);
		assert_eq!(confirmation.settled_at, Some(1_700_000_000_000));

		assert!(gateway.check_confirmation(6).await.unwrap().is_none());
	}

	#[tokio::test]
	async fn test_get_balance() {
		let server = MockServer::start().await;
		let gateway = connected(&server).await;
		Mock::given(method("POST"))
			.and(path("/account_balance"))
			.and(header(IDENTITY_HEADER, "aaaaa-aa"))
			.and(body_json(json!({"account": "account-id"})))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({"e8s": 250_000})))
			.mount(&server)
			.await;

		let balance = gateway.get_balance("account-id").await.unwrap();
		assert_eq!(balance, Tokens::from_e8s(250_000));
	}

	#[tokio::test]
	async fn test_connect_requires_healthy_status() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path("/status"))
			.respond_with(ResponseTemplate::new(500))
			.mount(&server)
			.await;

		let gateway = gateway(&server.uri());
		let result = gateway.connect(&Identity::new("aaaaa-aa")).await;
		assert!(matches!(result, Err(GatewayError::Network(_))));
		assert!(matches!(
			gateway.get_balance("account-id").await,
			Err(GatewayError::NotConnected)
		));
	}

	#[tokio::test]
	async fn test_unreachable_ledger_is_network_error() {
		let gateway = gateway("http://127.0.0.1:9");
		let result = gateway.connect(&Identity::new("aaaaa-aa")).await;
		assert!(matches!(result, Err(GatewayError::Network(_))));
	}
}

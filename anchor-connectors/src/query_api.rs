//! Query API Client
//!
//! Read-only HTTP client for the backend that aggregates indexed engine
//! events:
//! - Per-user position data and transaction history
//! - Protocol-wide risk metrics for the dashboard
//! - Health-factor projections ("what if I mint/burn/deposit/redeem X")
//!
//! All token quantities travel as base-10 integer strings at 18-decimal
//! fixed point (collateral amounts at the token's own precision).

use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use tracing::debug;

use anchor_domain::{HealthFactor, HealthFactorProjection, ScaledAmount};
use anchor_exec::{ExecError, ExecResult, ProjectionPort, ProjectionQuery};

// =============================================================================
// Constants
// =============================================================================

/// Default request timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

// =============================================================================
// Errors
// =============================================================================

/// Errors that can occur in the query API client.
#[derive(Debug, Clone, Error)]
pub enum QueryApiError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    /// API returned an error body
    #[error("Query API error (HTTP {status}): {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// `error` field of the response body
        message: String,
    },

    /// Failed to parse response
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// Request timed out
    #[error("Request timed out")]
    Timeout,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

// =============================================================================
// Response types
// =============================================================================

fn parse_base_units(field: &str, value: &str) -> Result<ScaledAmount, QueryApiError> {
    U256::from_str_radix(value.trim(), 10)
        .map(ScaledAmount::from_base_units)
        .map_err(|e| QueryApiError::ParseError(format!("{}: {:?} ({})", field, value, e)))
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: String,
}

/// Collateral position of a user in one asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollateralDeposited {
    /// Asset symbol
    pub asset: String,
    /// Amount at the asset's precision
    pub amount: String,
    /// USD value, 18 decimals
    pub value_usd: String,
}

/// `GET /api/user/{address}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserData {
    /// Stablecoin debt
    pub total_debt: String,
    /// Collateral value in USD
    pub collateral_value_usd: String,
    /// Stablecoin still mintable
    pub max_mintable: String,
    /// Current health factor, 18 decimals
    pub current_health_factor: String,
    /// Per-asset collateral
    #[serde(default)]
    pub collateral_deposited: Vec<CollateralDeposited>,
}

impl UserData {
    /// Debt as a fixed-point amount
    pub fn total_debt(&self) -> Result<ScaledAmount, QueryApiError> {
        parse_base_units("total_debt", &self.total_debt)
    }

    /// Collateral value as a fixed-point amount
    pub fn collateral_value(&self) -> Result<ScaledAmount, QueryApiError> {
        parse_base_units("collateral_value_usd", &self.collateral_value_usd)
    }

    /// Max mintable as a fixed-point amount
    pub fn max_mintable(&self) -> Result<ScaledAmount, QueryApiError> {
        parse_base_units("max_mintable", &self.max_mintable)
    }

    /// Current health factor
    pub fn health_factor(&self) -> Result<HealthFactor, QueryApiError> {
        parse_base_units("current_health_factor", &self.current_health_factor)
            .map(|raw| HealthFactor::from_raw(raw.as_u256()))
    }
}

/// Body of every `calculate-*` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthFactorCalculation {
    /// Projected health factor, 18 decimals
    pub health_factor_after: String,
    /// Projected debt
    pub new_debt: String,
    /// Projected collateral value in USD
    pub new_collateral_value: String,
}

impl HealthFactorCalculation {
    /// Convert to the domain projection.
    pub fn to_projection(&self) -> Result<HealthFactorProjection, QueryApiError> {
        let health_factor = parse_base_units("healthFactorAfter", &self.health_factor_after)?;
        Ok(HealthFactorProjection {
            health_factor: HealthFactor::from_raw(health_factor.as_u256()),
            projected_debt: parse_base_units("newDebt", &self.new_debt)?,
            projected_collateral_value: parse_base_units(
                "newCollateralValue",
                &self.new_collateral_value,
            )?,
        })
    }
}

/// History entry kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    /// Collateral deposit
    Deposit,
    /// Stablecoin mint
    Mint,
    /// Stablecoin burn
    Burn,
    /// Liquidation
    Liquidation,
    /// Collateral redeem
    Redeem,
}

/// History entry status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    /// Mined
    Completed,
    /// Broadcast, not mined
    Pending,
    /// Reverted
    Failed,
}

/// One indexed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Event ID
    pub id: String,
    /// Kind
    #[serde(rename = "type")]
    pub kind: TransactionType,
    /// Amount in base units
    pub amount: String,
    /// Collateral asset, when relevant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset: Option<String>,
    /// Block timestamp
    pub timestamp: String,
    /// Transaction hash
    pub tx_hash: String,
    /// Status
    pub status: TransactionStatus,
}

/// `GET /api/history/{address}`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryData {
    /// Deposits and redeems
    #[serde(default)]
    pub deposits: Vec<Transaction>,
    /// Mints and burns
    #[serde(default)]
    pub mint_burn: Vec<Transaction>,
    /// Liquidations involving the user
    #[serde(default)]
    pub liquidations: Vec<Transaction>,
}

/// An account below the minimum health factor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiquidatableUser {
    /// Account
    pub address: String,
    /// Health factor, 18 decimals
    pub health_factor: String,
    /// Collateral in USD
    pub collateral_usd: String,
    /// Debt in USD
    pub debt_usd: String,
    /// Debt a liquidator can cover
    pub liquidation_amount: String,
}

/// Share of total collateral held in one asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollateralBreakdown {
    /// Asset symbol
    pub asset: String,
    /// Amount in base units
    pub amount: String,
    /// USD value
    pub value_usd: String,
    /// Percentage of total collateral value
    pub percentage: Decimal,
}

/// Total collateral locked in the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TotalCollateral {
    /// USD value
    pub value: String,
    /// Per-asset breakdown
    #[serde(default)]
    pub breakdown: Vec<CollateralBreakdown>,
}

/// Stablecoin supply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StableSupply {
    /// Total minted
    pub total: String,
    /// In circulation
    pub circulating: String,
    /// Collateral backing ratio
    pub backing: Decimal,
}

/// Aggregate protocol risk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolHealth {
    /// Mean health factor across users
    pub average_health_factor: Decimal,
    /// Users below the at-risk tier
    pub users_at_risk: u64,
    /// Users with an open position
    pub total_users: u64,
    /// Collateral value over debt
    pub collateralization_ratio: Decimal,
}

/// `GET /api/metrics/dashboard`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardMetrics {
    /// Liquidation candidates
    #[serde(default)]
    pub liquidatable_users: Vec<LiquidatableUser>,
    /// Collateral totals
    pub total_collateral: TotalCollateral,
    /// Stablecoin supply
    pub stable_supply: StableSupply,
    /// Protocol health
    pub protocol_health: ProtocolHealth,
}

// =============================================================================
// Request types
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MintRequest {
    address: String,
    mint_amount: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BurnRequest {
    address: String,
    burn_amount: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DepositRequest {
    address: String,
    token_address: String,
    deposit_amount: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RedeemRequest {
    address: String,
    token_address: String,
    redeem_amount: String,
}

// =============================================================================
// Query API Client
// =============================================================================

/// Read-only query API client.
pub struct QueryApiClient {
    /// HTTP client
    client: Client,
    /// Base URL, without trailing slash
    base_url: String,
    /// Per-request timeout
    request_timeout: Duration,
}

impl QueryApiClient {
    /// Create a client for `base_url` (e.g. `http://localhost:8080`).
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client: Client::new(), base_url, request_timeout }
    }

    /// Base URL in use
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn read_body<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        endpoint: &str,
    ) -> Result<T, QueryApiError> {
        let response = timeout(self.request_timeout, request.send())
            .await
            .map_err(|_| QueryApiError::Timeout)?
            .map_err(|e| QueryApiError::RequestFailed(e.to_string()))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| QueryApiError::ParseError(e.to_string()))?;

        debug!(endpoint, status = status.as_u16(), "Query API response");

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|err| err.error)
                .unwrap_or(body);
            return Err(QueryApiError::ApiError { status: status.as_u16(), message });
        }

        serde_json::from_str(&body).map_err(|e| QueryApiError::ParseError(e.to_string()))
    }

    async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, QueryApiError> {
        let url = format!("{}{}", self.base_url, endpoint);
        self.read_body(self.client.get(&url), endpoint).await
    }

    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T, QueryApiError> {
        let url = format!("{}{}", self.base_url, endpoint);
        self.read_body(self.client.post(&url).json(body), endpoint).await
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Service liveness.
    ///
    /// # Endpoint
    ///
    /// `GET /api/status`
    pub async fn status(&self) -> Result<String, QueryApiError> {
        let response: StatusResponse = self.get("/api/status").await?;
        Ok(response.status)
    }

    /// Position summary for `user`.
    ///
    /// # Endpoint
    ///
    /// `GET /api/user/{address}`
    pub async fn user_data(&self, user: Address) -> Result<UserData, QueryApiError> {
        self.get(&format!("/api/user/{}", user)).await
    }

    /// Transaction history for `user`.
    ///
    /// # Endpoint
    ///
    /// `GET /api/history/{address}`
    pub async fn history(&self, user: Address) -> Result<HistoryData, QueryApiError> {
        self.get(&format!("/api/history/{}", user)).await
    }

    /// Protocol-wide risk metrics.
    ///
    /// # Endpoint
    ///
    /// `GET /api/metrics/dashboard`
    pub async fn dashboard_metrics(&self) -> Result<DashboardMetrics, QueryApiError> {
        self.get("/api/metrics/dashboard").await
    }

    // =========================================================================
    // Health-factor projections
    // =========================================================================

    /// `POST /api/ausd-engine/calculate-mint`
    pub async fn calculate_mint(
        &self,
        user: Address,
        amount: ScaledAmount,
    ) -> Result<HealthFactorCalculation, QueryApiError> {
        let body = MintRequest { address: user.to_string(), mint_amount: amount.to_string() };
        self.post("/api/ausd-engine/calculate-mint", &body).await
    }

    /// `POST /api/ausd-engine/calculate-burn`
    pub async fn calculate_burn(
        &self,
        user: Address,
        amount: ScaledAmount,
    ) -> Result<HealthFactorCalculation, QueryApiError> {
        let body = BurnRequest { address: user.to_string(), burn_amount: amount.to_string() };
        self.post("/api/ausd-engine/calculate-burn", &body).await
    }

    /// `POST /api/ausd-engine/calculate-deposit`
    pub async fn calculate_deposit(
        &self,
        user: Address,
        token: Address,
        amount: ScaledAmount,
    ) -> Result<HealthFactorCalculation, QueryApiError> {
        let body = DepositRequest {
            address: user.to_string(),
            token_address: token.to_string(),
            deposit_amount: amount.to_string(),
        };
        self.post("/api/ausd-engine/calculate-deposit", &body).await
    }

    /// `POST /api/ausd-engine/calculate-redeem`
    pub async fn calculate_redeem(
        &self,
        user: Address,
        token: Address,
        amount: ScaledAmount,
    ) -> Result<HealthFactorCalculation, QueryApiError> {
        let body = RedeemRequest {
            address: user.to_string(),
            token_address: token.to_string(),
            redeem_amount: amount.to_string(),
        };
        self.post("/api/ausd-engine/calculate-redeem", &body).await
    }
}

#[async_trait]
impl ProjectionPort for QueryApiClient {
    async fn project(
        &self,
        account: Address,
        query: &ProjectionQuery,
    ) -> ExecResult<HealthFactorProjection> {
        let calculation = match *query {
            ProjectionQuery::Mint { amount } => self.calculate_mint(account, amount).await,
            ProjectionQuery::Burn { amount } => self.calculate_burn(account, amount).await,
            ProjectionQuery::Deposit { token, amount } => {
                self.calculate_deposit(account, token, amount).await
            }
            ProjectionQuery::Redeem { token, amount } => {
                self.calculate_redeem(account, token, amount).await
            }
        };

        calculation
            .and_then(|c| c.to_projection())
            .map_err(|e| ExecError::Query(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Path;
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::{json, Value};

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn client(base_url: String) -> QueryApiClient {
        QueryApiClient::new(base_url, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    #[tokio::test]
    async fn test_status() {
        let router = Router::new().route("/api/status", get(|| async { Json(json!({"status": "ok"})) }));
        let client = client(serve(router).await);

        assert_eq!(client.status().await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn test_user_data_parses_amounts() {
        let router = Router::new().route(
            "/api/user/:user",
            get(|Path(user): Path<String>| async move {
                assert!(user.starts_with("0x"));
                Json(json!({
                    "total_debt": "50000000000000000000",
                    "collateral_value_usd": "200000000000000000000",
                    "max_mintable": "50000000000000000000",
                    "current_health_factor": "2000000000000000000",
                    "collateral_deposited": [
                        {"asset": "WETH", "amount": "100000000000000000", "valueUsd": "200000000000000000000"}
                    ]
                }))
            }),
        );
        let client = client(serve(router).await);

        let data = client.user_data(Address::repeat_byte(0xab)).await.unwrap();
        assert_eq!(data.total_debt().unwrap().to_decimal_string(18, 4), "50");
        assert_eq!(data.health_factor().unwrap().to_string(), "2");
        assert_eq!(data.collateral_deposited[0].asset, "WETH");
    }

    #[tokio::test]
    async fn test_calculate_mint_sends_base_units() {
        let router = Router::new().route(
            "/api/ausd-engine/calculate-mint",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["mintAmount"], "10000000000000000000");
                Json(json!({
                    "healthFactorAfter": "1500000000000000000",
                    "newDebt": "60000000000000000000",
                    "newCollateralValue": "200000000000000000000"
                }))
            }),
        );
        let client = client(serve(router).await);
        let amount = ScaledAmount::from_decimal_str("10", 18).unwrap();

        let projection = client
            .project(Address::repeat_byte(1), &ProjectionQuery::Mint { amount })
            .await
            .unwrap();

        assert_eq!(projection.health_factor.to_string(), "1.5");
        assert_eq!(projection.projected_debt.to_decimal_string(18, 4), "60");
    }

    #[tokio::test]
    async fn test_calculate_redeem_sends_token() {
        let token = Address::repeat_byte(0x11);
        let router = Router::new().route(
            "/api/ausd-engine/calculate-redeem",
            post(move |Json(body): Json<Value>| async move {
                assert_eq!(body["tokenAddress"], token.to_string());
                assert_eq!(body["redeemAmount"], "500000000000000000");
                Json(json!({
                    "healthFactorAfter": "1000000000000000000",
                    "newDebt": "50000000000000000000",
                    "newCollateralValue": "100000000000000000000"
                }))
            }),
        );
        let client = client(serve(router).await);
        let amount = ScaledAmount::from_decimal_str("0.5", 18).unwrap();

        let calc = client.calculate_redeem(Address::repeat_byte(1), token, amount).await.unwrap();
        assert_eq!(calc.new_collateral_value, "100000000000000000000");
    }

    #[tokio::test]
    async fn test_error_body_is_surfaced() {
        let router = Router::new().route(
            "/api/ausd-engine/calculate-burn",
            post(|| async {
                (StatusCode::BAD_REQUEST, Json(json!({"error": "invalid burn amount"})))
            }),
        );
        let client = client(serve(router).await);

        let err = client
            .calculate_burn(Address::repeat_byte(1), ScaledAmount::ZERO)
            .await
            .unwrap_err();
        match err {
            QueryApiError::ApiError { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "invalid burn amount");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_projection_failure_maps_to_query_error() {
        let router = Router::new().route(
            "/api/ausd-engine/calculate-deposit",
            post(|| async { Json(json!({"healthFactorAfter": "not a number", "newDebt": "0", "newCollateralValue": "0"})) }),
        );
        let client = client(serve(router).await);

        let query = ProjectionQuery::Deposit {
            token: Address::repeat_byte(0x11),
            amount: ScaledAmount::from_decimal_str("1", 18).unwrap(),
        };
        let err = client.project(Address::repeat_byte(1), &query).await.unwrap_err();
        assert!(matches!(err, ExecError::Query(_)));
    }

    #[tokio::test]
    async fn test_history_and_metrics() {
        let router = Router::new()
            .route(
                "/api/history/:user",
                get(|| async {
                    Json(json!({
                        "deposits": [{
                            "id": "1", "type": "deposit", "amount": "1000", "asset": "WETH",
                            "timestamp": "2024-01-01T00:00:00Z", "txHash": "0xabc", "status": "completed"
                        }],
                        "mintBurn": [],
                        "liquidations": []
                    }))
                }),
            )
            .route(
                "/api/metrics/dashboard",
                get(|| async {
                    Json(json!({
                        "liquidatableUsers": [],
                        "totalCollateral": {"value": "0", "breakdown": []},
                        "stableSupply": {"total": "0", "circulating": "0", "backing": 1.5},
                        "protocolHealth": {
                            "averageHealthFactor": 2.25, "usersAtRisk": 1,
                            "totalUsers": 10, "collateralizationRatio": 180.5
                        }
                    }))
                }),
            );
        let client = client(serve(router).await);

        let history = client.history(Address::repeat_byte(1)).await.unwrap();
        assert_eq!(history.deposits.len(), 1);
        assert_eq!(history.deposits[0].kind, TransactionType::Deposit);
        assert_eq!(history.deposits[0].status, TransactionStatus::Completed);

        let metrics = client.dashboard_metrics().await.unwrap();
        assert_eq!(metrics.protocol_health.total_users, 10);
        assert_eq!(metrics.protocol_health.average_health_factor.to_string(), "2.25");
    }
}

use axum::{
    Json, Router,
    http::StatusCode,
    routing::{get, post},
};
use cl_ledger::LedgerError;
use cl_rates::{RateProvider, RateTable};
use cl_storage::{InMemoryLedger, LedgerStore};
use cl_wallet_core::LedgerCore;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

mod auth;
mod bookmarks;
mod db;
mod notify;
mod rates;
mod retry;
mod wallet;
mod withdrawals;

use notify::{HttpWithdrawalCallback, WithdrawalCallback};

#[derive(Debug, Serialize)]
struct HealthResponse {
    service: &'static str,
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct VersionResponse {
    service: &'static str,
    version: &'static str,
}

#[derive(Debug, Serialize)]
pub(crate) struct ErrorResponse {
    pub(crate) error: String,
    pub(crate) code: &'static str,
}

pub(crate) type ApiError = (StatusCode, Json<ErrorResponse>);
pub(crate) type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) core: LedgerCore<dyn LedgerStore>,
    pub(crate) rates: Arc<RateProvider>,
    pub(crate) admin_jwt_secret: Option<Arc<str>>,
    pub(crate) callback: Arc<dyn WithdrawalCallback>,
}

struct Config {
    port: u16,
    database_url: Option<String>,
    migrations_dir: String,
    admin_jwt_secret: Option<String>,
    withdrawal_callback_url: Option<String>,
}

impl Config {
    fn from_env() -> Self {
        let port = std::env::var("LEDGER_PORT")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(8080);

        Self {
            port,
            database_url: non_empty_env("LEDGER_DATABASE_URL"),
            migrations_dir: std::env::var("LEDGER_MIGRATIONS_DIR")
                .unwrap_or_else(|_| "./migrations/postgres".to_owned()),
            admin_jwt_secret: non_empty_env("LEDGER_ADMIN_JWT_SECRET"),
            withdrawal_callback_url: non_empty_env("LEDGER_WITHDRAWAL_CALLBACK_URL"),
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env();

    let store: Arc<dyn LedgerStore> = match &config.database_url {
        Some(database_url) => {
            let repo = db::PostgresRepository::connect(database_url).await?;
            match repo.run_migrations_from_dir(&config.migrations_dir).await {
                Ok(applied) => info!("applied {applied} migration files"),
                Err(err) => warn!("skipping migrations: {err:#}"),
            }
            Arc::new(repo)
        }
        None => {
            warn!("LEDGER_DATABASE_URL not set, running on the in-memory store");
            Arc::new(InMemoryLedger::new())
        }
    };

    if config.admin_jwt_secret.is_none() {
        warn!("LEDGER_ADMIN_JWT_SECRET not set, admin endpoints are disabled");
    }

    let rates = Arc::new(RateProvider::new(RateTable::default()));
    let rate_source = rates::StoreRateSource::new(Arc::clone(&store));
    let table = rates.refresh(&rate_source).await;
    info!("coin rate in effect: {} FCFA per coin", table.fcfa_per_coin());

    let state = AppState {
        core: LedgerCore::new(store),
        rates,
        admin_jwt_secret: config.admin_jwt_secret.map(Arc::from),
        callback: Arc::new(HttpWithdrawalCallback::new(
            config.withdrawal_callback_url.clone(),
        )),
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("ledger-service listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(state)).await?;

    Ok(())
}

fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/version", get(version))
        .route("/wallet/{user_id}/balances", get(wallet::wallet_balances))
        .route("/wallet/{user_id}/balance", get(wallet::wallet_total))
        .route("/wallet/{user_id}/debit", post(wallet::wallet_debit))
        .route("/wallet/{user_id}/credit", post(wallet::wallet_credit))
        .route(
            "/wallet/{user_id}/transactions",
            get(wallet::wallet_transactions),
        )
        .route("/rates", get(rates::current_rate))
        .route("/rates/refresh", post(rates::refresh_rate))
        .route(
            "/withdrawals/schedule",
            get(withdrawals::get_schedule).put(withdrawals::put_schedule),
        )
        .route("/withdrawals", post(withdrawals::submit).get(withdrawals::list))
        .route("/withdrawals/{id}", get(withdrawals::get_one))
        .route("/withdrawals/{id}/status", post(withdrawals::decide))
        .route("/bookmarks/toggle", post(bookmarks::toggle))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        service: "ledger-service",
        status: "ok",
    })
}

async fn version() -> Json<VersionResponse> {
    Json(VersionResponse {
        service: "ledger-service",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub(crate) fn bad_request(message: &str) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.to_owned(),
            code: "bad_request",
        }),
    )
}

pub(crate) fn unauthorized(message: &str) -> ApiError {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse {
            error: message.to_owned(),
            code: "unauthorized",
        }),
    )
}

pub(crate) fn not_found(message: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: message.to_owned(),
            code: "not_found",
        }),
    )
}

pub(crate) fn internal_error(err: impl std::fmt::Display) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: err.to_string(),
            code: "internal",
        }),
    )
}

/// Maps the domain error taxonomy onto HTTP. Business rejections are 409
/// with a machine-readable code so clients can branch without parsing
/// the message.
pub(crate) fn ledger_error(err: LedgerError) -> ApiError {
    match err {
        LedgerError::InsufficientBalance {
            requested,
            available,
        } => (
            StatusCode::CONFLICT,
            Json(ErrorResponse {
                error: format!("insufficient balance: requested {requested}, available {available}"),
                code: "insufficient_balance",
            }),
        ),
        LedgerError::InvalidAmount => bad_request("amount must be greater than zero"),
        LedgerError::InvalidKind { kind } => {
            bad_request(&format!("{kind} is not valid for this operation"))
        }
        LedgerError::InvalidTransition { from, to } => (
            StatusCode::CONFLICT,
            Json(ErrorResponse {
                error: format!(
                    "invalid withdrawal status transition: {} -> {}",
                    from.as_str(),
                    to.as_str()
                ),
                code: "invalid_transition",
            }),
        ),
        LedgerError::WithdrawalsClosed { next_open } => {
            let error = match next_open {
                Some(date) => format!("withdrawals are closed today; next open date is {date}"),
                None => "withdrawals are closed; no schedule is configured".to_owned(),
            };
            (
                StatusCode::CONFLICT,
                Json(ErrorResponse {
                    error,
                    code: "withdrawals_closed",
                }),
            )
        }
        LedgerError::WithdrawalNotFound(id) => {
            not_found(&format!("withdrawal request not found: {id}"))
        }
        LedgerError::Store(err) => internal_error(format!("{err:#}")),
    }
}


#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use serde::de::DeserializeOwned;

    pub(crate) const TEST_ADMIN_SECRET: &str = "test-admin-secret";

    /// Deserializable mirror of [`crate::ErrorResponse`] for assertions.
    #[derive(Debug, serde::Deserialize)]
    pub(crate) struct ErrorBody {
        #[allow(dead_code)]
        pub(crate) error: String,
        pub(crate) code: String,
    }

    pub(crate) fn test_state() -> (AppState, Arc<InMemoryLedger>) {
        let store = Arc::new(InMemoryLedger::new());
        let state = AppState {
            core: LedgerCore::new(store.clone() as Arc<dyn LedgerStore>),
            rates: Arc::new(RateProvider::default()),
            admin_jwt_secret: Some(Arc::from(TEST_ADMIN_SECRET)),
            callback: Arc::new(HttpWithdrawalCallback::new(None)),
        };
        (state, store)
    }

    pub(crate) fn admin_token() -> String {
        use jsonwebtoken::{EncodingKey, Header, encode};

        #[derive(serde::Serialize)]
        struct Claims {
            sub: String,
            roles: Vec<String>,
            exp: u64,
        }

        encode(
            &Header::default(),
            &Claims {
                sub: "admin-1".to_owned(),
                roles: vec!["ledger-admin".to_owned()],
                exp: 4_102_444_800, // 2100-01-01
            },
            &EncodingKey::from_secret(TEST_ADMIN_SECRET.as_bytes()),
        )
        .unwrap()
    }

    pub(crate) fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    pub(crate) fn json_request(
        method: &str,
        uri: &str,
        body: &impl serde::Serialize,
        admin: bool,
    ) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        if admin {
            builder = builder.header("authorization", format!("Bearer {}", admin_token()));
        }
        builder
            .body(Body::from(serde_json::to_vec(body).unwrap()))
            .unwrap()
    }

    pub(crate) async fn read_json<T: DeserializeOwned>(response: axum::response::Response) -> T {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap_or_else(|err| {
            panic!("bad response body: {err}: {}", String::from_utf8_lossy(&bytes))
        })
    }
}

use axum::{
    async_trait,
    extract::{FromRequestParts, Query, State},
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};
use uuid::Uuid;

use super::AppState;
use crate::alerts::check_price_alert;
use crate::auth::Session;
use crate::error::Error;
use crate::indicators::IndicatorFrame;
use crate::ml::ForecastParams;
use crate::types::{HistoryRange, Period};

// === Errors ===

/// Every failure leaves the API as a status code and `{"error": message}`.
#[derive(Debug)]
pub enum ApiError {
    App(Error),
    Unauthenticated,
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError::App(e)
    }
}

pub fn status_for(e: &Error) -> StatusCode {
    match e {
        Error::NoData(_) => StatusCode::NOT_FOUND,
        Error::InvalidParameter(_) => StatusCode::BAD_REQUEST,
        Error::ModelUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        Error::DuplicateUsername(_) => StatusCode::CONFLICT,
        Error::AuthFailure => StatusCode::UNAUTHORIZED,
        Error::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        Error::Upstream(_) => StatusCode::BAD_GATEWAY,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::App(e) => {
                if matches!(e, Error::Storage(_)) {
                    error!("{}", e);
                }
                (status_for(&e), e.user_message())
            }
            ApiError::Unauthenticated => (StatusCode::UNAUTHORIZED, "Please log in.".to_string()),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

// === Session extractor ===

/// The session named by `Authorization: Bearer <token>`.
pub struct AuthSession(pub Session);

#[async_trait]
impl FromRequestParts<AppState> for AuthSession {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .and_then(|t| Uuid::parse_str(t.trim()).ok())
            .ok_or(ApiError::Unauthenticated)?;

        state
            .sessions
            .get(token)
            .await
            .map(AuthSession)
            .ok_or(ApiError::Unauthenticated)
    }
}

// === Account Endpoints ===

#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "forecast": cfg!(feature = "forecast"),
        "advisor": state.advisor.is_available(),
    }))
}

pub async fn post_signup(
    State(state): State<AppState>,
    Json(req): Json<Credentials>,
) -> ApiResult<impl IntoResponse> {
    let user = state.store.register(&req.username, &req.password).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Account created! You can now login.",
            "user": user,
        })),
    ))
}

pub async fn post_login(
    State(state): State<AppState>,
    Json(req): Json<Credentials>,
) -> ApiResult<impl IntoResponse> {
    let user = state.store.verify(&req.username, &req.password).await?;
    let session = state.sessions.open(&user.username).await;
    Ok(Json(json!({
        "message": format!("Logged in as {}", user.username),
        "token": session.id,
        "username": user.username,
    })))
}

pub async fn post_logout(
    State(state): State<AppState>,
    AuthSession(session): AuthSession,
) -> impl IntoResponse {
    state.sessions.close(session.id).await;
    info!("User {} logged out", session.username);
    Json(json!({"status": "ok"}))
}

#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    pub new_username: String,
}

pub async fn put_username(
    State(state): State<AppState>,
    AuthSession(session): AuthSession,
    Json(req): Json<RenameRequest>,
) -> ApiResult<impl IntoResponse> {
    let new_username = req.new_username.trim();
    state.store.rename(&session.username, new_username).await?;
    state.sessions.rename(&session.username, new_username).await;
    Ok(Json(json!({
        "message": "Username updated successfully!",
        "username": new_username,
    })))
}

// === Data Endpoints ===

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub ticker: String,
    pub period: Option<String>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl HistoryQuery {
    fn range(&self) -> Result<HistoryRange, Error> {
        match (self.start, self.end) {
            (Some(start), Some(end)) => HistoryRange::between(start, end),
            (None, None) => {
                let period = match &self.period {
                    Some(p) => p.parse()?,
                    None => Period::OneMonth,
                };
                Ok(period.into())
            }
            _ => Err(Error::invalid("Both start and end dates are required.")),
        }
    }
}

pub async fn get_history(
    State(state): State<AppState>,
    AuthSession(_): AuthSession,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<impl IntoResponse> {
    let range = query.range()?;
    let series = state
        .market
        .history(&query.ticker, range)
        .await
        .ok_or_else(|| Error::NoData(query.ticker.clone()))?;
    Ok(Json(IndicatorFrame::compute(&series, &state.settings.indicators)))
}

#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    pub ticker: String,
    pub window: Option<i64>,
    pub days: Option<i64>,
    pub epochs: Option<i64>,
    #[serde(default)]
    pub include_history: bool,
}

pub async fn post_predict(
    State(state): State<AppState>,
    AuthSession(_): AuthSession,
    Json(req): Json<PredictRequest>,
) -> ApiResult<impl IntoResponse> {
    let defaults = &state.settings.forecast;
    let params = ForecastParams::new(
        req.window.unwrap_or(defaults.window as i64),
        req.days.unwrap_or(defaults.days as i64),
        req.epochs.unwrap_or(defaults.epochs as i64),
        req.include_history,
        defaults,
    )?;
    let forecast = state.forecaster.forecast(&req.ticker, params).await?;
    Ok(Json(forecast))
}

#[derive(Debug, Deserialize)]
pub struct AlertQuery {
    pub ticker: String,
    pub threshold: String,
}

pub async fn get_alert(
    State(state): State<AppState>,
    AuthSession(_): AuthSession,
    Query(query): Query<AlertQuery>,
) -> impl IntoResponse {
    let outcome = check_price_alert(&state.market, &query.ticker, &query.threshold).await;
    Json(json!({
        "message": outcome.to_string(),
        "triggered": outcome.is_triggered(),
        "outcome": outcome,
    }))
}

#[derive(Debug, Deserialize)]
pub struct TickerQuery {
    pub ticker: String,
}

pub async fn get_recommendation(
    State(state): State<AppState>,
    AuthSession(_): AuthSession,
    Query(query): Query<TickerQuery>,
) -> ApiResult<impl IntoResponse> {
    let rec = state.advisor.recommend(&state.market, &query.ticker).await?;
    Ok(Json(rec))
}

pub async fn get_quote(
    State(state): State<AppState>,
    AuthSession(_): AuthSession,
    Query(query): Query<TickerQuery>,
) -> ApiResult<impl IntoResponse> {
    let price = state
        .market
        .current_price(&query.ticker)
        .await
        .ok_or_else(|| Error::NoData(query.ticker.clone()))?;
    Ok(Json(json!({
        "ticker": query.ticker.trim().to_uppercase(),
        "price": price,
    })))
}

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::alert::{apply_alert_rules, build_sinks, dispatch, evaluate_alerts, AlertEvent, AlertSink};
use crate::catalog::{Discount, DiscountSelection, Track};
use crate::config::Config;
use crate::finance::{
    assess_viability, calculate_financials, executive_summary, late_fees,
    simulate_payment_scenarios, FinancialCalculation, FinancialRequest, LateFees, PaymentScenario,
    ViabilityReport,
};
use crate::geo::{self, Classification, EligibilityCheck, EligibilityStats};
use crate::migration::{
    analyze_with, newly_available_discounts, selection_for_strategy, validate_discount_set,
    DiscountSetValidation, EligibilityContext, MigrationAnalysisComplete,
};
use crate::pricing::{calculate_by_ids, CalculatedTotals, CalculationInput, BASE_VALUE_ERROR};
use crate::resolver::{RefreshSummary, Resolver};

#[derive(Clone)]
struct ApiState {
    config: Config,
    resolver: Arc<Resolver>,
    sinks: Arc<Vec<Arc<dyn AlertSink>>>,
    reported_failures: Arc<AtomicU64>,
}

#[derive(Debug, Serialize)]
struct ApiResponse<T: Serialize> {
    ok: bool,
    data: T,
}

#[derive(Debug, Serialize)]
struct ApiErrorBody {
    ok: bool,
    error: String,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn unavailable(error: impl std::fmt::Display) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: error.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ApiErrorBody {
            ok: false,
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<ApiResponse<T>>, ApiError>;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    strategies: Vec<String>,
    revision: Option<String>,
}

#[derive(Debug, Serialize)]
struct CalculateResponse {
    totals: CalculatedTotals,
    alerts: Vec<AlertEvent>,
}

#[derive(Debug, Clone, Deserialize)]
struct ClassifyRequest {
    postal_code: String,
    #[serde(default)]
    discount_codes: Vec<String>,
    #[serde(default)]
    track_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct ClassifyResponse {
    classification: Option<Classification>,
    checks: Vec<EligibilityCheck>,
    stats: EligibilityStats,
}

#[derive(Debug, Clone, Deserialize)]
struct MigrationRequest {
    #[serde(default)]
    previous: Vec<DiscountSelection>,
    context: EligibilityContext,
}

#[derive(Debug, Serialize)]
struct MigrationResponse {
    analysis: MigrationAnalysisComplete,
    recommended_selection: Vec<DiscountSelection>,
    selection_check: DiscountSetValidation,
    newly_available: Vec<DiscountSelection>,
}

#[derive(Debug, Clone, Deserialize)]
struct FinancialsRequest {
    calculation: CalculationInput,
    finance: FinancialRequest,
    #[serde(default)]
    simulate_methods: bool,
}

#[derive(Debug, Serialize)]
struct FinancialsResponse {
    totals: CalculatedTotals,
    financials: FinancialCalculation,
    viability: ViabilityReport,
    summary: String,
    scenarios: Option<Vec<PaymentScenario>>,
}

#[derive(Debug, Clone, Deserialize)]
struct LateFeeRequest {
    value: f64,
    due_date: NaiveDate,
    paid_on: NaiveDate,
}

pub async fn run_server(config: Config, bind: SocketAddr) -> Result<()> {
    let resolver = Arc::new(Resolver::from_config(&config)?);
    let sinks = Arc::new(build_sinks(&config.alerts)?);
    let state = ApiState {
        config,
        resolver,
        sinks,
        reported_failures: Arc::new(AtomicU64::new(0)),
    };

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("REST API listening on http://{bind}");
    axum::serve(listener, app).await?;
    Ok(())
}

fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/calculate", post(calculate))
        .route("/v1/classify", post(classify))
        .route("/v1/migration", post(migration))
        .route("/v1/financials", post(financials))
        .route("/v1/late-fees", post(late_fee))
        .route("/v1/tracks", get(tracks))
        .route("/v1/discounts", get(discounts))
        .route("/v1/refresh", post(refresh))
        .route("/v1/config", get(show_config))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health(State(state): State<ApiState>) -> Json<ApiResponse<HealthResponse>> {
    ok(HealthResponse {
        status: "ok",
        strategies: state.resolver.strategy_names(),
        revision: state.resolver.revision().await,
    })
}

async fn show_config(State(state): State<ApiState>) -> Json<ApiResponse<Config>> {
    ok(state.config.redacted())
}

async fn calculate(
    State(state): State<ApiState>,
    Json(input): Json<CalculationInput>,
) -> ApiResult<CalculateResponse> {
    let totals = calculate_by_ids(&state.resolver, &state.config.pricing_rules(), &input).await;
    let alerts = raise_alerts(&state, Some(&totals)).await;
    Ok(ok(CalculateResponse { totals, alerts }))
}

async fn classify(
    State(state): State<ApiState>,
    Json(request): Json<ClassifyRequest>,
) -> ApiResult<ClassifyResponse> {
    let classification = geo::classify_detailed(&request.postal_code);
    let category = classification.as_ref().map(|c| c.category);
    let special_track = match request.track_id.as_deref() {
        Some(id) => state
            .resolver
            .resolve_track(id)
            .await
            .map(|track| track.is_special())
            .unwrap_or(false),
        None => false,
    };

    let checks = if request.discount_codes.is_empty() {
        geo::analyze_eligibility(&state.resolver.list_discounts().await, category, special_track)
    } else {
        request
            .discount_codes
            .iter()
            .map(|code| geo::evaluate_code(code, category, special_track))
            .collect()
    };
    let stats = geo::eligibility_stats(&checks);
    Ok(ok(ClassifyResponse {
        classification,
        checks,
        stats,
    }))
}

async fn migration(
    State(state): State<ApiState>,
    Json(request): Json<MigrationRequest>,
) -> ApiResult<MigrationResponse> {
    if request.context.student_id.trim().is_empty() {
        return Err(ApiError::bad_request("context.student_id is required"));
    }
    let rules = state.config.migration_rules();
    let mut analysis = analyze_with(&rules, &request.previous, &request.context);

    let held: Vec<String> = request
        .previous
        .iter()
        .map(|selection| selection.discount_code.clone())
        .collect();
    let catalog = state.resolver.list_discounts().await;
    let newly_available = newly_available_discounts(&request.context, &held, &catalog);
    analysis.summary.new_discounts_available = newly_available.len();

    let recommended_selection = selection_for_strategy(&analysis, analysis.recommended_strategy);
    let selection_check = validate_discount_set(&rules, &recommended_selection);
    Ok(ok(MigrationResponse {
        analysis,
        recommended_selection,
        selection_check,
        newly_available,
    }))
}

async fn financials(
    State(state): State<ApiState>,
    Json(request): Json<FinancialsRequest>,
) -> ApiResult<FinancialsResponse> {
    let base_value = request.calculation.base_value;
    if !base_value.is_finite() || base_value <= 0.0 {
        return Err(ApiError::bad_request(BASE_VALUE_ERROR));
    }
    let totals = calculate_by_ids(
        &state.resolver,
        &state.config.pricing_rules(),
        &request.calculation,
    )
    .await;
    raise_alerts(&state, Some(&totals)).await;

    let rules = state.config.finance_rules();
    let financials = calculate_financials(&totals, &request.finance, &rules)
        .map_err(|err| ApiError::bad_request(err.to_string()))?;
    let scenarios = if request.simulate_methods {
        Some(
            simulate_payment_scenarios(&totals, &request.finance, &rules)
                .map_err(|err| ApiError::bad_request(err.to_string()))?,
        )
    } else {
        None
    };
    let viability = assess_viability(&financials, request.finance.family_income, &rules);
    let summary = executive_summary(&financials);

    Ok(ok(FinancialsResponse {
        totals,
        financials,
        viability,
        summary,
        scenarios,
    }))
}

async fn late_fee(
    State(state): State<ApiState>,
    Json(request): Json<LateFeeRequest>,
) -> ApiResult<LateFees> {
    if !request.value.is_finite() || request.value < 0.0 {
        return Err(ApiError::bad_request("value must be a non-negative number"));
    }
    Ok(ok(late_fees(
        request.value,
        request.due_date,
        request.paid_on,
        &state.config.finance_rules(),
    )))
}

async fn tracks(State(state): State<ApiState>) -> Json<ApiResponse<Vec<Track>>> {
    ok(state.resolver.list_tracks().await)
}

async fn discounts(State(state): State<ApiState>) -> Json<ApiResponse<Vec<Discount>>> {
    ok(state.resolver.list_discounts().await)
}

async fn refresh(State(state): State<ApiState>) -> ApiResult<RefreshSummary> {
    let summary = state
        .resolver
        .refresh()
        .await
        .map_err(ApiError::unavailable)?;
    raise_alerts(&state, None).await;
    Ok(ok(summary))
}

/// Fallback alerts only cover store failures since the previous report.
async fn raise_alerts(state: &ApiState, totals: Option<&CalculatedTotals>) -> Vec<AlertEvent> {
    let total = state.resolver.store_failures();
    let reported = state.reported_failures.swap(total, Ordering::SeqCst);
    let alerts = apply_alert_rules(
        evaluate_alerts(totals, unreported_failures(total, reported)),
        &state.config.alerts.rules,
    );
    dispatch(&state.sinks, &alerts).await;
    alerts
}

fn ok<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse { ok: true, data })
}

fn unreported_failures(total: u64, reported: u64) -> u64 {
    total.saturating_sub(reported)
}

use crate::config::{self, Settings, DRIFT_AXIS_LIMIT, HISTORY_TOP_N, TRADE_FILE_MIME, TRADE_FILE_NAME};
use crate::data::WeightTable;
use crate::portfolio::{self, AllocationRow, DriftBar, DriftTier, HistorySeries, PieSlice, SnapshotAnalysis};
use crate::report;
use anyhow::Result;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use axum::{Json, Router};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

const INDEX_HTML: &str = include_str!("../web/index.html");
const APP_JS: &str = include_str!("../web/app.js");

#[derive(Clone)]
struct WebState {
    table: Arc<WeightTable>,
    settings: Arc<Settings>,
}

type ApiResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

#[derive(Clone, Debug, Serialize)]
struct ApiError {
    error: String,
}

/// Query string shared by every view. Missing fields fall back to the
/// server settings and the latest date.
#[derive(Clone, Debug, Default, Deserialize)]
struct ViewQuery {
    date: Option<String>,
    band: Option<f64>,
    value: Option<f64>,
}

#[derive(Clone, Debug, Serialize)]
struct DatesResponse {
    dates: Vec<String>,
    latest: Option<String>,
    tickers: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
struct SummaryItem {
    label: String,
    value: String,
}

#[derive(Clone, Debug, Serialize)]
struct SummaryResponse {
    date: String,
    portfolio_value: f64,
    cash: Option<f64>,
    needs_rebalance: bool,
    items: Vec<SummaryItem>,
}

#[derive(Clone, Debug, Serialize)]
struct AllocationResponse {
    date: String,
    rows: Vec<AllocationRow>,
    pie: Vec<PieSlice>,
}

#[derive(Clone, Debug, Serialize)]
struct HistoryResponse {
    date: String,
    timestamps: Vec<String>,
    series: Vec<HistorySeries>,
    stacked: Vec<Vec<f64>>,
}

#[derive(Clone, Debug, Serialize)]
struct LegendEntry {
    tier: DriftTier,
    label: &'static str,
    color: String,
    count: usize,
}

#[derive(Clone, Debug, Serialize)]
struct DriftResponse {
    date: String,
    band: f64,
    axis_limit: f64,
    bars: Vec<DriftBar>,
    legend: Vec<LegendEntry>,
}

#[derive(Clone, Debug, Serialize)]
struct TradesResponse {
    date: String,
    band: f64,
    portfolio_value: f64,
    buys: Vec<String>,
    sells: Vec<String>,
    buy_text: String,
    sell_text: String,
    downloadable: bool,
}

pub async fn run_webui_server(port: u16, table: Arc<WeightTable>, settings: Settings) -> Result<()> {
    let app = router(table, settings);

    let addr = format!("0.0.0.0:{}", port);
    info!("WebUI listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn router(table: Arc<WeightTable>, settings: Settings) -> Router {
    let state = WebState {
        table,
        settings: Arc::new(settings),
    };

    Router::new()
        .route("/", get(index))
        .route("/app.js", get(app_js))
        .route("/api/health", get(health))
        .route("/api/dates", get(dates))
        .route("/api/summary", get(summary))
        .route("/api/allocation", get(allocation))
        .route("/api/history", get(history))
        .route("/api/drift", get(drift))
        .route("/api/trades", get(trades))
        .route("/api/trades/download", get(download_trades))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn app_js() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/javascript; charset=utf-8")], APP_JS)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
}

async fn dates(State(state): State<WebState>) -> Json<DatesResponse> {
    let dates: Vec<String> = state.table.dates().iter().map(|d| report::format_date(*d)).collect();
    Json(DatesResponse {
        latest: dates.last().cloned(),
        dates,
        tickers: state.table.tickers().to_vec(),
    })
}

async fn summary(
    State(state): State<WebState>,
    Query(q): Query<ViewQuery>,
) -> ApiResult<Json<SummaryResponse>> {
    let (date, analysis) = resolve_snapshot(&state, &q)?;
    let value = portfolio_value(&state, &q);
    let threshold = state.settings.rebalance_threshold;

    let items = report::summary_lines(date, &analysis, value, threshold)
        .into_iter()
        .map(|(label, value)| SummaryItem { label, value })
        .collect();

    Ok(Json(SummaryResponse {
        date: report::format_date(date),
        portfolio_value: value,
        cash: portfolio::cash_weight(&analysis.current),
        needs_rebalance: analysis.needs_rebalance(threshold),
        items,
    }))
}

async fn allocation(
    State(state): State<WebState>,
    Query(q): Query<ViewQuery>,
) -> ApiResult<Json<AllocationResponse>> {
    let (date, analysis) = resolve_snapshot(&state, &q)?;
    let value = portfolio_value(&state, &q);

    Ok(Json(AllocationResponse {
        date: report::format_date(date),
        rows: portfolio::allocation_table(&analysis, value),
        pie: portfolio::pie_slices(&analysis.current),
    }))
}

async fn history(
    State(state): State<WebState>,
    Query(q): Query<ViewQuery>,
) -> ApiResult<Json<HistoryResponse>> {
    let (date, analysis) = resolve_snapshot(&state, &q)?;
    let series = portfolio::allocation_history(&state.table, &analysis.current, HISTORY_TOP_N);
    let stacked = portfolio::stack_series(&series);
    let timestamps = state
        .table
        .timestamps()
        .iter()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .collect();

    Ok(Json(HistoryResponse {
        date: report::format_date(date),
        timestamps,
        series,
        stacked,
    }))
}

async fn drift(
    State(state): State<WebState>,
    Query(q): Query<ViewQuery>,
) -> ApiResult<Json<DriftResponse>> {
    let (date, analysis) = resolve_snapshot(&state, &q)?;
    let band = drift_band(&state, &q);

    let legend = report::tier_counts(&analysis, band)
        .into_iter()
        .map(|(tier, count)| {
            let (r, g, b) = tier.rgb();
            LegendEntry {
                tier,
                label: tier.label(),
                color: format!("#{:02x}{:02x}{:02x}", r, g, b),
                count,
            }
        })
        .collect();

    Ok(Json(DriftResponse {
        date: report::format_date(date),
        band,
        axis_limit: DRIFT_AXIS_LIMIT,
        bars: portfolio::drift_bars(&analysis.drift, band),
        legend,
    }))
}

async fn trades(
    State(state): State<WebState>,
    Query(q): Query<ViewQuery>,
) -> ApiResult<Json<TradesResponse>> {
    let (date, analysis) = resolve_snapshot(&state, &q)?;
    let band = drift_band(&state, &q);
    let value = portfolio_value(&state, &q);
    let plan = analysis.trades(band, value);

    Ok(Json(TradesResponse {
        date: report::format_date(date),
        band,
        portfolio_value: value,
        buys: plan.buys.iter().map(report::trade_line).collect(),
        sells: plan.sells.iter().map(report::trade_line).collect(),
        buy_text: report::buy_text(&plan),
        sell_text: report::sell_text(&plan),
        downloadable: !plan.is_empty(),
    }))
}

async fn download_trades(
    State(state): State<WebState>,
    Query(q): Query<ViewQuery>,
) -> ApiResult<impl IntoResponse> {
    let (date, analysis) = resolve_snapshot(&state, &q)?;
    let plan = analysis.trades(drift_band(&state, &q), portfolio_value(&state, &q));
    let Some(text) = report::trade_file_text(&plan) else {
        return Err(api_err(StatusCode::NOT_FOUND, "no trade suggestions for this selection"));
    };
    info!("Serving {} for {}", TRADE_FILE_NAME, date);

    Ok((
        [
            (header::CONTENT_TYPE, TRADE_FILE_MIME.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", TRADE_FILE_NAME),
            ),
        ],
        text,
    ))
}

// ──────────────────────────────────────────────────────────────────────────────
// Query Resolution
// ──────────────────────────────────────────────────────────────────────────────

fn resolve_snapshot(state: &WebState, q: &ViewQuery) -> ApiResult<(NaiveDate, SnapshotAnalysis)> {
    let date = match q.date.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map_err(|_| api_err(StatusCode::BAD_REQUEST, &format!("invalid date '{}'", raw)))?,
        None => state
            .table
            .latest_date()
            .ok_or_else(|| api_err(StatusCode::BAD_REQUEST, "weight table is empty"))?,
    };
    let snapshot = state.table.snapshot_on(date).ok_or_else(|| {
        api_err(
            StatusCode::BAD_REQUEST,
            &format!("no snapshot for {}", report::format_date(date)),
        )
    })?;
    debug!("Recomputing allocation for {}", date);
    Ok((date, SnapshotAnalysis::new(snapshot)))
}

fn drift_band(state: &WebState, q: &ViewQuery) -> f64 {
    q.band.map(config::clamp_band).unwrap_or(state.settings.drift_band)
}

fn portfolio_value(state: &WebState, q: &ViewQuery) -> f64 {
    q.value.map(config::clamp_value).unwrap_or(state.settings.portfolio_value)
}

fn api_err(status: StatusCode, message: &str) -> (StatusCode, Json<ApiError>) {
    (
        status,
        Json(ApiError {
            error: message.to_string(),
        }),
    )
}

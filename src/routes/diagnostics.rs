//! 诊断查询端点。全部只读，共享同一组过滤参数，
//! 结果由引擎内的缓存层兜底。

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use chrono::NaiveDate;
use serde::Deserialize;

use crate::response::{ok, AppError};
use crate::state::AppState;
use crate::store::operations::order_lines::LineFilter;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/overview", get(overview))
        .route("/distance", get(distance))
        .route("/hourly", get(hourly))
        .route("/compare", get(compare))
        .route("/anomalies", get(anomalies))
        .route("/marketing/structure", get(marketing_structure))
        .route("/marketing/trend", get(marketing_trend))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DiagnosticsQuery {
    store: Option<String>,
    channel: Option<String>,
    date: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
}

impl DiagnosticsQuery {
    /// 日期参数统一在这里解析，坏格式直接 400，不静默忽略。
    /// 区间参数必须成对：只给一半就报缺失的那一半。
    fn filter(&self) -> Result<LineFilter, AppError> {
        let start_date = parse_date(&self.start_date, "startDate")?;
        let end_date = parse_date(&self.end_date, "endDate")?;
        match (start_date, end_date) {
            (Some(_), None) => {
                return Err(AppError::bad_request(
                    "MISSING_FIELD",
                    "区间参数必须成对出现，缺少 endDate",
                ));
            }
            (None, Some(_)) => {
                return Err(AppError::bad_request(
                    "MISSING_FIELD",
                    "区间参数必须成对出现，缺少 startDate",
                ));
            }
            _ => {}
        }
        Ok(LineFilter {
            store: normalize(&self.store),
            channel: normalize(&self.channel),
            date: parse_date(&self.date, "date")?,
            start_date,
            end_date,
        })
    }
}

fn normalize(raw: &Option<String>) -> Option<String> {
    raw.as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned)
}

fn parse_date(raw: &Option<String>, name: &str) -> Result<Option<NaiveDate>, AppError> {
    match normalize(raw) {
        None => Ok(None),
        Some(s) => NaiveDate::parse_from_str(&s, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| {
                AppError::bad_request(
                    "INVALID_DATE",
                    &format!("参数 {name} 不是合法日期 (YYYY-MM-DD): {s}"),
                )
            }),
    }
}

async fn overview(
    Query(q): Query<DiagnosticsQuery>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let filter = q.filter()?;
    Ok(ok(state.engine().overview(&filter)?))
}

async fn distance(
    Query(q): Query<DiagnosticsQuery>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let filter = q.filter()?;
    Ok(ok(state.engine().distance_analysis(&filter)?))
}

async fn hourly(
    Query(q): Query<DiagnosticsQuery>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let filter = q.filter()?;
    Ok(ok(state.engine().hourly_profit(&filter)?))
}

async fn compare(
    Query(q): Query<DiagnosticsQuery>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let filter = q.filter()?;
    Ok(ok(state.engine().compare_periods(&filter)?))
}

async fn anomalies(
    Query(q): Query<DiagnosticsQuery>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let filter = q.filter()?;
    Ok(ok(state.engine().anomalies(&filter)?))
}

async fn marketing_structure(
    Query(q): Query<DiagnosticsQuery>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let filter = q.filter()?;
    Ok(ok(state.engine().marketing_structure(&filter)?))
}

async fn marketing_trend(
    Query(q): Query<DiagnosticsQuery>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let filter = q.filter()?;
    Ok(ok(state.engine().marketing_trend(&filter)?))
}

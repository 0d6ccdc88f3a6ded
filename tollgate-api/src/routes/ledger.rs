//! Ledger query and export endpoints

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use tollgate_core::types::{LedgerCategory, LedgerFilter};
use tollgate_store::ledger;

use crate::dto::{LedgerEntryDto, LedgerPageResponse, LedgerQueryParams};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

fn build_filter(params: &LedgerQueryParams) -> ApiResult<LedgerFilter> {
    let category = params
        .category
        .as_deref()
        .map(|s| {
            LedgerCategory::parse(s)
                .ok_or_else(|| ApiError::BadRequest(format!("unknown category: {}", s)))
        })
        .transpose()?;

    Ok(LedgerFilter {
        category,
        event: params.event.clone(),
        request_id: params.request_id.clone(),
        payment_id: params.payment_id.clone(),
        tx_hash: params.tx_hash.clone(),
        from: params.from,
        to: params.to,
    })
}

/// Paginated ledger query, newest-first.
pub async fn query(
    State(state): State<AppState>,
    Query(params): Query<LedgerQueryParams>,
) -> ApiResult<Json<LedgerPageResponse>> {
    let filter = build_filter(&params)?;
    let page = state
        .runtime
        .ledger()
        .query(&filter, params.limit, params.cursor.as_deref())
        .await?;

    Ok(Json(LedgerPageResponse {
        items: page.entries.into_iter().map(LedgerEntryDto::from).collect(),
        next_cursor: page.next_cursor,
    }))
}

/// CSV bulk export.
pub async fn export_csv(
    State(state): State<AppState>,
    Query(params): Query<LedgerQueryParams>,
) -> ApiResult<Response> {
    let filter = build_filter(&params)?;
    let entries = state
        .runtime
        .ledger()
        .export(&filter, params.limit)
        .await?;
    let csv = ledger::to_csv(&entries);

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"ledger.csv\"",
            ),
        ],
        csv,
    )
        .into_response())
}

//! # Handlers
//!
//! Coordinates the flow between HTTP requests and the services layer.

use std::str::FromStr;

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use prometheus_client::encoding::text::encode;

use domains::{
    FulfillmentRating, ListingDraft, ListingFilter, ListingOrder, ListingReport, ListingType,
    Platform, ServerType,
};

use crate::dto::{
    ActiveCount, CloseListingRequest, CreateListingRequest, FeedParams, ListingSummary,
    ListingView, PostReplyRequest, RateFulfillmentRequest, ReplyView, ReportCount,
    ReportCountParams, ReportListingRequest,
};
use crate::error::ApiError;
use crate::AppState;

type ApiResult<T> = Result<T, ApiError>;

fn parse_opt<T>(raw: Option<&str>, what: &str) -> ApiResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.map(|value| {
        T::from_str(value).map_err(|err| ApiError::BadRequest(format!("{what}: {err}")))
    })
    .transpose()
}

fn feed_filter(params: &FeedParams) -> ApiResult<ListingFilter> {
    let order = match params.order.as_deref() {
        None | Some("") | Some("store") => ListingOrder::Store,
        Some("newest") => ListingOrder::NewestFirst,
        Some(other) => return Err(ApiError::BadRequest(format!("unknown order {other:?}"))),
    };
    Ok(ListingFilter {
        platform: parse_opt::<Platform>(params.platform.as_deref(), "platform")?,
        server_type: parse_opt::<ServerType>(params.server_type.as_deref(), "server_type")?,
        listing_type: parse_opt::<ListingType>(params.listing_type.as_deref(), "listing_type")?,
        order,
    })
}

/// `GET /api/v1/listings`
pub async fn list_listings(
    State(state): State<AppState>,
    Query(params): Query<FeedParams>,
) -> ApiResult<Json<Vec<ListingView>>> {
    let filter = feed_filter(&params)?;
    let needle = params.q.as_deref().unwrap_or_default();
    let listings = state.aggregator.resolve_many(&filter).await?;
    Ok(Json(
        listings
            .into_iter()
            .filter(|listing| listing.matches(needle))
            .map(ListingView::from)
            .collect(),
    ))
}

/// `POST /api/v1/listings`
pub async fn create_listing(
    State(state): State<AppState>,
    Json(req): Json<CreateListingRequest>,
) -> ApiResult<(StatusCode, Json<ListingSummary>)> {
    let images = req
        .images
        .iter()
        .enumerate()
        .map(|(i, encoded)| {
            STANDARD
                .decode(encoded)
                .map(Bytes::from)
                .map_err(|err| ApiError::BadRequest(format!("image {}: {err}", i + 1)))
        })
        .collect::<ApiResult<Vec<_>>>()?;
    let draft = ListingDraft {
        title: req.title,
        body: req.body,
        platform: req.platform,
        server_type: req.server_type,
        listing_type: req.listing_type,
        price: req.price,
    };
    let record = state
        .listings
        .create_listing(&req.owner_id, draft, images)
        .await?;
    Ok((StatusCode::CREATED, Json(record.into())))
}

/// `GET /api/v1/listings/{id}`
pub async fn get_listing(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ListingView>> {
    let listing = state.aggregator.resolve_by_id(&id).await?;
    Ok(Json(listing.into()))
}

/// `DELETE /api/v1/listings/{id}`
pub async fn delete_listing(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.listings.delete_listing(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/v1/listings/{id}/close`
pub async fn close_listing(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<CloseListingRequest>,
) -> ApiResult<Json<ListingSummary>> {
    let record = state
        .listings
        .close_listing(&id, req.fulfilled_by.as_deref())
        .await?;
    Ok(Json(record.into()))
}

/// `GET /api/v1/listings/{id}/replies`
pub async fn list_replies(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<ReplyView>>> {
    let replies = state.aggregator.resolve_replies(&id).await?;
    Ok(Json(replies.into_iter().map(ReplyView::from).collect()))
}

/// `POST /api/v1/listings/{id}/replies`
pub async fn post_reply(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<PostReplyRequest>,
) -> ApiResult<(StatusCode, Json<ReplyView>)> {
    let reply = state
        .listings
        .post_reply(&id, &req.author_id, &req.body)
        .await?;
    Ok((StatusCode::CREATED, Json(reply.into())))
}

/// `GET /api/v1/listings/{id}/repliers`
pub async fn list_repliers(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<domains::Replier>>> {
    Ok(Json(state.aggregator.repliers(&id).await?))
}

/// `POST /api/v1/listings/{id}/reports`
pub async fn report_listing(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ReportListingRequest>,
) -> ApiResult<(StatusCode, Json<ListingReport>)> {
    let report = state
        .listings
        .report_listing(&id, &req.reporter_id, &req.comment)
        .await?;
    Ok((StatusCode::CREATED, Json(report)))
}

/// `GET /api/v1/listings/{id}/reports?user_id=`
pub async fn user_reports_for(
    State(state): State<AppState>,
    Path(listing_id): Path<String>,
    Query(params): Query<ReportCountParams>,
) -> ApiResult<Json<ReportCount>> {
    let reports = state
        .listings
        .user_reports_for(&listing_id, &params.user_id)
        .await?;
    Ok(Json(ReportCount {
        listing_id,
        user_id: params.user_id,
        reports,
    }))
}

/// `POST /api/v1/listings/{id}/ratings`
pub async fn rate_fulfillment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<RateFulfillmentRequest>,
) -> ApiResult<(StatusCode, Json<FulfillmentRating>)> {
    let rating = state
        .listings
        .rate_fulfillment(&id, &req.rated_by, req.successful)
        .await?;
    Ok((StatusCode::CREATED, Json(rating)))
}

/// `GET /api/v1/users/{id}/listings`
pub async fn user_listings(
    State(state): State<AppState>,
    Path(owner_id): Path<String>,
) -> ApiResult<Json<Vec<ListingView>>> {
    let listings = state.aggregator.resolve_owner_listings(&owner_id).await?;
    Ok(Json(listings.into_iter().map(ListingView::from).collect()))
}

/// `GET /api/v1/users/{id}/listings/count`
pub async fn user_listing_count(
    State(state): State<AppState>,
    Path(owner_id): Path<String>,
) -> ApiResult<Json<ActiveCount>> {
    let active_listings = state.aggregator.count_active_listings(&owner_id).await?;
    Ok(Json(ActiveCount {
        owner_id,
        active_listings,
    }))
}

/// `GET /metrics`
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let mut body = String::new();
    if let Err(err) = encode(&mut body, &state.registry) {
        tracing::error!(error = %err, "metrics encoding failed");
        return (StatusCode::INTERNAL_SERVER_ERROR, String::new()).into_response();
    }
    (
        [(
            header::CONTENT_TYPE,
            "application/openmetrics-text; version=1.0.0; charset=utf-8",
        )],
        body,
    )
        .into_response()
}

/// `GET /healthz`
pub async fn healthz() -> &'static str {
    "ok"
}

use crate::handlers::common::success_response;
use crate::{errors::ServiceError, services::products::ProductListQuery, AppState};
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::get,
    Router,
};
use serde::Deserialize;
use serde_json::json;

/// Catalog browsing routes.
pub fn products_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_products))
        .route("/featured", get(featured_products))
        .route("/categories", get(list_categories))
        .route("/{id}", get(get_product))
        .route("/{id}/variants", get(get_variants))
}

async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ProductListQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let page = state.services.products.list_products(&query).await?;
    Ok(success_response(page))
}

#[derive(Debug, Deserialize)]
struct FeaturedQuery {
    limit: Option<u64>,
}

async fn featured_products(
    State(state): State<AppState>,
    Query(query): Query<FeaturedQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let products = state
        .services
        .products
        .featured_products(query.limit.unwrap_or(8))
        .await?;
    Ok(success_response(json!({ "products": products })))
}

#[derive(Debug, Deserialize)]
struct CategoriesQuery {
    parent_id: Option<i32>,
    include_products: Option<bool>,
}

async fn list_categories(
    State(state): State<AppState>,
    Query(query): Query<CategoriesQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let categories = state
        .services
        .products
        .list_categories(query.parent_id, query.include_products.unwrap_or(false))
        .await?;
    Ok(success_response(json!({ "categories": categories })))
}

async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ServiceError> {
    let product = state.services.products.get_product(id).await?;
    Ok(success_response(product))
}

async fn get_variants(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ServiceError> {
    let variants = state.services.products.product_variants(id).await?;
    Ok(success_response(json!({ "variants": variants })))
}

use crate::{
    entities::{category, product, product_image, product_variant},
    errors::ServiceError,
};
use rust_decimal::Decimal;
use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;

/// Pagination envelope shared by list endpoints.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Pagination {
    pub page: u64,
    pub per_page: u64,
    pub total: u64,
    pub total_pages: u64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl Pagination {
    pub fn new(page: u64, per_page: u64, total: u64) -> Self {
        let total_pages = total.div_ceil(per_page.max(1));
        Self {
            page,
            per_page,
            total,
            total_pages,
            has_next: page < total_pages,
            has_prev: page > 1,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ProductListQuery {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    pub category_id: Option<i32>,
    pub search: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub featured: Option<bool>,
    pub sort: Option<String>,
    pub direction: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductView {
    pub id: i32,
    pub category_id: Option<i32>,
    pub category_name: Option<String>,
    pub category_slug: Option<String>,
    pub sku: String,
    pub name: String,
    pub slug: String,
    pub short_description: Option<String>,
    pub description: Option<String>,
    pub price: Decimal,
    pub compare_price: Option<Decimal>,
    pub inventory_quantity: i32,
    pub track_inventory: bool,
    pub is_featured: bool,
    pub primary_image: Option<String>,
    pub tags: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct ProductListPage {
    pub data: Vec<ProductView>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
pub struct ProductDetail {
    #[serde(flatten)]
    pub product: ProductView,
    pub images: Vec<product_image::Model>,
    pub variants: Vec<product_variant::Model>,
}

#[derive(Debug, Serialize)]
pub struct CategoryView {
    #[serde(flatten)]
    pub category: category::Model,
    pub child_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_count: Option<u64>,
}

/// Catalog read side: product listing, detail, featured set and categories.
#[derive(Clone)]
pub struct ProductService {
    db: Arc<DatabaseConnection>,
}

impl ProductService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Paginated, filtered product listing with the category join and
    /// primary image resolved per row.
    #[instrument(skip(self, query))]
    pub async fn list_products(
        &self,
        query: &ProductListQuery,
    ) -> Result<ProductListPage, ServiceError> {
        let page = query.page.unwrap_or(1).max(1);
        let per_page = query.per_page.unwrap_or(20).clamp(1, 100);

        let mut select = product::Entity::find().filter(product::Column::IsActive.eq(true));

        if let Some(category_id) = query.category_id {
            select = select.filter(product::Column::CategoryId.eq(category_id));
        }
        if let Some(search) = query.search.as_deref().filter(|s| !s.is_empty()) {
            let pattern = format!("%{search}%");
            select = select.filter(
                Condition::any()
                    .add(product::Column::Name.like(pattern.clone()))
                    .add(product::Column::ShortDescription.like(pattern.clone()))
                    .add(product::Column::Description.like(pattern)),
            );
        }
        if let Some(min_price) = query.min_price {
            select = select.filter(product::Column::Price.gte(min_price));
        }
        if let Some(max_price) = query.max_price {
            select = select.filter(product::Column::Price.lte(max_price));
        }
        if query.featured == Some(true) {
            select = select.filter(product::Column::IsFeatured.eq(true));
        }

        // Whitelisted sort columns only
        let descending = query.direction.as_deref() == Some("desc");
        let sort_column = match query.sort.as_deref() {
            Some("price") => product::Column::Price,
            Some("created_at") => product::Column::CreatedAt,
            Some("featured") => product::Column::IsFeatured,
            _ => product::Column::Name,
        };
        select = if descending {
            select.order_by_desc(sort_column)
        } else {
            select.order_by_asc(sort_column)
        };

        let paginator = select.paginate(&*self.db, per_page);
        let total = paginator.num_items().await?;
        let products = paginator.fetch_page(page - 1).await?;

        let views = self.assemble_views(products).await?;
        Ok(ProductListPage {
            data: views,
            pagination: Pagination::new(page, per_page, total),
        })
    }

    /// Active product with images and active variants; 404 otherwise.
    #[instrument(skip(self))]
    pub async fn get_product(&self, id: i32) -> Result<ProductDetail, ServiceError> {
        let product = product::Entity::find_by_id(id)
            .filter(product::Column::IsActive.eq(true))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Product not found".to_string()))?;

        let images = product_image::Entity::find()
            .filter(product_image::Column::ProductId.eq(id))
            .order_by_asc(product_image::Column::SortOrder)
            .order_by_asc(product_image::Column::Id)
            .all(&*self.db)
            .await?;

        let variants = self.product_variants(id).await?;

        let view = self
            .assemble_views(vec![product])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ServiceError::InternalError("product view assembly".to_string()))?;

        Ok(ProductDetail {
            product: view,
            images,
            variants,
        })
    }

    /// Most recent featured products.
    pub async fn featured_products(&self, limit: u64) -> Result<Vec<ProductView>, ServiceError> {
        let products = product::Entity::find()
            .filter(product::Column::IsActive.eq(true))
            .filter(product::Column::IsFeatured.eq(true))
            .order_by_desc(product::Column::CreatedAt)
            .paginate(&*self.db, limit.max(1))
            .fetch_page(0)
            .await?;

        self.assemble_views(products).await
    }

    /// Active variants for a product.
    pub async fn product_variants(
        &self,
        product_id: i32,
    ) -> Result<Vec<product_variant::Model>, ServiceError> {
        Ok(product_variant::Entity::find()
            .filter(product_variant::Column::ProductId.eq(product_id))
            .filter(product_variant::Column::IsActive.eq(true))
            .order_by_asc(product_variant::Column::Id)
            .all(&*self.db)
            .await?)
    }

    /// Active categories at one level of the tree, with child counts and
    /// optionally the number of active products in each.
    #[instrument(skip(self))]
    pub async fn list_categories(
        &self,
        parent_id: Option<i32>,
        include_counts: bool,
    ) -> Result<Vec<CategoryView>, ServiceError> {
        let mut select = category::Entity::find().filter(category::Column::IsActive.eq(true));
        select = match parent_id {
            Some(parent_id) => select.filter(category::Column::ParentId.eq(parent_id)),
            None => select.filter(category::Column::ParentId.is_null()),
        };

        let categories = select
            .order_by_asc(category::Column::SortOrder)
            .order_by_asc(category::Column::Name)
            .all(&*self.db)
            .await?;

        let mut views = Vec::with_capacity(categories.len());
        for c in categories {
            let child_count = category::Entity::find()
                .filter(category::Column::ParentId.eq(c.id))
                .count(&*self.db)
                .await?;

            let product_count = if include_counts {
                Some(
                    product::Entity::find()
                        .filter(product::Column::CategoryId.eq(c.id))
                        .filter(product::Column::IsActive.eq(true))
                        .count(&*self.db)
                        .await?,
                )
            } else {
                None
            };

            views.push(CategoryView {
                category: c,
                child_count,
                product_count,
            });
        }

        Ok(views)
    }

    async fn assemble_views(
        &self,
        products: Vec<product::Model>,
    ) -> Result<Vec<ProductView>, ServiceError> {
        if products.is_empty() {
            return Ok(Vec::new());
        }

        let category_ids: Vec<i32> = products.iter().filter_map(|p| p.category_id).collect();
        let product_ids: Vec<i32> = products.iter().map(|p| p.id).collect();

        let categories: HashMap<i32, category::Model> = if category_ids.is_empty() {
            HashMap::new()
        } else {
            category::Entity::find()
                .filter(category::Column::Id.is_in(category_ids))
                .all(&*self.db)
                .await?
                .into_iter()
                .map(|c| (c.id, c))
                .collect()
        };

        let images: HashMap<i32, String> = product_image::Entity::find()
            .filter(product_image::Column::ProductId.is_in(product_ids))
            .filter(product_image::Column::IsPrimary.eq(true))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|img| (img.product_id, img.image_url))
            .collect();

        Ok(products
            .into_iter()
            .map(|p| {
                let cat = p.category_id.and_then(|id| categories.get(&id));
                ProductView {
                    id: p.id,
                    category_id: p.category_id,
                    category_name: cat.map(|c| c.name.clone()),
                    category_slug: cat.map(|c| c.slug.clone()),
                    sku: p.sku,
                    name: p.name,
                    slug: p.slug,
                    short_description: p.short_description,
                    description: p.description,
                    price: p.price,
                    compare_price: p.compare_price,
                    inventory_quantity: p.inventory_quantity,
                    track_inventory: p.track_inventory,
                    is_featured: p.is_featured,
                    primary_image: images.get(&p.id).cloned(),
                    tags: p.tags,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_math() {
        let p = Pagination::new(1, 20, 45);
        assert_eq!(p.total_pages, 3);
        assert!(p.has_next);
        assert!(!p.has_prev);

        let last = Pagination::new(3, 20, 45);
        assert!(!last.has_next);
        assert!(last.has_prev);

        let empty = Pagination::new(1, 20, 0);
        assert_eq!(empty.total_pages, 0);
        assert!(!empty.has_next);
    }
}

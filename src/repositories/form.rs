use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use deadpool_postgres::Pool;
use tokio::sync::RwLock;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::form::{FormCategory, FormHierarchy, FormSummary},
};

/// Read access to form categories and their forms.
#[async_trait]
pub trait FormRepository: Send + Sync {
    /// Categories of a tenant in display order.
    async fn list_categories(&self, tenant_id: Uuid) -> Result<Vec<FormCategory>>;

    /// A category with its forms, or `None` if the tenant has no such category.
    async fn find_hierarchy(&self, tenant_id: Uuid, category_id: Uuid) -> Result<Option<FormHierarchy>>;

    async fn count_published_forms(&self, tenant_id: Uuid) -> Result<u64>;
}

fn row_to_category(row: &Row) -> Result<FormCategory> {
    Ok(FormCategory {
        id: row.try_get("id").map_err(|_| AppError::MissingData("id".to_string()))?,
        tenant_id: row.try_get("tenant_id").map_err(|_| AppError::MissingData("tenant_id".to_string()))?,
        name: row.try_get("name").map_err(|_| AppError::MissingData("name".to_string()))?,
        description: row.try_get("description").map_err(|_| AppError::MissingData("description".to_string()))?,
        sort_order: row.try_get("sort_order").map_err(|_| AppError::MissingData("sort_order".to_string()))?,
    })
}

fn row_to_form(row: &Row) -> Result<FormSummary> {
    Ok(FormSummary {
        id: row.try_get("id").map_err(|_| AppError::MissingData("id".to_string()))?,
        name: row.try_get("name").map_err(|_| AppError::MissingData("name".to_string()))?,
        version: row.try_get("version").map_err(|_| AppError::MissingData("version".to_string()))?,
        is_published: row.try_get("is_published").map_err(|_| AppError::MissingData("is_published".to_string()))?,
    })
}

/// Forms in the `form_categories` and `forms` tables.
#[derive(Clone)]
pub struct PgFormRepository {
    pool: Pool,
}

impl PgFormRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FormRepository for PgFormRepository {
    async fn list_categories(&self, tenant_id: Uuid) -> Result<Vec<FormCategory>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                r#"
                SELECT id, tenant_id, name, description, sort_order
                FROM form_categories
                WHERE tenant_id = $1
                ORDER BY sort_order, name
                "#,
                &[&tenant_id],
            )
            .await?;
        rows.iter().map(row_to_category).collect()
    }

    async fn find_hierarchy(&self, tenant_id: Uuid, category_id: Uuid) -> Result<Option<FormHierarchy>> {
        let client = self.pool.get().await?;
        let Some(row) = client
            .query_opt(
                r#"
                SELECT id, tenant_id, name, description, sort_order
                FROM form_categories
                WHERE tenant_id = $1 AND id = $2
                "#,
                &[&tenant_id, &category_id],
            )
            .await?
        else {
            return Ok(None);
        };
        let category = row_to_category(&row)?;

        let rows = client
            .query(
                r#"
                SELECT id, name, version, is_published
                FROM forms
                WHERE category_id = $1
                ORDER BY name, version DESC
                "#,
                &[&category_id],
            )
            .await?;
        let forms = rows.iter().map(row_to_form).collect::<Result<Vec<_>>>()?;

        Ok(Some(FormHierarchy { category, forms }))
    }

    async fn count_published_forms(&self, tenant_id: Uuid) -> Result<u64> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                r#"
                SELECT COUNT(*) AS published
                FROM forms f
                JOIN form_categories c ON c.id = f.category_id
                WHERE c.tenant_id = $1 AND f.is_published = true
                "#,
                &[&tenant_id],
            )
            .await?;
        let published: i64 = row.try_get("published").map_err(|_| AppError::MissingData("published".to_string()))?;
        Ok(published.max(0) as u64)
    }
}

/// Forms kept in process memory. Counts how often it is queried.
#[derive(Debug, Default)]
pub struct MemoryFormRepository {
    categories: RwLock<Vec<FormCategory>>,
    forms: RwLock<HashMap<Uuid, Vec<FormSummary>>>,
    queries: AtomicUsize,
}

impl MemoryFormRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_category(&self, category: FormCategory, forms: Vec<FormSummary>) {
        self.forms.write().await.insert(category.id, forms);
        self.categories.write().await.push(category);
    }

    /// Number of repository calls served so far.
    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl FormRepository for MemoryFormRepository {
    async fn list_categories(&self, tenant_id: Uuid) -> Result<Vec<FormCategory>> {
        self.queries.fetch_add(1, Ordering::Relaxed);
        let mut categories: Vec<FormCategory> = self
            .categories
            .read()
            .await
            .iter()
            .filter(|c| c.tenant_id == tenant_id)
            .cloned()
            .collect();
        categories.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then_with(|| a.name.cmp(&b.name)));
        Ok(categories)
    }

    async fn find_hierarchy(&self, tenant_id: Uuid, category_id: Uuid) -> Result<Option<FormHierarchy>> {
        self.queries.fetch_add(1, Ordering::Relaxed);
        let category = self
            .categories
            .read()
            .await
            .iter()
            .find(|c| c.tenant_id == tenant_id && c.id == category_id)
            .cloned();
        let Some(category) = category else {
            return Ok(None);
        };
        let forms = self
            .forms
            .read()
            .await
            .get(&category_id)
            .cloned()
            .unwrap_or_default();
        Ok(Some(FormHierarchy { category, forms }))
    }

    async fn count_published_forms(&self, tenant_id: Uuid) -> Result<u64> {
        self.queries.fetch_add(1, Ordering::Relaxed);
        let categories = self.categories.read().await;
        let forms = self.forms.read().await;
        let count = categories
            .iter()
            .filter(|c| c.tenant_id == tenant_id)
            .filter_map(|c| forms.get(&c.id))
            .flatten()
            .filter(|f| f.is_published)
            .count();
        Ok(count as u64)
    }
}

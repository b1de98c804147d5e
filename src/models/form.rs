use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A top-level grouping of forms within a tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormCategory {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub sort_order: i32,
}

/// A form as listed under its category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormSummary {
    pub id: Uuid,
    pub name: String,
    pub version: i32,
    pub is_published: bool,
}

/// A category together with its forms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormHierarchy {
    pub category: FormCategory,
    pub forms: Vec<FormSummary>,
}

/// Per-user landing page figures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSummary {
    pub form_categories: u64,
    pub published_forms: u64,
    pub active_sessions: u64,
}

//! Canonical cache keys.
//!
//! Every tenant-scoped key has the shape `<kind>:<tenant>[:<segment>...]`.
//! Tenants are UUIDs, so two tenants can never produce the same key for the
//! same kind and id. Free-form segments are percent-escaped so that `:` or
//! glob metacharacters inside an id cannot alias another key or widen a
//! pattern.

use std::borrow::Cow;

use uuid::Uuid;

/// The entity kinds that own a slice of the key space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    FormCategories,
    FormCategory,
    FormHierarchy,
    Dashboard,
    Member,
    Provider,
    UserPermissions,
    UserSession,
    RateLimit,
}

impl KeyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            KeyKind::FormCategories => "formCategories",
            KeyKind::FormCategory => "formCategory",
            KeyKind::FormHierarchy => "formHierarchy",
            KeyKind::Dashboard => "dashboard",
            KeyKind::Member => "member",
            KeyKind::Provider => "provider",
            KeyKind::UserPermissions => "userPermissions",
            KeyKind::UserSession => "userSession",
            KeyKind::RateLimit => "rateLimit",
        }
    }
}

/// Kinds invalidated together when a tenant's form definitions change.
pub const FORM_KINDS: [KeyKind; 3] = [
    KeyKind::FormCategories,
    KeyKind::FormCategory,
    KeyKind::FormHierarchy,
];

fn escape(segment: &str) -> Cow<'_, str> {
    const RESERVED: &[char] = &['%', ':', '*', '?', '[', ']', '\\'];
    if !segment.contains(RESERVED) {
        return Cow::Borrowed(segment);
    }
    let mut out = String::with_capacity(segment.len() + 8);
    for c in segment.chars() {
        if RESERVED.contains(&c) {
            out.push_str(&format!("%{:02X}", c as u32));
        } else {
            out.push(c);
        }
    }
    Cow::Owned(out)
}

fn tenant_key(kind: KeyKind, tenant: Uuid, segments: &[&str]) -> String {
    let mut key = format!("{}:{}", kind.as_str(), tenant);
    for segment in segments {
        key.push(':');
        key.push_str(&escape(segment));
    }
    key
}

/// All form categories of a tenant.
pub fn form_categories(tenant: Uuid) -> String {
    tenant_key(KeyKind::FormCategories, tenant, &[])
}

pub fn form_category(tenant: Uuid, category_id: &str) -> String {
    tenant_key(KeyKind::FormCategory, tenant, &[category_id])
}

/// A category with its forms.
pub fn form_hierarchy(tenant: Uuid, category_id: &str) -> String {
    tenant_key(KeyKind::FormHierarchy, tenant, &[category_id])
}

/// A named dashboard of one user.
pub fn dashboard(tenant: Uuid, user_id: Uuid, name: &str) -> String {
    tenant_key(KeyKind::Dashboard, tenant, &[&user_id.to_string(), name])
}

pub fn member(tenant: Uuid, member_id: &str) -> String {
    tenant_key(KeyKind::Member, tenant, &[member_id])
}

pub fn provider(tenant: Uuid, provider_id: &str) -> String {
    tenant_key(KeyKind::Provider, tenant, &[provider_id])
}

pub fn user_permissions(tenant: Uuid, user_id: Uuid) -> String {
    tenant_key(KeyKind::UserPermissions, tenant, &[&user_id.to_string()])
}

/// Cache mirror of a session row. Session ids are globally unique, so the
/// key is not tenant-scoped.
pub fn user_session(session_id: &str) -> String {
    format!("{}:{}", KeyKind::UserSession.as_str(), escape(session_id))
}

/// A rate-limit counter for `subject` (an IP, a username) within `scope`.
pub fn rate_limit(scope: &str, subject: &str) -> String {
    format!(
        "{}:{}:{}",
        KeyKind::RateLimit.as_str(),
        escape(scope),
        escape(subject)
    )
}

/// Matches every key of `kind` belonging to `tenant`.
pub fn kind_pattern(kind: KeyKind, tenant: Uuid) -> String {
    format!("{}:{}*", kind.as_str(), tenant)
}

/// Matches every tenant-scoped key of `tenant`, whatever its kind.
pub fn tenant_pattern(tenant: Uuid) -> String {
    format!("*:{}*", tenant)
}

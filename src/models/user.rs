use uuid::Uuid;

/// The subset of a user row needed to verify a login.
#[derive(Clone, Debug)]
pub struct UserCredentials {
    /// The unique identifier for the user.
    pub id: Uuid,
    /// The tenant the user belongs to.
    pub tenant_id: Uuid,
    /// The user's username, unique per tenant.
    pub username: String,
    /// The user's Argon2 password hash.
    pub password_hash: String,
    /// Whether the user is active.
    pub is_active: bool,
}

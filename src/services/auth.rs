use crate::error::{AppError, Result};
use crate::models::user::UserCredentials;
use crate::repositories::user::UserRepository;
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2, ParamsBuilder,
};
use rand::{rngs::OsRng, RngCore};
use uuid::Uuid;
use zeroize::Zeroize;

/// The memory cost for Argon2 in MB.
const ARGON2_MEMORY_MB: u32 = 19;
/// The number of iterations for Argon2.
const ARGON2_ITERATIONS: u32 = 3;
/// The parallelism factor for Argon2.
const ARGON2_PARALLELISM: u32 = 6;

const INVALID_CREDENTIALS: &str = "Invalid username or password";

/// Hashes a password using Argon2id.
///
/// # Arguments
///
/// * `password` - The password to hash.
///
/// # Returns
///
/// A `Result` containing the PHC-formatted hash.
pub fn hash_password(password: &str) -> Result<String> {
    let mut password_bytes = password.as_bytes().to_vec();

    let mut salt_bytes = [0u8; 16];
    OsRng
        .try_fill_bytes(&mut salt_bytes)
        .map_err(|e| AppError::Internal(format!("Failed to generate salt: {}", e)))?;

    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|e| AppError::Internal(format!("Salt encoding error: {}", e)))?;

    let argon2 = Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        ParamsBuilder::new()
            .m_cost(ARGON2_MEMORY_MB * 1024)
            .t_cost(ARGON2_ITERATIONS)
            .p_cost(ARGON2_PARALLELISM)
            .build()
            .map_err(|e| AppError::Internal(format!("Argon2 params: {}", e)))?,
    );

    let password_hash = argon2
        .hash_password(&password_bytes, &salt)
        .map_err(|e| AppError::Internal(format!("Argon2 hash error: {}", e)))?
        .to_string();

    password_bytes.zeroize();
    Ok(password_hash)
}

/// Verifies a password against a stored hash. The hash carries its own
/// parameters.
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let mut password_bytes = password.as_bytes().to_vec();
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| AppError::Internal(format!("Hash parse error: {}", e)))?;
    let result = Argon2::default()
        .verify_password(&password_bytes, &parsed_hash)
        .is_ok();

    password_bytes.zeroize();
    Ok(result)
}

/// Checks a username and password inside a tenant.
///
/// Unknown users and wrong passwords produce the same error.
pub async fn authenticate_user(
    users: &dyn UserRepository,
    tenant_id: Uuid,
    username: &str,
    password: &str,
) -> Result<UserCredentials> {
    tracing::debug!("🔐 Authenticating user: {}", username);

    let user = users
        .find_by_username(tenant_id, username)
        .await?
        .ok_or_else(|| AppError::Authentication(INVALID_CREDENTIALS.to_string()))?;

    // Argon2 is CPU-bound.
    let password = password.to_string();
    let hash = user.password_hash.clone();
    let verified = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| AppError::Internal(format!("Password check aborted: {}", e)))??;

    if !verified {
        return Err(AppError::Authentication(INVALID_CREDENTIALS.to_string()));
    }

    tracing::info!("✅ User authenticated: {}", user.id);
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::user::MemoryUserRepository;

    #[test]
    fn hash_verifies_only_the_original_password() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("correct horse", &hash).unwrap());
        assert!(!verify_password("battery staple", &hash).unwrap());
    }

    #[test]
    fn malformed_hash_is_an_error() {
        assert!(verify_password("anything", "not-a-hash").is_err());
    }

    #[tokio::test]
    async fn authenticate_checks_tenant_and_password() {
        let users = MemoryUserRepository::new();
        let tenant = Uuid::new_v4();
        let user = UserCredentials {
            id: Uuid::new_v4(),
            tenant_id: tenant,
            username: "nurse.joy".to_string(),
            password_hash: hash_password("s3cret-pass").unwrap(),
            is_active: true,
        };
        users.insert(user.clone()).await;

        let found = authenticate_user(&users, tenant, "nurse.joy", "s3cret-pass")
            .await
            .unwrap();
        assert_eq!(found.id, user.id);

        let wrong_password = authenticate_user(&users, tenant, "nurse.joy", "nope").await;
        assert!(matches!(wrong_password, Err(AppError::Authentication(_))));

        let other_tenant = authenticate_user(&users, Uuid::new_v4(), "nurse.joy", "s3cret-pass").await;
        assert!(matches!(other_tenant, Err(AppError::Authentication(_))));
    }
}

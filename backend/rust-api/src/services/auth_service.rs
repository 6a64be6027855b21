use anyhow::{anyhow, Context, Result};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{Duration, Utc};
use mongodb::bson::{doc, oid::ObjectId};
use mongodb::Database;
use redis::aio::ConnectionManager;

use crate::middlewares::auth::{JwtClaims, JwtService};
use crate::models::user::{AuthResponse, LoginRequest, RegisterRequest, User, UserProfile};

const FAILED_ATTEMPTS_LIMIT: u32 = 5;
const FAILED_ATTEMPTS_TTL_SECONDS: u64 = 900;

pub struct AuthService {
    mongo: Database,
    redis: ConnectionManager,
    jwt_service: JwtService,
    access_token_ttl_seconds: i64,
}

impl AuthService {
    pub fn new(mongo: Database, redis: ConnectionManager, jwt_service: JwtService) -> Self {
        let access_token_ttl_seconds = std::env::var("JWT_ACCESS_TOKEN_TTL_SECONDS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(3600);

        Self {
            mongo,
            redis,
            jwt_service,
            access_token_ttl_seconds,
        }
    }

    pub fn hash_password(&self, password: &str) -> Result<String> {
        hash(password, DEFAULT_COST).context("Failed to hash password")
    }

    pub fn verify_password(&self, password: &str, hash: &str) -> Result<bool> {
        verify(password, hash).context("Failed to verify password")
    }

    /// Register a new account and return an access token for it.
    pub async fn register(&self, req: RegisterRequest) -> Result<AuthResponse> {
        let users_collection = self.mongo.collection::<User>("users");

        let existing_user = users_collection
            .find_one(doc! { "email": &req.email })
            .await
            .context("Failed to check existing user")?;

        if existing_user.is_some() {
            return Err(anyhow!("User with this email already exists"));
        }

        let password_hash = self.hash_password(&req.password)?;

        let now = Utc::now();
        let user = User {
            id: None,
            email: req.email.clone(),
            password_hash,
            name: req.name,
            created_at: now,
            updated_at: now,
            last_login_at: None,
        };

        let insert_result = users_collection
            .insert_one(&user)
            .await
            .context("Failed to insert user")?;

        let user_id = insert_result
            .inserted_id
            .as_object_id()
            .ok_or_else(|| anyhow!("Failed to get inserted user ID"))?;

        let access_token = self.generate_access_token(&user_id, &user.email)?;

        let mut user_with_id = user;
        user_with_id.id = Some(user_id);

        tracing::info!(user_id = %user_id.to_hex(), "User registered");

        Ok(AuthResponse {
            access_token,
            user: UserProfile::from(user_with_id),
        })
    }

    /// Login with email and password. Failed attempts are counted in Redis
    /// and the account is locked out after too many within the window.
    pub async fn login(&self, req: LoginRequest, ip: Option<String>) -> Result<AuthResponse> {
        if self.check_failed_attempts(&req.email).await? {
            tracing::warn!(email = %req.email, ip = ?ip, "Login blocked: too many failed attempts");
            return Err(anyhow!("Too many failed login attempts, try again later"));
        }

        let users_collection = self.mongo.collection::<User>("users");

        let user = users_collection
            .find_one(doc! { "email": &req.email })
            .await
            .context("Failed to query user")?
            .ok_or_else(|| anyhow!("Invalid email or password"))?;

        if !self.verify_password(&req.password, &user.password_hash)? {
            let attempts = self.increment_failed_attempts(&req.email).await?;
            tracing::warn!(
                email = %req.email,
                ip = ?ip,
                attempts,
                "Failed login attempt: invalid password"
            );
            return Err(anyhow!("Invalid email or password"));
        }

        self.clear_failed_attempts(&req.email).await?;

        let user_id = user.id.ok_or_else(|| anyhow!("User ID not found"))?;

        users_collection
            .update_one(
                doc! { "_id": user_id },
                doc! { "$set": { "lastLoginAt": mongodb::bson::DateTime::now() } },
            )
            .await
            .context("Failed to update last login timestamp")?;

        let access_token = self.generate_access_token(&user_id, &user.email)?;

        tracing::info!(
            user_id = %user_id.to_hex(),
            email = %req.email,
            ip = ?ip,
            "Successful login"
        );

        Ok(AuthResponse {
            access_token,
            user: UserProfile::from(user),
        })
    }

    pub async fn get_user_by_id(&self, user_id: &str) -> Result<User> {
        let object_id = ObjectId::parse_str(user_id).context("Invalid user ID format")?;

        self.mongo
            .collection::<User>("users")
            .find_one(doc! { "_id": object_id })
            .await
            .context("Failed to query user")?
            .ok_or_else(|| anyhow!("User not found"))
    }

    fn generate_access_token(&self, user_id: &ObjectId, email: &str) -> Result<String> {
        let now = Utc::now();
        let exp = now + Duration::seconds(self.access_token_ttl_seconds);

        let claims = JwtClaims {
            sub: user_id.to_hex(),
            email: email.to_string(),
            exp: exp.timestamp() as usize,
            iat: now.timestamp() as usize,
        };

        self.jwt_service
            .generate_token(claims)
            .map_err(|e| anyhow!("Failed to generate token: {}", e))
    }

    async fn check_failed_attempts(&self, email: &str) -> Result<bool> {
        let mut conn = self.redis.clone();
        let count: Option<u32> = redis::cmd("GET")
            .arg(format!("failed_login:{}", email))
            .query_async(&mut conn)
            .await
            .context("Failed to query failed login attempts")?;

        Ok(count.unwrap_or(0) >= FAILED_ATTEMPTS_LIMIT)
    }

    async fn increment_failed_attempts(&self, email: &str) -> Result<u32> {
        let key = format!("failed_login:{}", email);
        let mut conn = self.redis.clone();

        let count: u32 = redis::cmd("INCR")
            .arg(&key)
            .query_async(&mut conn)
            .await
            .context("Failed to increment failed login attempts")?;

        if count == 1 {
            redis::cmd("EXPIRE")
                .arg(&key)
                .arg(FAILED_ATTEMPTS_TTL_SECONDS)
                .query_async::<()>(&mut conn)
                .await
                .context("Failed to set TTL for failed login attempts")?;
        }

        Ok(count)
    }

    async fn clear_failed_attempts(&self, email: &str) -> Result<()> {
        let mut conn = self.redis.clone();
        redis::cmd("DEL")
            .arg(format!("failed_login:{}", email))
            .query_async::<()>(&mut conn)
            .await
            .context("Failed to clear failed login attempts")?;

        Ok(())
    }
}

use bon::bon;
use chrono::{DateTime, Utc};
use sqlx::{
    migrate::MigrateDatabase,
    postgres::{PgPool, PgPoolOptions},
};
use std::time::Duration;
use uuid::Uuid;

use crate::{
    error::{DbError, DbResult},
    types::{
        Account, OAuthProvider, OAuthState, PeriodEndWrite, Session, SessionWithUser,
        Subscription, SubscriptionStatus, User, WebhookEventOutcome,
    },
};

const USER_COLUMNS: &str = "id, name, email, email_verified_at, image, created_at, updated_at";

const SUBSCRIPTION_COLUMNS: &str = "id, user_id, plan, status, stripe_customer_id, \
     stripe_subscription_id, current_period_end, created_at, updated_at";

#[derive(Debug)]
pub struct DatabaseManager {
    pub pool: PgPool,
}

#[bon]
impl DatabaseManager {
    pub async fn new(database_url: &str) -> DbResult<Self> {
        if !sqlx::Postgres::database_exists(database_url).await? {
            sqlx::Postgres::create_database(database_url).await?;
        }

        let pool = PgPoolOptions::new()
            .max_connections(20)
            .min_connections(2)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await?;

        let db_manager = DatabaseManager { pool };

        Self::run_migrations(&db_manager.pool).await?;

        Ok(db_manager)
    }

    /// Builds a manager whose pool only connects on first use. Migrations are
    /// not run.
    pub fn connect_lazy(database_url: &str) -> DbResult<Self> {
        let pool = PgPoolOptions::new()
            .acquire_timeout(Duration::from_secs(10))
            .connect_lazy(database_url)?;
        Ok(DatabaseManager { pool })
    }

    async fn run_migrations(pool: &PgPool) -> DbResult<()> {
        let migrator = sqlx::migrate!("./src/migrations");
        migrator.run(pool).await?;
        tracing::info!("Database migrations applied");
        Ok(())
    }

    pub async fn ping(&self) -> DbResult<()> {
        let one: i32 = sqlx::query_scalar("SELECT 1").fetch_one(&self.pool).await?;
        if one != 1 {
            return Err(DbError::connection("unexpected ping result"));
        }
        Ok(())
    }

    // =========================================================================
    // Users
    // =========================================================================

    #[builder]
    pub async fn get_user(&self, id: Option<Uuid>, email: Option<String>) -> DbResult<User> {
        let user = match (id, email) {
            (Some(id), _) => {
                sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await?
            }
            (_, Some(email)) => {
                sqlx::query_as::<_, User>(&format!(
                    "SELECT {USER_COLUMNS} FROM users WHERE LOWER(email) = LOWER($1)"
                ))
                .bind(email)
                .fetch_optional(&self.pool)
                .await?
            }
            _ => {
                return Err(DbError::Internal(
                    "get_user requires at least one filter".into(),
                ));
            }
        };

        user.ok_or_else(|| DbError::not_found("user"))
    }

    pub async fn find_user_id_by_email(&self, email: &str) -> DbResult<Option<Uuid>> {
        let id: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM users WHERE LOWER(email) = LOWER($1)")
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;
        Ok(id)
    }

    pub async fn mark_email_verified(&self, user_id: Uuid) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET email_verified_at = COALESCE(email_verified_at, $2),
                updated_at = $2
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Deletes a user; accounts, sessions and subscriptions go with it.
    pub async fn delete_user(&self, user_id: Uuid) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found_with_id("user", user_id.to_string()));
        }
        Ok(())
    }

    // =========================================================================
    // Accounts
    // =========================================================================

    #[builder]
    pub async fn get_user_by_account(
        &self,
        provider: OAuthProvider,
        provider_account_id: &str,
    ) -> DbResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT u.id, u.name, u.email, u.email_verified_at, u.image, u.created_at, u.updated_at
            FROM users u
            INNER JOIN accounts a ON u.id = a.user_id
            WHERE a.provider = $1 AND a.provider_account_id = $2
            "#,
        )
        .bind(provider)
        .bind(provider_account_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    #[builder]
    pub async fn create_account(
        &self,
        user_id: Uuid,
        provider: OAuthProvider,
        provider_account_id: String,
        access_token: Option<String>,
        refresh_token: Option<String>,
        access_token_expires_at: Option<DateTime<Utc>>,
        scope: Option<String>,
    ) -> DbResult<Account> {
        let id = Uuid::now_v7();
        let now = Utc::now();

        let account = sqlx::query_as::<_, Account>(
            r#"
            INSERT INTO accounts (
                id, user_id, provider, provider_account_id, access_token,
                refresh_token, access_token_expires_at, scope, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
            RETURNING id, user_id, provider, provider_account_id, access_token,
                      refresh_token, access_token_expires_at, scope, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(provider)
        .bind(&provider_account_id)
        .bind(&access_token)
        .bind(&refresh_token)
        .bind(access_token_expires_at)
        .bind(&scope)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(account)
    }

    /// Creates a user and its first linked account in one transaction.
    #[builder]
    pub async fn create_user_with_account(
        &self,
        email: String,
        name: Option<String>,
        image: Option<String>,
        email_verified: bool,
        provider: OAuthProvider,
        provider_account_id: String,
        access_token: Option<String>,
        refresh_token: Option<String>,
        access_token_expires_at: Option<DateTime<Utc>>,
        scope: Option<String>,
    ) -> DbResult<User> {
        let user_id = Uuid::now_v7();
        let now = Utc::now();
        let verified_at = email_verified.then_some(now);

        let mut tx = self.pool.begin().await?;

        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (id, name, email, email_verified_at, image, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(&name)
        .bind(&email)
        .bind(verified_at)
        .bind(&image)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO accounts (
                id, user_id, provider, provider_account_id, access_token,
                refresh_token, access_token_expires_at, scope, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(user_id)
        .bind(provider)
        .bind(&provider_account_id)
        .bind(&access_token)
        .bind(&refresh_token)
        .bind(access_token_expires_at)
        .bind(&scope)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(user)
    }

    #[builder]
    pub async fn update_account_tokens(
        &self,
        provider: OAuthProvider,
        provider_account_id: &str,
        access_token: Option<String>,
        refresh_token: Option<String>,
        access_token_expires_at: Option<DateTime<Utc>>,
        scope: Option<String>,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE accounts
            SET access_token = COALESCE($3, access_token),
                refresh_token = COALESCE($4, refresh_token),
                access_token_expires_at = COALESCE($5, access_token_expires_at),
                scope = COALESCE($6, scope),
                updated_at = $7
            WHERE provider = $1 AND provider_account_id = $2
            "#,
        )
        .bind(provider)
        .bind(provider_account_id)
        .bind(&access_token)
        .bind(&refresh_token)
        .bind(access_token_expires_at)
        .bind(&scope)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found_with_id("account", provider_account_id));
        }
        Ok(())
    }

    // =========================================================================
    // Sessions
    // =========================================================================

    #[builder]
    pub async fn create_session(
        &self,
        user_id: Uuid,
        token_hash: Vec<u8>,
        expires_at: DateTime<Utc>,
    ) -> DbResult<Session> {
        let session = sqlx::query_as::<_, Session>(
            r#"
            INSERT INTO sessions (id, user_id, token_hash, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, user_id, token_hash, expires_at, created_at
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(user_id)
        .bind(&token_hash)
        .bind(expires_at)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(session)
    }

    pub async fn get_session_with_user(
        &self,
        token_hash: &[u8],
    ) -> DbResult<Option<SessionWithUser>> {
        let row = sqlx::query_as::<_, SessionWithUser>(
            r#"
            SELECT s.id, s.user_id, s.token_hash, s.expires_at, s.created_at,
                   u.name AS user_name, u.email AS user_email, u.image AS user_image
            FROM sessions s
            INNER JOIN users u ON u.id = s.user_id
            WHERE s.token_hash = $1
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Returns whether a session was removed.
    pub async fn delete_session(&self, token_hash: &[u8]) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM sessions WHERE token_hash = $1")
            .bind(token_hash)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_expired_sessions(&self) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= $1")
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    // =========================================================================
    // OAuth login state
    // =========================================================================

    #[builder]
    pub async fn create_oauth_state(
        &self,
        state: String,
        provider: OAuthProvider,
        pkce_verifier: String,
        redirect_to: Option<String>,
        expires_at: DateTime<Utc>,
    ) -> DbResult<OAuthState> {
        let oauth_state = sqlx::query_as::<_, OAuthState>(
            r#"
            INSERT INTO oauth_states (id, state, provider, pkce_verifier, redirect_to, consumed, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5, FALSE, $6, $7)
            RETURNING id, state, provider, pkce_verifier, redirect_to, consumed, expires_at, created_at
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(&state)
        .bind(provider)
        .bind(&pkce_verifier)
        .bind(&redirect_to)
        .bind(expires_at)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(oauth_state)
    }

    /// Marks an unexpired, unconsumed state as consumed and returns it.
    pub async fn consume_oauth_state(&self, state: &str) -> DbResult<OAuthState> {
        let oauth_state = sqlx::query_as::<_, OAuthState>(
            r#"
            UPDATE oauth_states
            SET consumed = TRUE
            WHERE state = $1 AND consumed = FALSE AND expires_at > $2
            RETURNING id, state, provider, pkce_verifier, redirect_to, consumed, expires_at, created_at
            "#,
        )
        .bind(state)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        oauth_state.ok_or_else(|| DbError::not_found("oauth state"))
    }

    pub async fn delete_expired_oauth_states(&self) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM oauth_states WHERE expires_at <= $1 OR consumed")
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// Inserts or updates the subscription identified by
    /// `stripe_subscription_id`. The unique constraint on that column makes
    /// concurrent and repeated deliveries converge on a single row.
    #[builder]
    pub async fn upsert_subscription(
        &self,
        user_id: Uuid,
        plan: &str,
        status: SubscriptionStatus,
        stripe_customer_id: Option<&str>,
        stripe_subscription_id: &str,
        current_period_end: PeriodEndWrite,
    ) -> DbResult<Subscription> {
        let now = Utc::now();

        let subscription = sqlx::query_as::<_, Subscription>(&format!(
            r#"
            INSERT INTO subscriptions (
                id, user_id, plan, status, stripe_customer_id,
                stripe_subscription_id, current_period_end, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
            ON CONFLICT (stripe_subscription_id) DO UPDATE
            SET user_id = EXCLUDED.user_id,
                plan = EXCLUDED.plan,
                status = EXCLUDED.status,
                stripe_customer_id = COALESCE(EXCLUDED.stripe_customer_id, subscriptions.stripe_customer_id),
                current_period_end = CASE WHEN $9 THEN EXCLUDED.current_period_end
                                          ELSE subscriptions.current_period_end END,
                updated_at = EXCLUDED.updated_at
            RETURNING {SUBSCRIPTION_COLUMNS}
            "#
        ))
        .bind(Uuid::now_v7())
        .bind(user_id)
        .bind(plan)
        .bind(status)
        .bind(stripe_customer_id)
        .bind(stripe_subscription_id)
        .bind(current_period_end.value())
        .bind(now)
        .bind(matches!(current_period_end, PeriodEndWrite::Set(_)))
        .fetch_one(&self.pool)
        .await?;

        Ok(subscription)
    }

    /// Updates every row carrying `stripe_subscription_id` (zero or one) and
    /// returns how many were touched.
    #[builder]
    pub async fn update_subscription_status(
        &self,
        stripe_subscription_id: &str,
        status: SubscriptionStatus,
        current_period_end: PeriodEndWrite,
    ) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE subscriptions
            SET status = $2,
                current_period_end = CASE WHEN $4 THEN $3 ELSE current_period_end END,
                updated_at = $5
            WHERE stripe_subscription_id = $1
            "#,
        )
        .bind(stripe_subscription_id)
        .bind(status)
        .bind(current_period_end.value())
        .bind(matches!(current_period_end, PeriodEndWrite::Set(_)))
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// The subscription that currently describes the user's plan: entitled
    /// rows first, then the most recently updated.
    pub async fn get_current_subscription(&self, user_id: Uuid) -> DbResult<Option<Subscription>> {
        let subscription = sqlx::query_as::<_, Subscription>(&format!(
            r#"
            SELECT {SUBSCRIPTION_COLUMNS}
            FROM subscriptions
            WHERE user_id = $1
            ORDER BY (status IN ('active', 'trialing')) DESC, updated_at DESC
            LIMIT 1
            "#
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(subscription)
    }

    // =========================================================================
    // Webhook ledger
    // =========================================================================

    #[builder]
    pub async fn record_webhook_event(
        &self,
        event_id: &str,
        event_type: &str,
        outcome: WebhookEventOutcome,
        error: Option<String>,
    ) -> DbResult<()> {
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO webhook_events (event_id, event_type, outcome, error, attempts, created_at, updated_at)
            VALUES ($1, $2, $3, $4, 1, $5, $5)
            ON CONFLICT (event_id) DO UPDATE
            SET outcome = EXCLUDED.outcome,
                error = EXCLUDED.error,
                attempts = webhook_events.attempts + 1,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(event_id)
        .bind(event_type)
        .bind(outcome)
        .bind(&error)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

// tests/common/mod.rs

#![allow(dead_code)]

use std::sync::{Arc, OnceLock};

use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use vocablab::{
    config::{Config, DEFAULT_LLM_BASE_URL, DEFAULT_LLM_MODEL},
    routes,
    scoring::FixedScorer,
    state::AppState,
    utils::{
        hash::hash_password,
        jwt::{ROLE_ADMIN, ROLE_LEARNER, sign_jwt},
    },
};

pub const ADMIN_EMAIL: &str = "admin@lab.test";

/// Password every seeded user gets.
pub const TEST_PASSWORD: &str = "learn-more-words";

/// Argon2 is slow on purpose; hash the shared password once per test binary.
fn test_password_hash() -> &'static str {
    static HASH: OnceLock<String> = OnceLock::new();
    HASH.get_or_init(|| hash_password(TEST_PASSWORD).expect("Failed to hash test password"))
}

pub struct TestApp {
    pub address: String,
    pub pool: SqlitePool,
    pub config: Config,
    pub client: reqwest::Client,
}

pub fn test_config() -> Config {
    Config {
        database_url: "sqlite::memory:".to_string(),
        jwt_secret: "test_secret_for_integration_tests".to_string(),
        jwt_expiration: 600, // 10 minutes for tests
        rust_log: "error".to_string(),
        admin_emails: vec![ADMIN_EMAIL.to_string()],
        admin_password: None,
        llm_api_key: None,
        llm_base_url: DEFAULT_LLM_BASE_URL.to_string(),
        llm_model: DEFAULT_LLM_MODEL.to_string(),
        static_dir: "static".to_string(),
        bind_addr: "127.0.0.1:0".to_string(),
    }
}

/// A migrated in-memory database. One connection, kept alive for the
/// whole test, so every query sees the same database.
pub async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory SQLite");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");
    pool
}

pub async fn test_state() -> AppState {
    AppState {
        pool: test_pool().await,
        config: test_config(),
        scorer: Arc::new(FixedScorer::uniform(4.0)),
    }
}

/// Spawns the app on a random port.
pub async fn spawn_app() -> TestApp {
    let state = test_state().await;
    let pool = state.pool.clone();
    let config = state.config.clone();
    let app = routes::create_router(state);

    // Bind to port 0 to get a random available port
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp {
        address: format!("http://127.0.0.1:{}", port),
        pool,
        config,
        client: reqwest::Client::new(),
    }
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    pub fn token(&self, user_id: i64, admin: bool) -> String {
        let role = if admin { ROLE_ADMIN } else { ROLE_LEARNER };
        sign_jwt(user_id, role, &self.config.jwt_secret, self.config.jwt_expiration).unwrap()
    }

    pub async fn get(&self, path: &str, token: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn post(&self, path: &str, token: &str, body: serde_json::Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn admin_token(&self) -> String {
        let id = create_user(&self.pool, ADMIN_EMAIL).await;
        self.token(id, true)
    }
}

/// Seeds a user whose password is [`TEST_PASSWORD`].
pub async fn create_user(pool: &SqlitePool, email: &str) -> i64 {
    let (id,): (i64,) = sqlx::query_as(
        "INSERT INTO users (email, password_hash) VALUES (?, ?) \
         ON CONFLICT(email) DO UPDATE SET email = excluded.email RETURNING id",
    )
    .bind(email)
    .bind(test_password_hash())
    .fetch_one(pool)
    .await
    .expect("Failed to seed user");
    id
}

pub async fn create_course(pool: &SqlitePool, name: &str, groups: &str, quiz_config: &str) -> i64 {
    let (id,): (i64,) = sqlx::query_as(
        "INSERT INTO courses (name, group_names, stage_config, quiz_config) \
         VALUES (?, ?, ?, ?) RETURNING id",
    )
    .bind(name)
    .bind(groups)
    .bind(r#"{"Common": [{"name": "Stage 1"}, {"name": "Stage 2"}]}"#)
    .bind(quiz_config)
    .fetch_one(pool)
    .await
    .expect("Failed to seed course");
    id
}

pub async fn enroll(pool: &SqlitePool, user_id: i64, course_id: i64, group: &str) {
    sqlx::query("INSERT INTO enrollments (user_id, course_id, group_name) VALUES (?, ?, ?)")
        .bind(user_id)
        .bind(course_id)
        .bind(group)
        .execute(pool)
        .await
        .expect("Failed to seed enrollment");
}

/// A quiz result as the submission handler would have stored it.
pub struct SeedResult<'a> {
    pub user_id: i64,
    pub course_id: i64,
    pub attempt: i64,
    pub group: Option<&'a str>,
    pub sections: serde_json::Value,
    pub mental: f64,
    pub deleted: bool,
}

pub async fn insert_result(pool: &SqlitePool, r: SeedResult<'_>) -> i64 {
    let nasa = serde_json::json!({
        "mental": r.mental, "physical": 20, "temporal": 30,
        "performance": 40, "effort": 50, "frustration": 10
    });
    let timings = serde_json::json!({"Stage 1": 100, "Stage 2": 50, "Quiz": 60 + r.attempt * 5});
    let (id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO quiz_results (
            user_id, course_id, attempt, group_name, nasa_tlx_score, nasa_details_json,
            learning_duration_seconds, stage_timing_json, section_stats, is_deleted
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(r.user_id)
    .bind(r.course_id)
    .bind(r.attempt)
    .bind(r.group)
    .bind(r.mental)
    .bind(nasa.to_string())
    .bind(150.0)
    .bind(timings.to_string())
    .bind(r.sections.to_string())
    .bind(r.deleted)
    .fetch_one(pool)
    .await
    .expect("Failed to seed quiz result");
    id
}

use anyhow::{anyhow, Result};
use tracing::info;

use crate::app::auth::{AuthService, RegisterOutcome};
use crate::app::threads::{NewThread, ThreadService};
use crate::app::users::UserService;
use crate::config::SeedAdmin;
use crate::domain::user::{Role, User};
use crate::AppState;

const WELCOME_TITLE: &str = "Welcome to the board";
const WELCOME_BODY: &str = "Introduce yourself, read the rules, and be kind to each other.";

/// Ensures an admin account exists and the board has a first thread.
/// Safe to run repeatedly.
pub async fn run(state: &AppState, admin: &SeedAdmin) -> Result<()> {
    let auth = AuthService::new(state.db.clone(), state.token_key, state.token_ttl_days);
    let users = UserService::new(state.db.clone());

    let existing = auth.find_by_email(&admin.email).await?;
    let account = match existing {
        Some(user) => user,
        None => register_admin(&auth, admin).await?,
    };

    let account = if account.role.is_admin() {
        account
    } else {
        users
            .update_role(account.id, Role::Admin)
            .await?
            .ok_or_else(|| anyhow!("seed admin {} disappeared", account.id))?
    };
    info!(user_id = %account.id, username = account.username.as_str(), "seed admin ready");

    let threads = ThreadService::new(state.db.clone());
    if threads.count_threads().await? == 0 {
        let thread = threads
            .create_thread(
                NewThread {
                    title: WELCOME_TITLE.to_string(),
                    body: WELCOME_BODY.to_string(),
                    tags: Some("welcome".to_string()),
                    category_id: None,
                    author_id: account.id,
                },
                None,
            )
            .await?;
        info!(thread_id = %thread.id, "created welcome thread");
    }

    Ok(())
}

async fn register_admin(auth: &AuthService, admin: &SeedAdmin) -> Result<User> {
    match auth
        .register(&admin.username, &admin.email, &admin.password)
        .await?
    {
        RegisterOutcome::Created(user) => Ok(user),
        RegisterOutcome::UsernameTaken => Err(anyhow!(
            "seed admin username {} belongs to another account",
            admin.username
        )),
        RegisterOutcome::EmailTaken => Err(anyhow!("seed admin email was taken concurrently")),
    }
}

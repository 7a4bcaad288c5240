use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{
    Router,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use sitegate_auth::broker::HttpProviderClient;
use sitegate_auth::clock::SystemClock;
use sitegate_auth::password::hash_password;
use sitegate_auth::storage::{
    AccountStore, MemoryAccountStore, MemorySessionStore, MemoryTaskQueue, NewAccount,
};
use sitegate_auth::token::{Roles, signing_key_from_config};
use sitegate_auth::{
    AuthState, Collaborators, MatchMode, RequestSource, RoutePolicy, Scopes, account_routes,
    guarded,
};

use crate::config::{AppConfig, SeedAccount};
use crate::handlers;

pub const PING_PATH: &str = "/ping";
pub const MAILING_LIST_WEBHOOK_PATH: &str = "/webhooks/mailing-list";

/// The full route table: account endpoints plus the server's own routes.
pub fn build_app(state: AuthState) -> Router {
    Router::new()
        .merge(account_routes(&state))
        .route(
            PING_PATH,
            guarded(
                get(handlers::ping),
                &state,
                RoutePolicy::requires(Scopes::ACCOUNT_FULL_ANY, MatchMode::Any),
            ),
        )
        .route(
            MAILING_LIST_WEBHOOK_PATH,
            guarded(
                post(handlers::mailing_list_webhook),
                &state,
                RoutePolicy::public().from_source(RequestSource::TaskRunner),
            ),
        )
        .layer(
            TraceLayer::new_for_http().make_span_with(|req: &axum::http::Request<_>| {
                tracing::info_span!(
                    "http.request",
                    method = %req.method(),
                    path = %req.uri().path(),
                )
            }),
        )
        .with_state(state)
}

/// Auth services over in-memory stores and the HTTP provider client.
pub async fn build_state(cfg: &AppConfig) -> anyhow::Result<AuthState> {
    let signing_key =
        signing_key_from_config(&cfg.auth.signing).context("signing key setup failed")?;
    let providers =
        HttpProviderClient::new(&cfg.auth.broker).context("provider client setup failed")?;

    let accounts = Arc::new(MemoryAccountStore::new());
    for seed in &cfg.bootstrap.accounts {
        seed_account(accounts.as_ref(), seed).await?;
    }

    Ok(AuthState::new(
        cfg.auth.clone(),
        signing_key,
        Collaborators {
            sessions: Arc::new(MemorySessionStore::new()),
            accounts,
            tasks: Arc::new(MemoryTaskQueue::new()),
            providers: Arc::new(providers),
            clock: Arc::new(SystemClock),
        },
    ))
}

async fn seed_account(accounts: &dyn AccountStore, seed: &SeedAccount) -> anyhow::Result<()> {
    let username = seed.username.trim().to_lowercase();
    let password_hash = hash_password(&seed.password)
        .map_err(|e| anyhow::anyhow!("cannot hash password of {username}: {e}"))?;
    let account = accounts
        .register(NewAccount {
            username: username.clone(),
            password_hash,
            email: seed.email.clone().unwrap_or_else(|| username.clone()),
            fname: seed.fname.clone(),
            lname: seed.lname.clone(),
            active: true,
            roles: Roles::NONE,
            parent_id: None,
        })
        .await
        .with_context(|| format!("cannot seed account {username}"))?;
    tracing::info!(account_id = account.id, username = %account.username, "Seeded account");
    Ok(())
}

pub struct SitegateServer {
    addr: SocketAddr,
    app: Router,
}

impl SitegateServer {
    pub async fn build(cfg: AppConfig) -> anyhow::Result<Self> {
        let state = build_state(&cfg).await?;
        Ok(Self {
            addr: cfg.addr(),
            app: build_app(state),
        })
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.addr).await?;
        self.serve(listener).await
    }

    /// Serves on an already bound listener until Ctrl+C.
    pub async fn serve(self, listener: TcpListener) -> anyhow::Result<()> {
        tracing::info!("listening on {}", listener.local_addr()?);
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}

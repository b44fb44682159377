mod admin;
mod app;
mod auth;
mod billing;
mod config;
mod conversation;
mod error;
mod llm;
mod sessions;
mod state;
#[cfg(test)]
mod testing;
mod tts;
mod users;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "linguachat=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let state = state::AppState::init()?;
    tracing::info!(
        users = state.users.list_all().len(),
        model = %state.config.llm.model,
        "state initialised"
    );

    app::serve(app::build_app(state)).await
}

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

use shifter_application::{AnalyticsEvent, EnergyStore, ProgressionStore, SessionStore};
use shifter_core::config::ShifterConfig;
use shifter_core::session::{Session, SessionStatus};
use shifter_core::{AuthError, ShifterError};
use shifter_infrastructure::connect;

#[derive(Args)]
pub struct DemoArgs {
    #[arg(long, default_value = "a@b.com")]
    email: String,
    #[arg(long, default_value = "pw123456")]
    password: String,
    #[arg(long, default_value = "Ana")]
    name: String,
    /// Energy focus to activate
    #[arg(long, default_value = "crown")]
    energy: String,
    /// Points to award, in order
    #[arg(long = "award", default_values_t = vec![100i64])]
    awards: Vec<i64>,
    /// Leave the session signed in at the end
    #[arg(long)]
    stay_signed_in: bool,
}

pub async fn run(
    config: &ShifterConfig,
    args: DemoArgs,
    mut analytics: UnboundedReceiver<AnalyticsEvent>,
) -> Result<()> {
    let backend = connect(&config.backend)?;
    tracing::info!(kind = ?config.backend.kind, "Connected to backend");
    let session = Arc::new(
        SessionStore::new(backend.auth.clone(), backend.rows.clone())
            .with_profile_table(config.backend.profile_table.clone())
            .with_progression_table(config.progression.table()),
    );
    let listener = session.spawn_auth_listener();
    let energy = EnergyStore::from_settings(&config.energy);
    let progression = ProgressionStore::new(session.clone());

    let status = session
        .initialize()
        .await
        .context("Failed to restore session")?;
    print_step("initialize", &session_view(&session.current()))?;

    if status != SessionStatus::Authenticated {
        match session.sign_up(&args.email, &args.password, &args.name).await {
            Ok(_) => {}
            Err(ShifterError::Auth(AuthError::AlreadyRegistered(_))) => {
                tracing::info!(email = %args.email, "Account already exists; signing in instead");
                session
                    .sign_in(&args.email, &args.password)
                    .await
                    .context("Account exists but sign-in failed")?;
            }
            Err(e) => return Err(e).context("Sign-up failed"),
        }
        print_step("sign in", &session_view(&session.current()))?;
    }

    energy.activate_named(&args.energy, Some("demo"))?;
    print_step("activate", &energy.read())?;

    for amount in args.awards {
        let outcome = progression
            .add_score_with_reason(amount, Some("demo".to_string()))
            .await
            .with_context(|| format!("Failed to award {} points", amount))?;
        print_step("award", &outcome)?;
    }
    print_step("progression", &progression.snapshot())?;

    if !args.stay_signed_in {
        session.sign_out().await;
        print_step("sign out", &session_view(&session.current()))?;
    }
    listener.abort();
    tracing::debug!("Demo finished");

    while let Ok(event) = analytics.try_recv() {
        print_step("analytics", &event)?;
    }
    Ok(())
}

/// Session without its token, safe to print.
fn session_view(session: &Session) -> serde_json::Value {
    serde_json::json!({
        "status": session.status,
        "profile": session.profile,
        "lastError": session.last_error,
    })
}

fn print_step(label: &str, value: &impl Serialize) -> Result<()> {
    println!("== {}", label);
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

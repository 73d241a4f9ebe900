//! Sign-in, token, status and sign-out commands

use crate::cli::commands::AuthTarget;
use crate::config::CliConfig;
use crate::error::{CliError, Result};
use crate::output::{
    compress_path, json_output, print_error, print_info, print_link, print_success,
    print_warning,
};
use chrono::{DateTime, Utc};
use console::style;
use dialoguer::Confirm;
use serde::Serialize;
use signet_sdk::auth::{
    AccountType, ClassifiedFailure, OAuth2ProviderFactory, Scopes, Session, Token,
    TokenAcquisitionEngine,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Build an engine over the configured provider and session store
pub fn build_engine(config: &CliConfig, launch_browser: bool) -> Result<TokenAcquisitionEngine> {
    let store = config.session_store()?;

    let factory = OAuth2ProviderFactory::new(config.provider.clone(), store.clone())?
        .with_browser(launch_browser)
        .with_url_notifier(move |url| {
            // stderr only: `signet token` writes the token to stdout
            let label = if launch_browser {
                "Complete sign-in in your browser. If it did not open, visit:"
            } else {
                "Open this URL to sign in:"
            };
            print_link(label, url);
        });

    Ok(TokenAcquisitionEngine::new(
        Arc::new(factory),
        config.provider.instance.clone(),
        Arc::new(Session::new(store)),
    ))
}

/// Acquire a token, cancelling the attempt on Ctrl-C
async fn acquire_with_interrupt(
    engine: &TokenAcquisitionEngine,
    scopes: &Scopes,
    account_type: AccountType,
) -> std::result::Result<Token, ClassifiedFailure> {
    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                debug!("Interrupt received, cancelling sign-in");
                cancel.cancel();
            }
        })
    };

    let result = engine
        .acquire_token_with_cancel(scopes, account_type, cancel)
        .await;
    watcher.abort();
    result
}

/// Run a terminal prompt on the blocking pool so it does not stall the runtime
async fn run_prompt<T, F>(prompt: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> dialoguer::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(prompt)
        .await
        .map_err(|e| CliError::Internal(e.into()))?
        .map_err(|e| CliError::Internal(e.into()))
}

async fn confirm_retry() -> Result<bool> {
    run_prompt(|| {
        Confirm::new()
            .with_prompt("Login failed. Do you want to try again?")
            .default(true)
            .interact()
    })
    .await
}

fn describe_expiry(expires_on: DateTime<Utc>) -> String {
    let remaining = expires_on.signed_duration_since(Utc::now());
    if remaining.num_seconds() <= 0 {
        "expired".to_string()
    } else if remaining.num_hours() > 0 {
        format!(
            "expires in {}h {}m",
            remaining.num_hours(),
            remaining.num_minutes() % 60
        )
    } else {
        format!("expires in {}m", remaining.num_minutes().max(1))
    }
}

/// Handle `signet login`
pub async fn handle_login(
    config: &CliConfig,
    target: AuthTarget,
    launch_browser: bool,
    allow_retry: bool,
) -> Result<()> {
    let engine = build_engine(config, launch_browser)?;
    let scopes = config.scopes(&target.scopes)?;
    let account_type = target.account_type.unwrap_or(config.defaults.account_type);

    loop {
        match acquire_with_interrupt(&engine, &scopes, account_type).await {
            Ok(token) => {
                let who = token.username.as_deref().unwrap_or("unknown account");
                print_success(&format!("Signed in as {}", style(who).bold()));
                print_info(&format!(
                    "Access token for {} {}",
                    scopes,
                    describe_expiry(token.expires_on)
                ));
                return Ok(());
            }
            Err(ClassifiedFailure::Cancelled) => {
                print_warning("Sign-in cancelled");
                return Err(ClassifiedFailure::Cancelled.into());
            }
            Err(failure) => {
                print_error(&format!("Login failed: {failure}"));
                if !allow_retry || !confirm_retry().await? {
                    return Err(failure.into());
                }
            }
        }
    }
}

#[derive(Serialize)]
struct TokenView<'a> {
    access_token: &'a str,
    expires_on: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<&'a str>,
}

/// Handle `signet token`
pub async fn handle_token(
    config: &CliConfig,
    target: AuthTarget,
    header: bool,
    launch_browser: bool,
    json: bool,
) -> Result<()> {
    let engine = build_engine(config, launch_browser)?;
    let scopes = config.scopes(&target.scopes)?;
    let account_type = target.account_type.unwrap_or(config.defaults.account_type);

    let token = acquire_with_interrupt(&engine, &scopes, account_type).await?;

    if json {
        json_output(&TokenView {
            access_token: &token.access_token,
            expires_on: token.expires_on,
            username: token.username.as_deref(),
        })
    } else if header {
        println!("{}", token.bearer());
        Ok(())
    } else {
        println!("{}", token.access_token);
        Ok(())
    }
}

/// Handle `signet logout`
pub async fn handle_logout(config: &CliConfig, account_type: Option<AccountType>) -> Result<()> {
    let engine = build_engine(config, false)?;
    let account_type = account_type.unwrap_or(config.defaults.account_type);

    if engine.sign_out(account_type).await {
        print_success("Signed out");
        Ok(())
    } else {
        print_warning("Local session cleared, but the provider still holds the account");
        Err(CliError::SignOutIncomplete)
    }
}

#[derive(Serialize)]
struct StatusView {
    store: String,
    signed_in: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    account: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    token_expires_on: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    token_scopes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    token_account_type: Option<AccountType>,
    try_silent_first: bool,
}

/// Handle `signet status`
///
/// Reads the stored session directly, so it works before a client ID is
/// configured.
pub async fn handle_status(config: &CliConfig, json: bool) -> Result<()> {
    let store = config.session_store()?;
    let state = Session::new(store).snapshot().await;

    let store_label = match (&config.session.dir, config.session.store) {
        (Some(dir), backend) => format!("{backend} ({})", compress_path(dir)),
        (None, backend) => backend.to_string(),
    };

    let view = StatusView {
        store: store_label,
        signed_in: state.has_identity(),
        account: state.last_used_identifier.clone(),
        token_expires_on: state.cached_token.as_ref().and(state.token_expiration),
        token_scopes: state.token_scopes.as_ref().map(|s| s.to_string()),
        token_account_type: state.token_account_type,
        try_silent_first: state.try_silent_first,
    };

    if json {
        return json_output(&view);
    }

    match &view.account {
        Some(account) => print_success(&format!("Remembered account: {}", style(account).bold())),
        None => print_info("No remembered account. Run 'signet login' to sign in."),
    }

    if let Some(expires_on) = view.token_expires_on {
        let scopes = view.token_scopes.as_deref().unwrap_or("unknown scopes");
        print_info(&format!(
            "Cached token for {} {}",
            scopes,
            describe_expiry(expires_on)
        ));
    }

    let mode = if view.try_silent_first {
        "silent first"
    } else {
        "interactive first"
    };
    print_info(&format!("Next sign-in: {mode}"));
    print_info(&format!("Session store: {}", view.store));

    Ok(())
}

use tracing::{debug, warn};
use uuid::Uuid;

use super::providers::{select_provider, ProviderKind, ResolvedProvider, UserProviderConfig};
use crate::errors::AppError;
use crate::models::user::UserLlmConfigRow;
use crate::settings::store::load_provider_settings;
use crate::state::AppState;

/// Loads the caller's personal provider config, decrypting the key.
/// An undecryptable or unknown-provider config is treated as absent.
pub async fn load_user_config(
    state: &AppState,
    user_id: Uuid,
) -> Result<Option<UserProviderConfig>, AppError> {
    let row = sqlx::query_as::<_, UserLlmConfigRow>(
        "SELECT * FROM user_llm_configs WHERE user_id = $1",
    )
    .bind(user_id)
    .fetch_optional(&state.db)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let Some(provider) = ProviderKind::parse(&row.provider) else {
        warn!("User {user_id} has an unknown provider '{}'", row.provider);
        return Ok(None);
    };

    match state.secrets.decrypt(&row.api_key_encrypted) {
        Ok(api_key) => Ok(Some(UserProviderConfig {
            provider,
            api_key,
            base_url: row.base_url,
            model_name: row.model_name,
        })),
        Err(e) => {
            warn!("Could not decrypt LLM key for user {user_id}: {e}");
            Ok(None)
        }
    }
}

/// Picks the provider for a request made by `user_id`.
pub async fn resolve_provider(state: &AppState, user_id: Uuid) -> Result<ResolvedProvider, AppError> {
    let user_config = load_user_config(state, user_id).await?;
    let settings = load_provider_settings(&state.db, &state.secrets).await?;

    let resolved = select_provider(
        user_config.as_ref(),
        state.config.llm_default_provider,
        &settings,
    )?;

    debug!(
        "Resolved LLM provider {} ({:?}) for user {user_id}",
        resolved.kind, resolved.source
    );
    Ok(resolved)
}

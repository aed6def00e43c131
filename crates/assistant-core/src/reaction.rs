//! Reaction Toggle

use uuid::Uuid;

use crate::error::{AssistantError, Result};
use crate::model::Reaction;
use crate::store::ChatStore;

const MAX_EMOJI_LEN: usize = 32;

/// Toggle a user's emoji on a message and return the message's reactions,
/// ordered by creation time
///
/// Applying the same emoji twice restores the original set.
pub async fn toggle_reaction(
    store: &dyn ChatStore,
    message_id: Uuid,
    user_id: &str,
    emoji: &str,
) -> Result<Vec<Reaction>> {
    let emoji = emoji.trim();
    if emoji.is_empty() {
        return Err(AssistantError::Validation("Emoji is required".into()));
    }
    if emoji.len() > MAX_EMOJI_LEN || emoji.chars().any(char::is_whitespace) {
        return Err(AssistantError::Validation(format!("Invalid emoji '{emoji}'")));
    }

    let reactions = store.toggle_reaction(message_id, user_id, emoji).await?;
    tracing::debug!(%message_id, emoji, count = reactions.len(), "Reaction toggled");
    Ok(reactions)
}

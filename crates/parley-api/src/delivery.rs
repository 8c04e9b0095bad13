//! The direct-message pipeline.
//!
//! Sending: upload image -> encrypt text -> persist -> decrypt the stored
//! record -> push `newMessage` to the receiver if they are online.
//! Reading: load both directions of a conversation and decrypt each message
//! on its own, so one bad row cannot sink the batch.

use tracing::{debug, info};
use uuid::Uuid;

use parley_db::models::NewMessage;
use parley_types::api::SendMessageRequest;
use parley_types::events::GatewayEvent;
use parley_types::models::Message;

use crate::error::ApiResult;
use crate::rows::message_from_row;
use crate::state::{AppState, run_db};

/// Store a message from `sender_id` to `receiver_id` and deliver it live
/// when possible. Returns the plaintext representation.
///
/// Nothing is persisted if the upload or encryption fails, and nothing is
/// pushed if persisting fails.
pub async fn send_direct_message(
    state: &AppState,
    sender_id: Uuid,
    receiver_id: Uuid,
    req: SendMessageRequest,
) -> ApiResult<Message> {
    let image_url = match req.image.as_deref().filter(|s| !s.is_empty()) {
        Some(data_url) => Some(state.images.upload(data_url).await?),
        None => None,
    };

    let text = req.text.as_deref().filter(|s| !s.is_empty());
    let stored_text = state.cipher.encrypt(text)?;

    let sid = sender_id.to_string();
    let rid = receiver_id.to_string();
    let row = run_db(state, move |db| {
        db.insert_message(&NewMessage {
            sender_id: &sid,
            receiver_id: &rid,
            text: stored_text.as_deref(),
            image: image_url.as_deref(),
        })
    })
    .await?;

    let message = message_from_row(&state.cipher, row);

    let pushed = state
        .presence
        .send_to_user(receiver_id, GatewayEvent::NewMessage(message.clone()))
        .await;

    if pushed {
        debug!("Message {} pushed live to {}", message.id, receiver_id);
    } else {
        debug!("Receiver {} offline, message {} left for next fetch", receiver_id, message.id);
    }

    info!("Message {} sent {} -> {}", message.id, sender_id, receiver_id);
    Ok(message)
}

/// Every message between `user_id` and `peer_id`, oldest first, decrypted.
pub async fn read_conversation(state: &AppState, user_id: Uuid, peer_id: Uuid) -> ApiResult<Vec<Message>> {
    let me = user_id.to_string();
    let peer = peer_id.to_string();
    let rows = run_db(state, move |db| db.list_conversation(&me, &peer)).await?;

    Ok(rows
        .into_iter()
        .map(|row| message_from_row(&state.cipher, row))
        .collect())
}

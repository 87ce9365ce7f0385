// SPDX-FileCopyrightText: 2026 Ratel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Event handlers for the long-poll listener.
//!
//! The new-message flow runs as a pipeline of isolated steps: persist,
//! command dispatch, ingest, image recognition, trigger lookup, and LLM
//! escalation. A failing step logs and the rest of the pipeline continues;
//! one broken remote service must not silence the bot.

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use rand::seq::SliceRandom;
use ratel_config::model::{BotConfig, VkConfig};
use ratel_core::events::{Attachment, OutboundMessage, PlatformEvent, VkMessage};
use ratel_core::platform::{MediaFetcher, ObjectStore, PlatformClient};
use ratel_core::RatelError;
use ratel_storage::models::ChatMessageRow;
use ratel_storage::queries::{messages, triggers};
use ratel_storage::Database;
use tracing::{debug, warn};

use crate::commands::CommandRegistry;
use crate::outbound::queue_send;
use crate::rpc_methods::BotRpc;
use crate::voting;
use crate::worker::TaskQueue;

/// Document extensions treated as voice messages.
const VOICE_EXTENSIONS: [&str; 3] = ["ogg", "mp3", "wav"];

/// Everything a handler invocation needs. One context lives per service
/// run; handlers borrow it.
pub struct BotContext {
    pub db: Arc<Database>,
    pub platform: Arc<dyn PlatformClient>,
    pub media: Arc<dyn MediaFetcher>,
    pub store: Option<Arc<dyn ObjectStore>>,
    pub rpc: Arc<dyn BotRpc>,
    pub queue: TaskQueue,
    pub commands: Arc<CommandRegistry>,
    pub vk: VkConfig,
    pub bot: BotConfig,
}

/// Route one long-poll event. Handler errors are logged, never propagated;
/// the listener loop must keep draining.
pub async fn dispatch_event(ctx: &BotContext, event: &PlatformEvent) {
    match event {
        PlatformEvent::NewMessage(msg) => handle_new_message(ctx, msg).await,
        PlatformEvent::MessageReply(msg) => {
            // Echoes of our own sends; keep the history complete.
            if let Err(e) = persist(ctx, msg).await {
                warn!(error = %e, "reply echo not persisted");
            }
        }
        PlatformEvent::CallbackEvent(cb) => {
            debug!(event_id = cb.event_id.as_str(), "callback event ignored");
        }
        PlatformEvent::PollVoteNew(vote) => {
            if let Err(e) = voting::handle_poll_vote(ctx, vote).await {
                warn!(poll_id = vote.poll_id, error = %e, "poll vote handling failed");
            }
        }
    }
}

pub async fn handle_new_message(ctx: &BotContext, msg: &VkMessage) {
    if let Err(e) = persist(ctx, msg).await {
        warn!(message_id = msg.id, error = %e, "message not persisted");
    }
    if msg.from_bot() {
        return;
    }

    let text = msg.text.trim();
    if text.starts_with(&ctx.bot.command_prefix) {
        crate::commands::dispatch(ctx, msg).await;
        return;
    }

    if ctx.vk.ingest_peer_id != 0 && msg.peer_id.0 == ctx.vk.ingest_peer_id {
        ingest_media(ctx, msg).await;
    }

    let mut extra = image_search_terms(ctx, msg).await;
    extra.extend(speech_transcripts(ctx, msg).await);
    let haystack = build_haystack(msg, &extra);

    match respond_to_trigger(ctx, msg, &haystack).await {
        Ok(true) => return,
        Ok(false) => {}
        Err(e) => warn!(message_id = msg.id, error = %e, "trigger lookup failed"),
    }

    if addresses_bot(&ctx.vk, msg) {
        if let Err(e) = escalate_to_llm(ctx, msg).await {
            warn!(message_id = msg.id, error = %e, "llm escalation failed");
        }
    }
}

async fn persist(ctx: &BotContext, msg: &VkMessage) -> Result<(), RatelError> {
    let attachments = if msg.attachments.is_empty() {
        None
    } else {
        Some(
            serde_json::to_string(&msg.attachments)
                .map_err(|e| RatelError::Internal(format!("attachment encode: {e}")))?,
        )
    };
    let row = ChatMessageRow {
        id: 0,
        from_id: msg.from_id.0,
        peer_id: msg.peer_id.0,
        from_chat: msg.from_chat(),
        from_bot: msg.from_bot(),
        date: msg.date,
        text: msg.text.clone(),
        attachments,
        reply_message_id: msg.reply_message.as_ref().map(|r| r.id),
    };
    messages::insert_message(&ctx.db, &row).await?;
    Ok(())
}

/// Push media from the ingest chat into the repost pipeline: videos start a
/// vote, photos go to the object store.
async fn ingest_media(ctx: &BotContext, msg: &VkMessage) {
    for attachment in flatten_attachments(&msg.attachments) {
        if let Some(reference) = attachment.video_reference() {
            if let Err(e) = voting::start_vote(ctx, &reference).await {
                warn!(reference = reference.as_str(), error = %e, "vote not started");
            }
        } else if let (Some(url), Some(store)) = (attachment.largest_photo_url(), &ctx.store) {
            let key = format!("ingest/{}_{}.jpg", msg.peer_id.0, msg.id);
            if let Err(e) = store.put_from_url(&key, url).await {
                warn!(key = key.as_str(), error = %e, "ingest photo not stored");
            }
        }
    }
}

/// Wall reposts carry their media one level down.
fn flatten_attachments(attachments: &[Attachment]) -> Vec<&Attachment> {
    let mut flat = Vec::new();
    for attachment in attachments {
        match attachment {
            Attachment::Wall { attachments } => flat.extend(flatten_attachments(attachments)),
            other => flat.push(other),
        }
    }
    flat
}

/// Run each attached photo through the recognizer. One failing image does
/// not drop the others.
async fn image_search_terms(ctx: &BotContext, msg: &VkMessage) -> Vec<String> {
    let mut terms = Vec::new();
    for url in msg.attachments.iter().filter_map(|a| a.largest_photo_url()) {
        match ctx.rpc.get_image_tags(url).await {
            Ok(response) => terms.extend(response.search_terms().map(str::to_string)),
            Err(e) => {
                warn!(message_id = msg.id, error = %e, "image recognition failed");
            }
        }
    }
    terms
}

/// Transcribe attached voice messages. The recognizer wants the raw bytes,
/// base64-encoded, with a filename whose extension names the codec.
async fn speech_transcripts(ctx: &BotContext, msg: &VkMessage) -> Vec<String> {
    let mut transcripts = Vec::new();
    for (url, ext) in msg.attachments.iter().filter_map(voice_doc) {
        let bytes = match ctx.media.download_bytes(url).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(message_id = msg.id, error = %e, "voice download failed");
                continue;
            }
        };
        let filename = voice_filename(url, ext);
        match ctx.rpc.speech_to_text(&filename, &BASE64.encode(&bytes)).await {
            Ok(text) if !text.is_empty() => transcripts.push(text),
            Ok(_) => {}
            Err(e) => warn!(message_id = msg.id, error = %e, "speech recognition failed"),
        }
    }
    transcripts
}

fn voice_doc(attachment: &Attachment) -> Option<(&str, &str)> {
    match attachment {
        Attachment::Doc { url, ext: Some(ext) } if VOICE_EXTENSIONS.contains(&ext.as_str()) => {
            Some((url.as_str(), ext.as_str()))
        }
        _ => None,
    }
}

fn voice_filename(url: &str, ext: &str) -> String {
    url.split('?')
        .next()
        .and_then(|path| path.rsplit('/').next())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("voice.{ext}"))
}

/// The trigger haystack is the message text plus recognizer output for the
/// attached media.
fn build_haystack(msg: &VkMessage, extra: &[String]) -> String {
    let mut haystack = msg.text.clone();
    for part in extra {
        haystack.push(' ');
        haystack.push_str(part);
    }
    haystack
}

/// Answer a matched trigger. When several candidates match, one is chosen
/// uniformly at random. Returns whether an answer was sent.
async fn respond_to_trigger(
    ctx: &BotContext,
    msg: &VkMessage,
    haystack: &str,
) -> Result<bool, RatelError> {
    if haystack.trim().is_empty() {
        return Ok(false);
    }
    let candidates = triggers::find_matching(&ctx.db, haystack).await?;
    let Some(chosen) = ({
        let mut rng = rand::thread_rng();
        candidates.choose(&mut rng).cloned()
    }) else {
        return Ok(false);
    };

    queue_send(
        ctx,
        OutboundMessage {
            peer_id: msg.peer_id,
            text: chosen.answer.clone().unwrap_or_default(),
            attachment: chosen.attachment.clone(),
            reply_to: Some(msg.id),
            ..OutboundMessage::default()
        },
    )?;

    let snapshot = serde_json::to_string(msg)
        .map_err(|e| RatelError::Internal(format!("message snapshot encode: {e}")))?;
    triggers::insert_history(&ctx.db, chosen.id, msg.from_id.0, &snapshot).await?;
    debug!(trigger_id = chosen.id, message_id = msg.id, "trigger answered");
    Ok(true)
}

/// A message reaches the LLM when it is a direct message, mentions the
/// community by alias or club link, or replies to something the bot said.
fn addresses_bot(vk: &VkConfig, msg: &VkMessage) -> bool {
    if !msg.from_chat() {
        return true;
    }
    if let Some(alias) = &vk.group_alias {
        if msg.text.contains(alias.as_str()) {
            return true;
        }
    }
    if msg
        .text
        .contains(&format!("[club{}|", vk.group_id.unsigned_abs()))
    {
        return true;
    }
    msg.reply_message.as_deref().is_some_and(VkMessage::from_bot)
}

/// Hand the message to the chat model. The quoted message, when present,
/// rides along above the user's text so the model sees what was answered.
async fn escalate_to_llm(ctx: &BotContext, msg: &VkMessage) -> Result<(), RatelError> {
    let prompt = match msg.reply_message.as_deref() {
        Some(quoted) if !quoted.text.is_empty() => format!("{}\n{}", quoted.text, msg.text),
        _ => msg.text.clone(),
    };
    if prompt.trim().is_empty() {
        return Ok(());
    }

    let reply = ctx.rpc.gpt_chat(msg.from_id.0, &prompt).await?;
    queue_send(
        ctx,
        OutboundMessage {
            peer_id: msg.peer_id,
            text: reply,
            reply_to: Some(msg.id),
            ..OutboundMessage::default()
        },
    )
}

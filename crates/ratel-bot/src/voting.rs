// SPDX-FileCopyrightText: 2026 Ratel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The voting repost pipeline.
//!
//! Media from the ingest chat is not reposted directly: a platform poll is
//! created whose question is the surrogate id of a local poll row, and the
//! chat votes. The first option to reach the threshold decides. The local
//! row is disabled before acting, so replayed or racing vote events are
//! idempotent.

use std::sync::Arc;

use ratel_core::events::{OutboundMessage, PollVoteEvent};
use ratel_core::types::PeerId;
use ratel_core::RatelError;
use ratel_storage::queries::{dyn_config, polls};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::handlers::BotContext;
use crate::outbound::queue_send;
use crate::task::BotTask;

/// Votes an option needs before the poll is decided.
pub const VOTE_THRESHOLD: u32 = 2;

/// Open a vote over the media behind `key` (a platform attachment
/// reference). A second piece of media with the same key while a vote is
/// still open is ignored.
pub async fn start_vote(ctx: &BotContext, key: &str) -> Result<(), RatelError> {
    if polls::get_enabled_by_key(&ctx.db, key).await?.is_some() {
        debug!(key, "vote already open");
        return Ok(());
    }

    let row_id = polls::insert(&ctx.db, key, "vk").await?;
    let reactions = dyn_config::reactions_map(&ctx.db).await?;
    let labels: Vec<String> = reactions.into_iter().map(|(label, _)| label).collect();

    // The question is the surrogate id; vote events resolve through it.
    let poll = ctx.platform.polls_create(&row_id.to_string(), &labels).await?;

    queue_send(
        ctx,
        OutboundMessage {
            peer_id: PeerId(ctx.vk.ingest_peer_id),
            attachment: Some(poll.attachment_reference()),
            ..OutboundMessage::default()
        },
    )?;
    info!(key, row_id, poll_id = poll.id, "vote opened");
    Ok(())
}

/// React to one vote event. Fetches the current tallies, and when an option
/// mapped in the reactions config reaches the threshold, disables the local
/// row and acts on the verdict. Only the call that flips the row acts.
pub async fn handle_poll_vote(ctx: &BotContext, vote: &PollVoteEvent) -> Result<(), RatelError> {
    let poll = ctx
        .platform
        .polls_get_by_id(vote.owner_id.0, vote.poll_id)
        .await?;

    let Ok(row_id) = poll.question.trim().parse::<i64>() else {
        debug!(poll_id = poll.id, "vote on a foreign poll ignored");
        return Ok(());
    };
    let Some(row) = polls::get(&ctx.db, row_id).await? else {
        debug!(row_id, "vote for an unknown poll row ignored");
        return Ok(());
    };
    if !row.enabled {
        debug!(row_id, "vote after decision ignored");
        return Ok(());
    }

    let reactions = dyn_config::reactions_map(&ctx.db).await?;
    let verdict = poll.options.iter().find_map(|option| {
        if option.votes < VOTE_THRESHOLD {
            return None;
        }
        reactions
            .iter()
            .find(|(label, _)| *label == option.text)
            .map(|(_, verdict)| *verdict)
    });
    let Some(approved) = verdict else {
        debug!(row_id, "threshold not reached yet");
        return Ok(());
    };

    if !polls::disable(&ctx.db, row_id).await? {
        // A concurrent event already decided this poll.
        return Ok(());
    }

    if approved {
        info!(row_id, key = row.key.as_str(), "vote approved, reposting");
        queue_repost(ctx, &row.key)?;
    } else {
        info!(row_id, key = row.key.as_str(), "vote rejected");
    }
    Ok(())
}

/// Queue the repost task: download the media, upload it to the wall, and
/// drop the temporary file.
fn queue_repost(ctx: &BotContext, key: &str) -> Result<(), RatelError> {
    let media = Arc::clone(&ctx.media);
    let platform = Arc::clone(&ctx.platform);
    let reference = key.to_string();
    let task = BotTask::new(
        "repost_video",
        json!({ "key": key }),
        Arc::new(move || {
            let media = Arc::clone(&media);
            let platform = Arc::clone(&platform);
            let reference = reference.clone();
            Box::pin(async move {
                let path = media.download_video(&reference).await?;
                let result = platform.upload_video_wall_and_post(&path).await;
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    warn!(path = %path.display(), error = %e, "temp file not removed");
                }
                result
            })
        }),
    );
    ctx.queue.submit(task)
}

use anyhow::Result;
use serenity::{
    builder::{
        CreateInteractionResponse, CreateInteractionResponseMessage, EditInteractionResponse,
    },
    model::{
        application::CommandInteraction,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::info;

use crate::{audio::PlayOutcome, bot::CadenceBot, error::PlaybackError};

/// Maneja comandos slash
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &CadenceBot,
) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    match command.data.name.as_str() {
        "play" => handle_play(ctx, command, bot, guild_id).await?,
        "skip" => handle_skip(ctx, command, bot, guild_id).await?,
        "pause" => handle_pause(ctx, command, bot, guild_id).await?,
        "resume" => handle_resume(ctx, command, bot, guild_id).await?,
        "stop" => handle_stop(ctx, command, bot, guild_id).await?,
        "disconnect" => handle_disconnect(ctx, command, bot, guild_id).await?,
        "queue" => handle_queue(ctx, command, bot, guild_id).await?,
        "ping" => respond(ctx, &command, "Pong!").await?,
        _ => respond(ctx, &command, "Unknown command.").await?,
    }

    Ok(())
}

// Handlers específicos para cada comando

async fn handle_play(
    ctx: &Context,
    command: CommandInteraction,
    bot: &CadenceBot,
    guild_id: GuildId,
) -> Result<()> {
    let query = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "query")
        .and_then(|opt| opt.value.as_str())
        .ok_or_else(|| anyhow::anyhow!("Query no proporcionado"))?
        .to_string();

    // Defer: la resolución puede tardar
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let text = match play_flow(ctx, bot, guild_id, command.user.id, &query).await {
        Ok(outcome) => match outcome {
            PlayOutcome::Started { title } => format!("Now playing: **{title}**"),
            PlayOutcome::Queued { title, .. } => format!("Added to queue: **{title}**"),
            PlayOutcome::QueueFull { max } => {
                format!("The queue is full (max {max} tracks).")
            }
            PlayOutcome::Discarded => "Playback was stopped before this track resolved.".into(),
        },
        Err(e) => e.user_message(),
    };

    command
        .edit_response(&ctx.http, EditInteractionResponse::new().content(text))
        .await?;

    Ok(())
}

/// Precondición de voz + conexión + enqueue, con errores reportables.
async fn play_flow(
    ctx: &Context,
    bot: &CadenceBot,
    guild_id: GuildId,
    user_id: UserId,
    query: &str,
) -> Result<PlayOutcome, PlaybackError> {
    let voice_channel_id = get_user_voice_channel(ctx, guild_id, user_id)?;

    // Conectar al canal de voz si aún no hay sesión
    if !bot.is_connected(guild_id) {
        bot.join_voice_channel(guild_id, voice_channel_id).await?;
    }

    bot.sequencer.play(guild_id, query, user_id).await
}

async fn handle_skip(
    ctx: &Context,
    command: CommandInteraction,
    bot: &CadenceBot,
    guild_id: GuildId,
) -> Result<()> {
    let text = if bot.sequencer.skip(guild_id).await {
        "Skipped the current song.".to_string()
    } else {
        PlaybackError::EmptyQueue.user_message()
    };
    respond(ctx, &command, &text).await
}

async fn handle_pause(
    ctx: &Context,
    command: CommandInteraction,
    bot: &CadenceBot,
    guild_id: GuildId,
) -> Result<()> {
    let text = if bot.sequencer.pause(guild_id).await {
        "Paused the audio.".to_string()
    } else {
        PlaybackError::EmptyQueue.user_message()
    };
    respond(ctx, &command, &text).await
}

async fn handle_resume(
    ctx: &Context,
    command: CommandInteraction,
    bot: &CadenceBot,
    guild_id: GuildId,
) -> Result<()> {
    let text = if bot.sequencer.resume(guild_id).await {
        "Resumed the audio."
    } else {
        "No audio is currently paused."
    };
    respond(ctx, &command, text).await
}

async fn handle_stop(
    ctx: &Context,
    command: CommandInteraction,
    bot: &CadenceBot,
    guild_id: GuildId,
) -> Result<()> {
    if !bot.is_connected(guild_id) {
        return respond(ctx, &command, &PlaybackError::NotConnected.user_message()).await;
    }

    bot.sequencer.stop(guild_id).await;
    respond(
        ctx,
        &command,
        "Stopped the audio and disconnected from the voice channel.",
    )
    .await
}

async fn handle_disconnect(
    ctx: &Context,
    command: CommandInteraction,
    bot: &CadenceBot,
    guild_id: GuildId,
) -> Result<()> {
    if !bot.is_connected(guild_id) {
        return respond(ctx, &command, &PlaybackError::NotConnected.user_message()).await;
    }

    // Detener también limpia la cola y libera la sesión de voz
    bot.sequencer.stop(guild_id).await;
    respond(ctx, &command, "Disconnected from the voice channel.").await
}

async fn handle_queue(
    ctx: &Context,
    command: CommandInteraction,
    bot: &CadenceBot,
    guild_id: GuildId,
) -> Result<()> {
    let now_playing = bot.sequencer.now_playing(guild_id).await;
    let pending = bot.sequencer.queue_snapshot(guild_id);

    if now_playing.is_none() && pending.is_empty() {
        return respond(ctx, &command, "The queue is empty.").await;
    }

    let mut text = String::new();
    if let Some(track) = now_playing {
        text.push_str(&format!(
            "Now playing: **{}** (requested by <@{}>)\n",
            track.title, track.requested_by
        ));
        if let Some(source_url) = &track.source_url {
            text.push_str(&format!("<{source_url}>\n"));
        }
    }
    if !pending.is_empty() {
        text.push_str("Up next:\n");
        for (i, track) in pending.iter().take(10).enumerate() {
            text.push_str(&format!("{}. {}\n", i + 1, track.title));
        }
        if pending.len() > 10 {
            text.push_str(&format!("…and {} more.\n", pending.len() - 10));
        }
    }

    respond(ctx, &command, text.trim_end()).await
}

/// Respuesta de texto plano a una interacción.
async fn respond(ctx: &Context, command: &CommandInteraction, text: &str) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new().content(text),
            ),
        )
        .await?;

    Ok(())
}

/// Canal de voz del usuario que invocó el comando.
fn get_user_voice_channel(
    ctx: &Context,
    guild_id: GuildId,
    user_id: UserId,
) -> Result<ChannelId, PlaybackError> {
    let guild = guild_id
        .to_guild_cached(&ctx.cache)
        .ok_or(PlaybackError::NotInVoiceChannel)?;

    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
        .ok_or(PlaybackError::NotInVoiceChannel)
}

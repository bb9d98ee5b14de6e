use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, id::GuildId},
    prelude::Context,
};

/// Registra comandos globales
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    for command in all_commands() {
        ctx.http.create_global_command(&command).await?;
    }

    Ok(())
}

/// Registra comandos para una guild específica (desarrollo)
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands()).await?;

    Ok(())
}

fn all_commands() -> Vec<CreateCommand> {
    vec![
        play_command(),
        skip_command(),
        pause_command(),
        resume_command(),
        stop_command(),
        disconnect_command(),
        queue_command(),
        ping_command(),
    ]
}

// Comandos de reproducción

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Play a song from YouTube")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "query", "The song to play")
                .required(true),
        )
}

fn skip_command() -> CreateCommand {
    CreateCommand::new("skip").description("Skip the current song")
}

fn pause_command() -> CreateCommand {
    CreateCommand::new("pause").description("Pause the current audio")
}

fn resume_command() -> CreateCommand {
    CreateCommand::new("resume").description("Resume the paused audio")
}

fn stop_command() -> CreateCommand {
    CreateCommand::new("stop")
        .description("Stop the audio and disconnect from the voice channel")
}

// Comandos de conexión y utilidades

fn disconnect_command() -> CreateCommand {
    CreateCommand::new("disconnect").description("Disconnect from the voice channel")
}

fn queue_command() -> CreateCommand {
    CreateCommand::new("queue").description("Show the playback queue")
}

fn ping_command() -> CreateCommand {
    CreateCommand::new("ping").description("Check if the bot is responsive")
}

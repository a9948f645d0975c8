use crate::Context;
use crate::discord::render_embed;
use poise::CreateReply;
use poise::command;
use poise::serenity_prelude as serenity;
use seedbot::binding;

pub(crate) type Error = Box<dyn std::error::Error + Send + Sync>;

/// Discord allows at most this many embeds per message
const EMBEDS_PER_MESSAGE: usize = 10;

/// Bind your account to a Steam ID, or unbind it when no ID is given
#[command(slash_command, prefix_command)]
pub async fn bind(
    ctx: Context<'_>,
    #[description = "Steam ID, [U:1:N] or profile URL"] steam_id: Option<String>,
) -> Result<(), Error> {
    let identity = ctx.author().tag();
    let reply = bind_reply(ctx, &identity, steam_id).await;
    ctx.say(reply).await?;
    Ok(())
}

/// Bind or unbind another user (admins only)
#[command(slash_command, prefix_command, required_permissions = "ADMINISTRATOR")]
pub async fn bindu(
    ctx: Context<'_>,
    #[description = "User to bind"] user: serenity::User,
    #[description = "Steam ID, [U:1:N] or profile URL"] steam_id: Option<String>,
) -> Result<(), Error> {
    let identity = user.tag();
    let reply = bind_reply(ctx, &identity, steam_id).await;
    ctx.say(reply).await?;
    Ok(())
}

async fn bind_reply(ctx: Context<'_>, identity: &str, steam_id: Option<String>) -> String {
    let registry = &ctx.data().registry;
    match steam_id {
        Some(raw) => match binding::bind(registry, &raw, identity).await {
            Ok(player_id) => format!("User {identity} has been bound to player ID {player_id}."),
            Err(e) => e.user_message(),
        },
        None => match binding::unbind(registry, identity).await {
            Ok(()) => format!("User {identity} has been unbound."),
            Err(e) => e.user_message(),
        },
    }
}

/// Find the player bound to a (partial) user name
#[command(slash_command, prefix_command)]
pub async fn whois(
    ctx: Context<'_>,
    #[description = "Beginning of the user name"] name: String,
) -> Result<(), Error> {
    let reply = match binding::resolve(&ctx.data().registry, &name).await {
        Ok(found) => format!(
            "{} is bound to player ID {}.",
            found.identity, found.player_id
        ),
        Err(e) => e.user_message(),
    };
    ctx.say(reply).await?;
    Ok(())
}

/// Show the status of every monitored server
#[command(slash_command, prefix_command)]
pub async fn status(ctx: Context<'_>) -> Result<(), Error> {
    let embeds = ctx.data().board.embeds();
    if embeds.is_empty() {
        ctx.say("No servers are being monitored.").await?;
        return Ok(());
    }
    for chunk in embeds.chunks(EMBEDS_PER_MESSAGE) {
        let reply = chunk
            .iter()
            .cloned()
            .fold(CreateReply::default(), |reply, embed| {
                reply.embed(render_embed(embed))
            });
        ctx.send(reply).await?;
    }
    Ok(())
}

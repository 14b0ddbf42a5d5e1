//! Default configuration template with all options documented.

/// Render the default config file.
pub fn default_config_template() -> String {
    r##"# discord-echo configuration
# ==========================
# Relays in-game channel chat to Discord webhooks and Discord channel
# messages back into the game. Changes require a restart.
#
# Environment variable substitution is supported: ${ENV_VAR} or
# ${ENV_VAR:-fallback}. DISCORD_ECHO_TOKEN overrides discord.token.

# ══════════════════════════════════════════════════════════════════════════════
# DISCORD
# ══════════════════════════════════════════════════════════════════════════════

[discord]
token = "${DISCORD_ECHO_TOKEN}"         # Bot token (needs the Message Content intent)
api_base = "https://discord.com/api"   # Used to build webhook URLs from id + token
gateway = true                         # false = webhook-only, no Discord -> game relay

# ══════════════════════════════════════════════════════════════════════════════
# CHANNEL ROUTES
# ══════════════════════════════════════════════════════════════════════════════
# One entry per in-game channel. Channels without an entry are not bridged.
# Give either webhook_url or webhook_id + webhook_token for the game -> Discord
# direction, and discord_channel_id for Discord -> game.
#
# [[channels]]
# ingame_channel = "main"
# webhook_id = "000000000000000000"
# webhook_token = "${MAIN_WEBHOOK_TOKEN}"
# discord_channel_id = "000000000000000000"
# avatar_url = "https://example.com/avatar.png"
#
# [[channels]]
# ingame_channel = "trade"
# webhook_url = "https://discord.com/api/webhooks/000000000000000000/token"
# discord_channel_id = "000000000000000000"
#
# [[channels]]
# ingame_channel = "support"
# discord_channel_id = "000000000000000000"

# ══════════════════════════════════════════════════════════════════════════════
# RELAY
# ══════════════════════════════════════════════════════════════════════════════

[relay]
request_timeout_secs = 10    # Webhook request timeout (DNS + TLS + response)
queue_capacity = 64          # Pending messages per channel before dropping
shutdown_timeout_secs = 5    # Max wait for the gateway to disconnect on stop
worker_threads = 2           # Dedicated runtime threads when embedded in the map server

[limits]
content_chars = 2000         # Discord message limit; longer bodies are truncated
display_name_bytes = 23      # In-game name limit for tagged Discord authors
inbound_body_bytes = 249     # In-game message limit for injected Discord messages

# ══════════════════════════════════════════════════════════════════════════════
# PACKET BRIDGE (standalone mode)
# ══════════════════════════════════════════════════════════════════════════════
# When running as a separate process, Discord messages are forwarded to the
# map server as 0x0F01 packets and in-game chat arrives on `listen`.

[bridge]
# map_server = "127.0.0.1:5121"
# listen = "127.0.0.1:5122"
"##
    .to_string()
}

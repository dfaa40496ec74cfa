use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::json;
use souk_core::{
    Conversation, Identity, InboxEntry, Message, MessageSortOrder, Pagination, SoukChat,
};

#[derive(Debug, Parser)]
#[command(name = "soukchat")]
#[command(about = "Marketplace conversations: send, read and inspect unread state")]
struct Cli {
    /// State directory (database and souk_config.json live here)
    #[arg(long, env = "SOUK_STATE_DIR", default_value = ".soukchat")]
    state_dir: PathBuf,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Send a message without opening the conversation
    Send {
        /// Sending identity
        #[arg(long = "as")]
        me: String,

        /// Receiving identity
        #[arg(long)]
        to: String,

        /// Message text
        #[arg(long)]
        text: String,
    },

    /// Open a conversation: create it if needed, print the log and mark it read
    Open {
        #[arg(long = "as")]
        me: String,

        /// Counterpart identity
        #[arg(long)]
        with: String,
    },

    /// List conversations, unread first then most recent
    Inbox {
        #[arg(long = "as")]
        me: String,
    },

    /// Whether any conversation has unread messages
    Unread {
        #[arg(long = "as")]
        me: String,
    },

    /// Page through a conversation's messages
    Messages {
        #[arg(long = "as")]
        me: String,

        #[arg(long)]
        with: String,

        /// Max messages to return
        #[arg(long, default_value_t = 50)]
        limit: usize,

        /// Newest first
        #[arg(long)]
        desc: bool,
    },

    /// Rebuild the last-message summary from the message log
    Repair {
        #[arg(long = "as")]
        me: String,

        #[arg(long)]
        with: String,
    },

    /// Print the inbox every time it changes (runs until interrupted or --timeout)
    Watch {
        #[arg(long = "as")]
        me: String,

        /// Timeout in seconds (0 = run forever)
        #[arg(long, default_value_t = 60)]
        timeout: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let chat = SoukChat::open(&cli.state_dir)
        .with_context(|| format!("open state dir {}", cli.state_dir.display()))?;

    match &cli.cmd {
        Command::Send { me, to, text } => cmd_send(&chat, me, to, text).await,
        Command::Open { me, with } => cmd_open(&chat, me, with).await,
        Command::Inbox { me } => cmd_inbox(&chat, me).await,
        Command::Unread { me } => cmd_unread(&chat, me).await,
        Command::Messages {
            me,
            with,
            limit,
            desc,
        } => cmd_messages(&chat, me, with, *limit, *desc).await,
        Command::Repair { me, with } => cmd_repair(&chat, me, with).await,
        Command::Watch { me, timeout } => cmd_watch(&chat, me, *timeout).await,
    }
}

// ── Helpers ─────────────────────────────────────────────────────────────────

fn identity(value: &str) -> anyhow::Result<Identity> {
    Identity::new(value.trim()).with_context(|| format!("invalid identity: {value:?}"))
}

fn print(v: serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(&v).context("json encode")?);
    Ok(())
}

fn message_json(m: &Message) -> serde_json::Value {
    json!({
        "id": m.id.as_str(),
        "seq": m.seq,
        "sender": m.sender.as_str(),
        "text": m.text,
        "sent_at": m.sent_at.as_millis(),
    })
}

fn inbox_json(entries: &[InboxEntry]) -> serde_json::Value {
    entries
        .iter()
        .map(|e| {
            json!({
                "conversation_id": e.conversation_id.as_str(),
                "counterpart": e.counterpart.as_str(),
                "last_message_text": e.last_message_text,
                "last_message_time": e.last_message_time.map(|t| t.as_millis()),
                "unread_count": e.unread_count,
            })
        })
        .collect()
}

fn conversation_json(c: &Conversation) -> serde_json::Value {
    let unread: serde_json::Map<String, serde_json::Value> = c
        .unread_counts
        .iter()
        .map(|(identity, count)| (identity.to_string(), json!(count)))
        .collect();
    json!({
        "conversation_id": c.id.as_str(),
        "participants": c.participants.iter().map(|p| p.as_str()).collect::<Vec<_>>(),
        "unread": unread,
        "last_message": c.last_message.as_ref().map(|m| json!({
            "id": m.message_id.as_str(),
            "text": m.text,
            "sender": m.sender.as_str(),
            "sent_at": m.sent_at.as_millis(),
        })),
        "revision": c.revision,
    })
}

// ── Commands ────────────────────────────────────────────────────────────────

async fn cmd_send(chat: &SoukChat, me: &str, to: &str, text: &str) -> anyhow::Result<()> {
    let message = chat
        .send_direct(&identity(me)?, &identity(to)?, text)
        .await
        .context("send message")?;
    print(json!({
        "conversation_id": message.conversation_id.as_str(),
        "message": message_json(&message),
    }))
}

async fn cmd_open(chat: &SoukChat, me: &str, with: &str) -> anyhow::Result<()> {
    let mut session = chat
        .open_conversation(&identity(me)?, &identity(with)?)
        .await
        .context("open conversation")?;
    // Awaited here so the reset lands before the process exits.
    session.mark_read().await.context("mark read")?;
    let conversation_id = session.conversation_id().clone();
    let messages = chat
        .message_log()
        .messages(&conversation_id)
        .await
        .context("load messages")?;
    session.close();

    print(json!({
        "conversation_id": conversation_id.as_str(),
        "messages": messages.iter().map(message_json).collect::<Vec<_>>(),
    }))
}

async fn cmd_inbox(chat: &SoukChat, me: &str) -> anyhow::Result<()> {
    let entries = chat.inbox(&identity(me)?).await.context("load inbox")?;
    print(inbox_json(&entries))
}

async fn cmd_unread(chat: &SoukChat, me: &str) -> anyhow::Result<()> {
    let has_unread = chat
        .has_any_unread(&identity(me)?)
        .await
        .context("load unread state")?;
    print(json!({ "has_unread": has_unread }))
}

async fn cmd_messages(
    chat: &SoukChat,
    me: &str,
    with: &str,
    limit: usize,
    desc: bool,
) -> anyhow::Result<()> {
    let order = if desc {
        MessageSortOrder::Descending
    } else {
        MessageSortOrder::Ascending
    };
    let messages = chat
        .messages(
            &identity(me)?,
            &identity(with)?,
            Pagination::with_sort_order(Some(limit), None, order),
        )
        .await
        .context("load messages")?;
    print(json!(messages.iter().map(message_json).collect::<Vec<_>>()))
}

async fn cmd_repair(chat: &SoukChat, me: &str, with: &str) -> anyhow::Result<()> {
    let me = identity(me)?;
    let conversation_id = chat.resolve(&me, &identity(with)?)?;
    let conversation = chat
        .repair_last_message(&conversation_id)
        .await
        .context("repair last message")?;
    print(conversation_json(&conversation))
}

async fn cmd_watch(chat: &SoukChat, me: &str, timeout: u64) -> anyhow::Result<()> {
    let mut inbox = chat.subscribe_inbox_list(identity(me)?);
    let deadline =
        (timeout > 0).then(|| tokio::time::Instant::now() + Duration::from_secs(timeout));

    loop {
        let next = match deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, inbox.next()).await {
                Ok(next) => next,
                Err(_) => break,
            },
            None => inbox.next().await,
        };
        let Some(entries) = next else {
            break;
        };
        let line = serde_json::to_string(&inbox_json(&entries)).context("json encode")?;
        println!("{line}");
    }
    inbox.cancel();
    Ok(())
}

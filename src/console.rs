//! Terminal presentation: command parsing and event rendering.

use std::collections::HashMap;
use std::fmt::Write as _;

use chrono::{DateTime, Utc};

use crate::events::{ReplaceOrigin, SendPhase, SessionEvent};
use crate::models::{ConversationId, LogMessage, MessageId, MessageRole, MessageStatus, Reference};
use crate::state::ConversationGroups;

pub const HELP: &str = "\
Commands:
  <text>                 ask a question in the open conversation
  /new                   start a new conversation
  /list                  reload the conversation list
  /open <id>             open a conversation
  /close                 leave the open conversation
  /rename <id> <title>   rename a conversation
  /save <id>             toggle the saved flag
  /delete <id>           delete a conversation
  /docs                  list reference documents
  /doc <id> on|off       include or exclude a document
  /refs                  show the latest references
  /ref <n>               show reference <n> in full
  /login <password>      sign in to the admin backend
  /hide | /show          stop or resume background refresh
  /help                  this text
  /quit                  exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Send(String),
    New,
    List,
    Open(ConversationId),
    Close,
    Rename(ConversationId, String),
    Save(ConversationId),
    Delete(ConversationId),
    Docs,
    Doc(i64, bool),
    Refs,
    Ref(usize),
    Login(String),
    Hide,
    Show,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("unknown command: /{0} (try /help)")]
    Unknown(String),

    #[error("usage: {0}")]
    Usage(&'static str),
}

impl Command {
    /// Parses one input line. Blank lines yield `None`.
    pub fn parse(line: &str) -> Result<Option<Command>, CommandError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Ok(Some(Command::Send(line.to_string())));
        };

        let (name, args) = match rest.split_once(char::is_whitespace) {
            Some((name, args)) => (name, args.trim()),
            None => (rest, ""),
        };

        let command = match name {
            "new" => Command::New,
            "list" => Command::List,
            "open" => Command::Open(parse_arg(args, "/open <id>")?),
            "close" => Command::Close,
            "rename" => {
                let usage = "/rename <id> <title>";
                let (id, title) =
                    args.split_once(char::is_whitespace).ok_or(CommandError::Usage(usage))?;
                Command::Rename(parse_arg(id, usage)?, title.trim().to_string())
            }
            "save" => Command::Save(parse_arg(args, "/save <id>")?),
            "delete" => Command::Delete(parse_arg(args, "/delete <id>")?),
            "docs" => Command::Docs,
            "doc" => {
                let usage = "/doc <id> on|off";
                let (id, flag) =
                    args.split_once(char::is_whitespace).ok_or(CommandError::Usage(usage))?;
                let selected = match flag.trim() {
                    "on" => true,
                    "off" => false,
                    _ => return Err(CommandError::Usage(usage)),
                };
                Command::Doc(parse_arg(id, usage)?, selected)
            }
            "refs" => Command::Refs,
            "ref" => Command::Ref(parse_arg(args, "/ref <n>")?),
            "login" if !args.is_empty() => Command::Login(args.to_string()),
            "login" => return Err(CommandError::Usage("/login <password>")),
            "hide" => Command::Hide,
            "show" => Command::Show,
            "help" => Command::Help,
            "quit" | "exit" => Command::Quit,
            other => return Err(CommandError::Unknown(other.to_string())),
        };
        Ok(Some(command))
    }
}

fn parse_arg<T: std::str::FromStr>(raw: &str, usage: &'static str) -> Result<T, CommandError> {
    raw.trim().parse().map_err(|_| CommandError::Usage(usage))
}

/// Turns session events into terminal text.
///
/// Streaming answers are written inline: only the part of the content not
/// printed yet is emitted for each update.
#[derive(Debug, Default)]
pub struct Renderer {
    printed: HashMap<MessageId, usize>,
}

impl Renderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text to write for `event`, if any. Complete lines end in `\n`;
    /// streaming fragments do not.
    pub fn render(&mut self, event: &SessionEvent) -> Option<String> {
        match event {
            SessionEvent::ConversationsUpdated(items) if items.is_empty() => {
                Some("(no conversations)\n".into())
            }
            SessionEvent::ConversationsUpdated(_) => None,
            SessionEvent::ActiveConversationChanged(Some(id)) => {
                Some(format!("── conversation {id} ──\n"))
            }
            SessionEvent::ActiveConversationChanged(None) => {
                Some("── no conversation open ──\n".into())
            }
            SessionEvent::MessageAppended(message) => self.appended(message),
            SessionEvent::MessageUpdated { id, content } => self.stream_delta(*id, content),
            SessionEvent::MessageFinalized(message) => self.finalized(message),
            SessionEvent::LogReplaced { origin, messages, hidden, .. } => {
                self.printed.clear();
                Some(render_log(*origin, messages, *hidden))
            }
            SessionEvent::ReferencesShown(references) => Some(render_references(references)),
            SessionEvent::DocumentsUpdated(documents) => {
                let mut out = String::new();
                for d in documents {
                    let _ = writeln!(out, "  [{}] {}", d.id, d.filename);
                }
                if out.is_empty() {
                    out.push_str("(no reference documents)\n");
                }
                Some(out)
            }
            SessionEvent::SendPhaseChanged(SendPhase::AwaitingConversation) => {
                Some("(creating conversation…)\n".into())
            }
            SessionEvent::SendPhaseChanged(_) => None,
            SessionEvent::Notice(text) => Some(format!("! {text}\n")),
            SessionEvent::SessionExpired => {
                Some("! Session expired. Sign in again with /login.\n".into())
            }
        }
    }

    fn appended(&mut self, message: &LogMessage) -> Option<String> {
        match (message.role, message.status) {
            (MessageRole::Assistant, MessageStatus::Pending) => {
                self.printed.insert(message.id, 0);
                Some("assistant> ".into())
            }
            _ => Some(format_message(message)),
        }
    }

    fn stream_delta(&mut self, id: MessageId, content: &str) -> Option<String> {
        let printed = self.printed.entry(id).or_insert(0);
        let delta = content.get(*printed..).unwrap_or_default();
        *printed = content.len();
        (!delta.is_empty()).then(|| delta.to_string())
    }

    fn finalized(&mut self, message: &LogMessage) -> Option<String> {
        let Some(printed) = self.printed.remove(&message.id) else {
            return Some(format_message(message));
        };
        if message.status == MessageStatus::Failed {
            return Some(format!("\n! {}\n", message.content));
        }
        let rest = message.content.get(printed..).unwrap_or_default();
        Some(format!("{rest}\n"))
    }
}

fn format_message(message: &LogMessage) -> String {
    match message.status {
        MessageStatus::Failed => format!("! {}\n", message.content),
        _ => format!("{}> {}\n", message.role, message.content),
    }
}

fn render_log(origin: ReplaceOrigin, messages: &[LogMessage], hidden: usize) -> String {
    let mut out = String::new();
    if origin == ReplaceOrigin::Poll {
        out.push_str("(new messages)\n");
    }
    if hidden > 0 {
        let _ = writeln!(out, "({hidden} earlier messages not shown)");
    }
    for message in messages {
        out.push_str(&format_message(message));
    }
    out
}

pub fn render_references(references: &[Reference]) -> String {
    if references.is_empty() {
        return "(no references)\n".into();
    }
    let mut out = String::from("References:\n");
    for (index, r) in references.iter().enumerate() {
        let _ = writeln!(out, "  {index}. {} ({}%)", r.filename, r.similarity_percent());
    }
    out
}

pub fn render_reference(index: usize, reference: &Reference) -> String {
    format!(
        "[{index}] {} ({}%)\n{}\n",
        reference.filename,
        reference.similarity_percent(),
        reference.chunk_text
    )
}

/// Sidebar view: saved, today, then older conversations with days left.
pub fn render_groups(groups: &ConversationGroups, now: DateTime<Utc>) -> String {
    let mut out = String::new();
    let sections = [("Saved", &groups.saved), ("Today", &groups.today), ("Recent", &groups.recent)];
    for (label, items) in sections {
        if items.is_empty() {
            continue;
        }
        let _ = writeln!(out, "{label}:");
        for c in items.iter() {
            if c.saved {
                let _ = writeln!(out, "  {:>5}  {}", c.id, c.title);
            } else {
                let _ = writeln!(out, "  {:>5}  {} ({}d left)", c.id, c.title, c.days_left(now));
            }
        }
    }
    if out.is_empty() {
        out.push_str("(no conversations)\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_a_send() {
        assert_eq!(
            Command::parse("  what is RAG? ").unwrap(),
            Some(Command::Send("what is RAG?".into()))
        );
        assert_eq!(Command::parse("   ").unwrap(), None);
    }

    #[test]
    fn commands_with_arguments() {
        assert_eq!(Command::parse("/open 42").unwrap(), Some(Command::Open(42)));
        assert_eq!(
            Command::parse("/rename 3  Quarterly report ").unwrap(),
            Some(Command::Rename(3, "Quarterly report".into()))
        );
        assert_eq!(Command::parse("/doc 9 off").unwrap(), Some(Command::Doc(9, false)));
        assert_eq!(Command::parse("/ref 0").unwrap(), Some(Command::Ref(0)));
    }

    #[test]
    fn bad_commands_report_usage() {
        assert_eq!(Command::parse("/open x"), Err(CommandError::Usage("/open <id>")));
        assert_eq!(Command::parse("/doc 9 maybe"), Err(CommandError::Usage("/doc <id> on|off")));
        assert_eq!(Command::parse("/login"), Err(CommandError::Usage("/login <password>")));
        assert_eq!(Command::parse("/frobnicate"), Err(CommandError::Unknown("frobnicate".into())));
    }

    #[test]
    fn streaming_answer_is_written_inline() {
        let mut renderer = Renderer::new();
        let id = MessageId::local();
        let placeholder = LogMessage {
            id,
            role: MessageRole::Assistant,
            content: String::new(),
            references: vec![],
            created_at: None,
            status: MessageStatus::Pending,
        };
        let appended = SessionEvent::MessageAppended(placeholder.clone());
        assert_eq!(renderer.render(&appended).unwrap(), "assistant> ");
        let update = |content: &str| SessionEvent::MessageUpdated { id, content: content.into() };
        assert_eq!(renderer.render(&update("Hi")).unwrap(), "Hi");
        assert_eq!(renderer.render(&update("Hi there")).unwrap(), " there");

        let done =
            LogMessage { content: "Hi there".into(), status: MessageStatus::Final, ..placeholder };
        assert_eq!(renderer.render(&SessionEvent::MessageFinalized(done)).unwrap(), "\n");
    }

    #[test]
    fn references_are_numbered_from_zero() {
        let refs = vec![Reference {
            filename: "manual.pdf".into(),
            similarity: 0.874,
            chunk_text: "..".into(),
        }];
        assert_eq!(render_references(&refs), "References:\n  0. manual.pdf (87%)\n");
        assert_eq!(render_references(&[]), "(no references)\n");
    }
}

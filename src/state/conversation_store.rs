use chrono::{DateTime, Local, LocalResult, NaiveTime, TimeZone, Utc};

use crate::models::{Conversation, ConversationId};

/// Local copy of the conversation list. Only ever replaced wholesale from a
/// backend listing; mutations go through the backend first.
#[derive(Debug, Clone, Default)]
pub struct ConversationStore {
    items: Vec<Conversation>,
}

/// Sidebar partition of the conversation list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationGroups {
    pub saved: Vec<Conversation>,
    pub today: Vec<Conversation>,
    pub recent: Vec<Conversation>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&mut self, items: Vec<Conversation>) {
        self.items = items;
    }

    pub fn items(&self) -> &[Conversation] {
        &self.items
    }

    pub fn get(&self, id: ConversationId) -> Option<&Conversation> {
        self.items.iter().find(|c| c.id == id)
    }

    /// Splits into saved / updated since local midnight / older, keeping
    /// server order inside each group.
    pub fn groups(&self, now: DateTime<Local>) -> ConversationGroups {
        let today_start = local_midnight(now);
        let mut groups = ConversationGroups::default();
        for conv in &self.items {
            if conv.saved {
                groups.saved.push(conv.clone());
            } else if conv.updated_at.map_or(true, |updated| updated >= today_start) {
                groups.today.push(conv.clone());
            } else {
                groups.recent.push(conv.clone());
            }
        }
        groups
    }
}

fn local_midnight(now: DateTime<Local>) -> DateTime<Utc> {
    let midnight = now.date_naive().and_time(NaiveTime::MIN);
    match Local.from_local_datetime(&midnight) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        // midnight skipped by a DST jump; the day starts at the jump
        LocalResult::None => now.with_timezone(&Utc) - (now.naive_local() - midnight),
    }
}

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Speaker of a single conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::System, Role::User, Role::Assistant];

    /// Wire name, as it appears in JSONL records.
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    /// Speaker label used when rendering a plain-text transcript.
    pub fn label(self) -> &'static str {
        match self {
            Role::System => "System",
            Role::User => "Human",
            Role::Assistant => "Assistant",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        Role::ALL.into_iter().find(|role| role.as_str() == s)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One turn in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// A conversation record, one per JSONL line.
/// Only constructed through `schema::parse_record`, so the
/// structural invariants always hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
}

impl Conversation {
    /// Category tag for frequency tables; `category` wins over `topic`.
    pub fn tag(&self) -> Option<&str> {
        self.category.as_deref().or(self.topic.as_deref())
    }
}

/// A flattened (context, target) pair derived from one assistant turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainingExample {
    /// Prompt text the target answers.
    pub context: String,
    /// Role-tagged turns `context` was rendered from.
    pub history: Vec<Message>,
    /// Assistant reply being predicted.
    pub target: String,
    pub conversation_id: usize,
    pub turn_number: usize,
}

/// Alpaca-format training record (instruction/input/output triple)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlpacaRecord {
    pub instruction: String,
    pub input: String,
    pub output: String,
}

/// ChatML-format training record (role-tagged message list)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMlRecord {
    pub messages: Vec<Message>,
}

/// Prompt/completion training record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimpleRecord {
    pub prompt: String,
    pub completion: String,
}

/// Running min/max/total over a series of lengths.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LengthStats {
    pub count: usize,
    pub total: usize,
    pub min: usize,
    pub max: usize,
}

impl LengthStats {
    pub fn record(&mut self, len: usize) {
        if self.count == 0 || len < self.min {
            self.min = len;
        }
        if len > self.max {
            self.max = len;
        }
        self.count += 1;
        self.total += len;
    }

    pub fn merge(&mut self, other: &LengthStats) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 || other.min < self.min {
            self.min = other.min;
        }
        self.max = self.max.max(other.max);
        self.count += other.count;
        self.total += other.total;
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total as f64 / self.count as f64
        }
    }
}

/// Statistics for a dataset
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DatasetStats {
    pub conversations: usize,
    pub messages: usize,
    /// Non-blank lines left out of the statistics because they failed validation.
    pub skipped: usize,
    pub role_counts: BTreeMap<Role, usize>,
    /// Message content length in characters.
    pub content_lengths: LengthStats,
    /// Messages per conversation.
    pub conversation_lengths: LengthStats,
    pub categories: BTreeMap<String, usize>,
}

impl DatasetStats {
    pub fn record(&mut self, conversation: &Conversation) {
        self.conversations += 1;
        self.messages += conversation.messages.len();
        self.conversation_lengths.record(conversation.messages.len());

        for message in &conversation.messages {
            *self.role_counts.entry(message.role).or_insert(0) += 1;
            self.content_lengths.record(message.content.chars().count());
        }

        if let Some(tag) = conversation.tag() {
            *self.categories.entry(tag.to_string()).or_insert(0) += 1;
        }
    }

    pub fn merge(&mut self, other: &DatasetStats) {
        self.conversations += other.conversations;
        self.messages += other.messages;
        self.skipped += other.skipped;
        for (role, count) in &other.role_counts {
            *self.role_counts.entry(*role).or_insert(0) += count;
        }
        self.content_lengths.merge(&other.content_lengths);
        self.conversation_lengths.merge(&other.conversation_lengths);
        for (category, count) in &other.categories {
            *self.categories.entry(category.clone()).or_insert(0) += count;
        }
    }

    pub fn role_count(&self, role: Role) -> usize {
        self.role_counts.get(&role).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conversation(lengths: &[(Role, &str)], category: Option<&str>) -> Conversation {
        Conversation {
            messages: lengths
                .iter()
                .map(|(role, content)| Message::new(*role, *content))
                .collect(),
            category: category.map(String::from),
            topic: None,
        }
    }

    #[test]
    fn test_role_parse() {
        assert_eq!(Role::parse("assistant"), Some(Role::Assistant));
        assert_eq!(Role::parse("system"), Some(Role::System));
        assert_eq!(Role::parse("human"), None);
        assert_eq!(Role::parse("User"), None);
    }

    #[test]
    fn test_tag_prefers_category() {
        let mut convo = conversation(&[(Role::User, "a")], Some("science"));
        convo.topic = Some("physics".into());
        assert_eq!(convo.tag(), Some("science"));

        convo.category = None;
        assert_eq!(convo.tag(), Some("physics"));
    }

    #[test]
    fn test_length_stats() {
        let mut stats = LengthStats::default();
        assert_eq!(stats.mean(), 0.0);

        stats.record(5);
        stats.record(20);
        stats.record(2);
        assert_eq!(stats.min, 2);
        assert_eq!(stats.max, 20);
        assert_eq!(stats.count, 3);
        assert!((stats.mean() - 9.0).abs() < 1e-9);

        let mut empty = LengthStats::default();
        empty.merge(&stats);
        assert_eq!(empty, stats);
    }

    #[test]
    fn test_dataset_stats_record_and_merge() {
        let mut a = DatasetStats::default();
        a.record(&conversation(
            &[(Role::User, "Hi"), (Role::Assistant, "Hello!")],
            Some("greeting"),
        ));

        let mut b = DatasetStats::default();
        b.record(&conversation(
            &[
                (Role::System, "Be brief."),
                (Role::User, "Héllo"),
                (Role::Assistant, "Hey"),
            ],
            Some("greeting"),
        ));
        b.skipped = 1;

        a.merge(&b);
        assert_eq!(a.conversations, 2);
        assert_eq!(a.messages, 5);
        assert_eq!(a.skipped, 1);
        assert_eq!(a.role_count(Role::User), 2);
        assert_eq!(a.role_count(Role::System), 1);
        assert_eq!(a.content_lengths.min, 2);
        assert_eq!(a.content_lengths.max, 9);
        // Lengths are characters, not bytes.
        assert_eq!(a.content_lengths.total, 2 + 6 + 9 + 5 + 3);
        assert_eq!(a.conversation_lengths.min, 2);
        assert_eq!(a.conversation_lengths.max, 3);
        assert_eq!(a.categories.get("greeting"), Some(&2));
    }
}

//! Type-safe options for the mu server.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Server verbs with escape hatch for commands this crate does not name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verb {
    /// Add a message file to the store.
    Add,
    /// List known contacts.
    Contacts,
    /// Extract or open an attachment.
    Extract,
    /// Run a query.
    Find,
    /// (Re)index the maildir.
    Index,
    /// Move a message or change its flags.
    Move,
    /// Check that the server is alive.
    Ping,
    /// Create a maildir.
    Mkdir,
    /// Remove a message.
    Remove,
    /// View a single message.
    View,
    /// Ask the server to exit.
    Quit,
    /// Any other verb, passed through verbatim.
    #[serde(untagged)]
    Custom(String),
}

impl Verb {
    /// The wire name of this verb.
    pub fn as_str(&self) -> &str {
        match self {
            Verb::Add => "add",
            Verb::Contacts => "contacts",
            Verb::Extract => "extract",
            Verb::Find => "find",
            Verb::Index => "index",
            Verb::Move => "move",
            Verb::Ping => "ping",
            Verb::Mkdir => "mkdir",
            Verb::Remove => "remove",
            Verb::View => "view",
            Verb::Quit => "quit",
            Verb::Custom(s) => s,
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Verb {
    fn from(s: &str) -> Self {
        match s {
            "add" => Verb::Add,
            "contacts" => Verb::Contacts,
            "extract" => Verb::Extract,
            "find" => Verb::Find,
            "index" => Verb::Index,
            "move" => Verb::Move,
            "ping" => Verb::Ping,
            "mkdir" => Verb::Mkdir,
            "remove" => Verb::Remove,
            "view" => Verb::View,
            "quit" => Verb::Quit,
            _ => Verb::Custom(s.to_string()),
        }
    }
}

impl From<String> for Verb {
    fn from(s: String) -> Self {
        Verb::from(s.as_str())
    }
}

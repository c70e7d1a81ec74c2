//! Commands carried by journal records

use serde::{Deserialize, Serialize};

/// Identifier of a tree in the forest
pub type TreeId = u16;

/// A single change to one tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mutation {
    Upsert {
        tree: TreeId,
        key: Vec<u8>,
        value: Vec<u8>,
    },
    Remove {
        tree: TreeId,
        key: Vec<u8>,
    },
}

impl Mutation {
    pub fn tree(&self) -> TreeId {
        match self {
            Mutation::Upsert { tree, .. } | Mutation::Remove { tree, .. } => *tree,
        }
    }

    pub fn key(&self) -> &[u8] {
        match self {
            Mutation::Upsert { key, .. } | Mutation::Remove { key, .. } => key,
        }
    }
}

/// A committed operation, as handed over by the replication layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Advances the op number without touching any tree
    Noop,
    Upsert {
        tree: TreeId,
        key: Vec<u8>,
        value: Vec<u8>,
    },
    Remove {
        tree: TreeId,
        key: Vec<u8>,
    },
    /// Several mutations applied atomically at one op
    Batch(Vec<Mutation>),
}

/// Command discriminant stored in the record header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandTag {
    Noop = 0,
    Upsert = 1,
    Remove = 2,
    Batch = 3,
}

impl CommandTag {
    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(CommandTag::Noop),
            1 => Some(CommandTag::Upsert),
            2 => Some(CommandTag::Remove),
            3 => Some(CommandTag::Batch),
            _ => None,
        }
    }
}

impl Command {
    pub fn tag(&self) -> CommandTag {
        match self {
            Command::Noop => CommandTag::Noop,
            Command::Upsert { .. } => CommandTag::Upsert,
            Command::Remove { .. } => CommandTag::Remove,
            Command::Batch(_) => CommandTag::Batch,
        }
    }

    /// The tree mutations this command performs, in order
    pub fn mutations(&self) -> Vec<Mutation> {
        match self {
            Command::Noop => Vec::new(),
            Command::Upsert { tree, key, value } => vec![Mutation::Upsert {
                tree: *tree,
                key: key.clone(),
                value: value.clone(),
            }],
            Command::Remove { tree, key } => vec![Mutation::Remove {
                tree: *tree,
                key: key.clone(),
            }],
            Command::Batch(mutations) => mutations.clone(),
        }
    }

    /// Serialize the body of a journal record
    pub fn encode(&self) -> crate::Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(bytes: &[u8]) -> crate::Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

//! Atomic write batches.
//!
//! Every mutation the cache engine performs ships as one `WriteBatch`,
//! so item data and tag memberships always land together. Stores apply
//! the ops in order inside a single atomic section.

/// One mutation inside a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    /// Set one field of a record, creating the record if absent.
    PutField {
        key: String,
        field: String,
        value: Vec<u8>,
    },
    /// Expire a key `ttl_secs` from now. A non-positive TTL deletes the
    /// key immediately.
    ExpireIn { key: String, ttl_secs: i64 },
    /// Expire a key at an absolute Unix timestamp. A timestamp at or
    /// before now deletes the key immediately.
    ExpireAt { key: String, epoch_secs: i64 },
    /// Add members to a set, creating the set if absent.
    AddMembers { key: String, members: Vec<String> },
    /// Remove members from a set. Removing the last member removes the
    /// set key itself.
    RemoveMembers { key: String, members: Vec<String> },
    /// Delete a key of any shape.
    Delete { key: String },
}

impl WriteOp {
    /// The key this op mutates.
    pub fn key(&self) -> &str {
        match self {
            WriteOp::PutField { key, .. }
            | WriteOp::ExpireIn { key, .. }
            | WriteOp::ExpireAt { key, .. }
            | WriteOp::AddMembers { key, .. }
            | WriteOp::RemoveMembers { key, .. }
            | WriteOp::Delete { key } => key,
        }
    }
}

/// An ordered list of mutations applied atomically by a store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// The ops in application order.
    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    /// Consumes the batch, yielding the ops in application order.
    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }

    pub fn push(&mut self, op: WriteOp) -> &mut Self {
        self.ops.push(op);
        self
    }

    pub fn put_field(
        &mut self,
        key: impl Into<String>,
        field: impl Into<String>,
        value: Vec<u8>,
    ) -> &mut Self {
        self.push(WriteOp::PutField {
            key: key.into(),
            field: field.into(),
            value,
        })
    }

    pub fn expire_in(&mut self, key: impl Into<String>, ttl_secs: i64) -> &mut Self {
        self.push(WriteOp::ExpireIn {
            key: key.into(),
            ttl_secs,
        })
    }

    pub fn expire_at(&mut self, key: impl Into<String>, epoch_secs: i64) -> &mut Self {
        self.push(WriteOp::ExpireAt {
            key: key.into(),
            epoch_secs,
        })
    }

    pub fn add_members(&mut self, key: impl Into<String>, members: Vec<String>) -> &mut Self {
        self.push(WriteOp::AddMembers {
            key: key.into(),
            members,
        })
    }

    pub fn remove_members(&mut self, key: impl Into<String>, members: Vec<String>) -> &mut Self {
        self.push(WriteOp::RemoveMembers {
            key: key.into(),
            members,
        })
    }

    pub fn delete(&mut self, key: impl Into<String>) -> &mut Self {
        self.push(WriteOp::Delete { key: key.into() })
    }
}

use crate::domain::ThreadId;

/// A forum topic created inside a supergroup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForumTopic {
    pub thread_id: ThreadId,
    pub name: String,
}

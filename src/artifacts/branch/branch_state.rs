use crate::artifacts::objects::object_id::ObjectId;

/// What the remote knows about a branch right now
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchState {
    pub exists: bool,
    pub head_commit: Option<ObjectId>,
    pub head_tree: Option<ObjectId>,
}

impl BranchState {
    pub fn at(head_commit: ObjectId, head_tree: ObjectId) -> Self {
        Self {
            exists: true,
            head_commit: Some(head_commit),
            head_tree: Some(head_tree),
        }
    }

    /// Branch absent and no history to start from
    pub fn absent() -> Self {
        Self {
            exists: false,
            head_commit: None,
            head_tree: None,
        }
    }
}

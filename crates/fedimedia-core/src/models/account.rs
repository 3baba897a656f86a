use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The slice of an account the prune engine needs: which attachments it
/// currently uses as avatar and header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    /// `None` for local accounts.
    pub domain: Option<String>,
    pub avatar_media_attachment_id: Option<Uuid>,
    pub header_media_attachment_id: Option<Uuid>,
}

impl Account {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            domain: None,
            avatar_media_attachment_id: None,
            header_media_attachment_id: None,
        }
    }
}

//! accounts table rows. Only the columns media pruning reads.

use fedimedia_core::Account;
use uuid::Uuid;

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct AccountRow {
    pub id: Uuid,
    pub domain: Option<String>,
    pub avatar_media_attachment_id: Option<Uuid>,
    pub header_media_attachment_id: Option<Uuid>,
}

impl AccountRow {
    pub fn to_domain(self) -> Account {
        Account {
            id: self.id,
            domain: self.domain,
            avatar_media_attachment_id: self.avatar_media_attachment_id,
            header_media_attachment_id: self.header_media_attachment_id,
        }
    }
}

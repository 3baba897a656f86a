//! Domain models for media attachments, emoji and the accounts that own them.

pub mod account;
pub mod attachment;
pub mod emoji;

pub use account::Account;
pub use attachment::{
    AdditionalMediaInfo, FileInfo, FileMeta, FileType, Focus, MediaAttachment, Original,
    ProcessingStatus, Small, Thumbnail,
};
pub use emoji::{AdditionalEmojiInfo, Emoji};

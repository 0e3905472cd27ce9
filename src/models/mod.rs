pub mod user;
pub mod note;
pub mod tag;

pub use user::User;
pub use note::{Note, NoteWithTags};
pub use tag::{NoteTag, Tag};

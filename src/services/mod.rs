pub mod note_service;

pub use note_service::{AddedNote, NoteError, NoteResult, NoteService, NoteStore};

pub mod todo;

pub use todo::{PushConfirmation, TodoDraft, TodoPatch, TodoPayload, TodoRecord};

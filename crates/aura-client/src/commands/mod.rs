//! The client command surface invoked by the UI shell.

pub mod calls;
pub mod dictation;
pub mod messaging;
pub mod session;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Not signed in")]
    NotSignedIn,

    #[error("Database not opened")]
    NoDatabase,

    #[error("{0} not initialised")]
    NotReady(&'static str),

    #[error("Cannot send an empty message")]
    EmptyMessage,

    #[error(transparent)]
    Store(#[from] aura_store::StoreError),

    #[error(transparent)]
    Dictation(#[from] aura_media::DictationError),

    #[error("Call session unavailable")]
    CallSessionGone,
}

//! Session identity, history and run state.
//!
//! A session is keyed by a deterministic id derived from the channel kind and
//! the external thread key, so every redelivery of a thread lands on the same
//! record. Two stores are provided: an in-memory map and a directory of JSON
//! metadata plus JSONL history files.

pub mod error;
pub mod file;
pub mod key;
pub mod memory;
pub mod store;

pub use {
    error::{Error, Result},
    file::FileSessionStore,
    key::session_id_for,
    memory::InMemorySessionStore,
    store::{RunOutcome, RunState, Session, SessionStore, get_or_create},
};

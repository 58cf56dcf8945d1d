// Proctor: content integrity and secure messaging for the campus platform.
//
// This is the library root. Each module corresponds to one stage of the
// submission pipeline: moderation gates free text, the codec encrypts
// accepted chat bodies at rest, mention resolution and notification
// fan-out run inside the send transaction.

pub mod chat;
pub mod config;
pub mod crypto;
pub mod db;
pub mod mentions;
pub mod moderation;
pub mod notify;

//! # tally-channels
//!
//! Messaging gateway integration for Tally: outbound replies, encrypted
//! media download and decryption, and voice transcription.

pub mod crypto;
pub mod evolution;
pub mod media;
pub mod whisper;

//! Fractured Key - protect a secret with a master passphrase and k-of-n key
//! fragments hidden in images

#![forbid(unsafe_code)]

pub mod blob;
pub mod cipher;
pub mod envelope;
pub mod error;
pub mod file_ops;
pub mod keywrap;
pub mod orchestrator;
pub mod passphrase;
pub mod sharing;
pub mod stego;
pub mod vault;
pub mod worker;

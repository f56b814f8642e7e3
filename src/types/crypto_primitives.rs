/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Cryptographic and randomness primitives.
//!
//! The re-exports in this module provide the two primitives the repository depends on:
//! 1. **Cryptographic Hashes**: provided by the [`sha2`] crate. Used to derive
//!    [`FileId`](super::data_types::FileId)s and to compute
//!    [`ContentHash`](super::data_types::ContentHash)es of block payloads.
//! 2. **Randomness**: provided by the [`rand_core`] crate. Used to generate fresh
//!    [`EntityId`](super::data_types::EntityId)s.

// re-exports below.
pub use sha2::Digest;
pub use sha2::Sha256 as CryptoHasher;

pub use rand_core::{OsRng, RngCore};

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Sealed Content - Encrypted Decentralized Content Pipeline
//!
//! Content is threshold-encrypted on the client, stored as ciphertext on a
//! content-addressed blob network, and registered on an EVM ledger whose
//! access policy gates decryption through wallet-signed session keys.
//!
//! ## Modules
//!
//! - `session` - ephemeral wallet-signed session keys
//! - `encryption` - threshold encryption against key servers
//! - `storage` - blob encoding, the register/upload/certify protocol, verified reads
//! - `policy` - access policies and the pre-decryption enforcer
//! - `content` - upload and retrieval orchestration
//! - `ledger` - registry contract binding (alloy)
//! - `api` - HTTP gateway (Axum)

pub mod api;
pub mod config;
pub mod content;
pub mod crypto;
pub mod encryption;
pub mod error;
pub mod ledger;
pub mod models;
pub mod policy;
pub mod retry;
#[cfg(any(test, feature = "dev"))]
pub mod sandbox;
pub mod session;
pub mod state;
pub mod storage;
pub mod types;

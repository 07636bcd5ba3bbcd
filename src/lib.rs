//! # Balthasar
//!
//! `Balthasar` is a Rust implementation of an OP stack batch submitter, designed to serve as a replacement for `op-batcher`. It tails the sequencer's unsafe L2 chain, hands new blocks to a channel manager, and submits the resulting channel frames to the L1 batch inbox, either as calldata or as EIP-4844 blob transactions, so that a derivation pipeline can reconstruct the L2 chain from L1 data alone.
//!
//! This crate is structured around a driver loop and the contracts of its external collaborators: the channel manager that compresses blocks into frames, the transaction manager that signs and confirms L1 transactions, the rollup/L2/L1 RPC clients, and an optional alternative data-availability provider.
//!
//! ## Features
//!
//! - **L2 Chain Ingestion**: Resolves the block range to submit from the sequencer's sync status and loads new unsafe blocks, detecting reorgs.
//! - **Concurrent L1 Submission**: Keeps a bounded number of inbox transactions in flight and correlates each send with its receipt.
//! - **Blob and Calldata Wire Formats**: Renders channel frames as EIP-4844 blobs or inline calldata.
//! - **Alt-DA Indirection**: Optionally posts data off-chain and submits only the commitment.
//! - **Lifecycle Control**: Restartable start/stop with graceful draining and a hard-kill escape hatch.
//! - **Telemetry and Logging**: Application tracing and Prometheus gauges.
//!
//! ## Modules
//!
//! - [`common`]: Contains common types and functions used throughout the crate.
//! - [`config`]: Manages configuration settings for the batch submitter.
//! - [`channels`]: The channel-manager contract and the submittable unit type.
//! - [`l1`]: L1 wire objects, notably the EIP-4844 blob encoding.
//! - [`transactions`]: The transaction-manager contract, the bounded send queue, and gas accounting.
//! - [`plasma`]: The alternative data-availability contract and commitment encoding.
//! - [`rollup`]: The sequencer, L2, and L1 client contracts.
//! - [`driver`]: Drives ingestion and submission; owns the service lifecycle.
//! - [`telemetry`]: Handles application telemetry and logging.
//!
#![doc = include_str!("../README.md")]
#![warn(
    missing_debug_implementations,
    missing_docs,
    unreachable_pub,
    rustdoc::all
)]
#![deny(unused_must_use, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

pub mod channels;
pub mod common;
pub mod config;
pub mod driver;
pub mod l1;
pub mod plasma;
pub mod rollup;
pub mod telemetry;
pub mod transactions;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

//! # Code Intel
//!
//! Local code-intelligence tools over a pre-built symbol index.
//!
//! An external indexer writes documents, symbols, and references into a
//! SQLite database. This crate answers go-to-definition and find-references
//! queries against it, fuses lexical and semantic result lists with
//! Reciprocal Rank Fusion, and tracks whether generated discovery artifacts
//! are stale relative to their source files.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │   Indexer    │──▶│ Symbol Store │──▶│ definition / │
//! │  (external)  │   │   (SQLite)   │   │  references  │
//! └──────────────┘   └──────────────┘   └──────┬───────┘
//!                                              │
//!  lexical + semantic hits ──▶ fusion ─────────┤
//!                                              │
//!  sources ──▶ envelope ──▶ staleness ─────────┤
//!                                              ▼
//!                                  ┌─────────────────────┐
//!                                  │  CLI (cix) / HTTP   │
//!                                  └─────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! cix def useContacts --kind function
//! cix refs useContacts --no-definition
//! cix fuse --lexical fts.json --semantic vec.json
//! cix check
//! cix serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`db`] | Database connection |
//! | [`migrate`] | Symbol Store schema |
//! | [`store`] | Read-only Symbol Store handle and stats |
//! | [`definition`] | Go-to-definition |
//! | [`references`] | Find-references |
//! | [`fusion`] | Reciprocal Rank Fusion |
//! | [`sources`] | Artifact source enumeration |
//! | [`envelope`] | Discovery envelopes and chunked manifests |
//! | [`staleness`] | Fresh/stale decisions and chunk plans |
//! | [`discover`] | `check`, `stamp`, and `plan` commands |
//! | [`tools`] | Tool trait and built-in tools |
//! | [`server`] | HTTP tool server |
//! | [`usage_log`] | JSONL tool usage log |

pub mod config;
pub mod db;
pub mod definition;
pub mod discover;
pub mod envelope;
pub mod fusion;
pub mod migrate;
pub mod models;
pub mod references;
pub mod server;
pub mod sources;
pub mod staleness;
pub mod store;
pub mod tools;
pub mod usage_log;

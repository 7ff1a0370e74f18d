//! # spectra
//!
//! Paragraph-level retrieval over a corpus of markdown notes, with
//! contrastive anchors and a margin-based confidence signal.
//!
//! The corpus is cut into paragraphs, indexed in memory, and ranked with a
//! BM25-style score boosted by query coverage and term proximity. On top of
//! that ranking, which is never reordered, each query gets a *margin*: how
//! clearly the top hit beats the runner-up, adjusted by how many of each
//! chunk's anchors the query hit.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌────────────┐   ┌──────────────┐
//! │ ChunkSource  │──▶│   Index    │──▶│   Anchors    │
//! │ (filesystem) │   │ df/idf/vec │   │ (confusers)  │
//! └──────────────┘   └─────┬──────┘   └──────┬───────┘
//!        ▲                 │                 │
//!        │                 ▼                 ▼
//! ┌──────┴──────┐    ┌───────────────────────────────┐
//! │   Watcher   │    │ Engine: search / maintenance  │
//! └─────────────┘    └──────────────┬────────────────┘
//!                           ┌───────┴───────┐
//!                           ▼               ▼
//!                      ┌─────────┐     ┌─────────┐
//!                      │   CLI   │     │  HTTP   │
//!                      └─────────┘     └─────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! spectra status                       # build and summarize the index
//! spectra search "kafka replication"   # ranked paragraphs with margin
//! spectra orphans                      # isolated paragraphs
//! spectra serve                        # HTTP API plus watcher
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`normalize`] | Tokenizing, stemming, stop words |
//! | [`models`] | Core data types |
//! | [`vector`] | Sparse vectors and cosine similarity |
//! | [`index`] | Index construction |
//! | [`anchors`] | Confusers and contrastive anchors |
//! | [`search`] | Ranking, dedup, margin, labels |
//! | [`maintenance`] | Duplicates, orphans, coverage, group similarity |
//! | [`chunk`] | Markdown paragraph chunking |
//! | [`sources`] | Chunk sources |
//! | [`engine`] | Shared engine and its operations |
//! | [`watcher`] | Background rebuild loop |
//! | [`config`] | TOML configuration parsing |
//! | [`server`] | JSON HTTP API |

pub mod anchors;
pub mod chunk;
pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod index;
pub mod logging;
pub mod maintenance;
pub mod models;
pub mod normalize;
pub mod search;
pub mod server;
pub mod sources;
pub mod vector;
pub mod watcher;

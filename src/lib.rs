//! # Roam Sanity
//!
//! A search engine over Roam Research pages, tweets, and Slack threads.
//!
//! Crawlers drop raw per-source JSON; this crate normalizes it into one
//! canonical document shape, keeps every document as a file in a raw store,
//! projects the store into a full-text index, and serves paginated,
//! relevance-ranked queries over HTTP.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌───────────┐   ┌──────────────┐
//! │  Raw JSON   │──▶│ Normalizers  │──▶│ Raw store │──▶│ Search index │
//! │ roam/tw/sl  │   │ per source  │   │ <src>/<h> │   │  ES/tantivy  │
//! └─────────────┘   └─────────────┘   └───────────┘   └──────┬───────┘
//!                                                            │
//!                                          ┌─────────────────┤
//!                                          ▼                 ▼
//!                                     ┌──────────┐     ┌──────────┐
//!                                     │   CLI    │     │   HTTP   │
//!                                     │  (rsp)   │     │ /search  │
//!                                     └──────────┘     └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! rsp init                                  # create store dir and index
//! rsp import roam-research export.json --database help --index
//! rsp import twitter tweets.jsonl --index
//! rsp rebuild                               # repopulate the index from the store
//! rsp search "daily notes"
//! rsp serve                                 # start the search API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing, env overrides, validation |
//! | [`models`] | Core data types: `Source`, `Document`, `SearchHit` |
//! | [`hash`] | URL hashing for raw store file names |
//! | [`dates`] | Timestamp conversion and display formatting |
//! | [`normalize`] | `Normalizer` trait, batch driver, record splitting |
//! | [`connector_roam`] | Roam export pages |
//! | [`connector_twitter`] | API and scraped tweets |
//! | [`connector_slack`] | Slack threads |
//! | [`store`] | Raw document store on disk |
//! | [`backend`] | `SearchBackend` trait, Elasticsearch and tantivy backends |
//! | [`index`] | Index manager: ensure, clear, add, exists, search, populate |
//! | [`retry`] | Fixed-interval retry with injectable sleeper |
//! | [`progress`] | Rebuild progress reporting |
//! | [`render`] | Per-source result rendering to HTML |
//! | [`query`] | Paginated query service |
//! | [`ingest`] | Import, init, and rebuild commands |
//! | [`server`] | HTTP search API |

pub mod backend;
pub mod config;
pub mod connector_roam;
pub mod connector_slack;
pub mod connector_twitter;
pub mod dates;
pub mod hash;
pub mod index;
pub mod ingest;
pub mod models;
pub mod normalize;
pub mod progress;
pub mod query;
pub mod render;
pub mod retry;
pub mod server;
pub mod store;

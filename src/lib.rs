//! # Mirror Restore
//!
//! Turns a raw, locally crawled mirror of a website into a corrected,
//! enriched, self-contained offline copy.
//!
//! Every HTML page of the mirror goes through an ordered list of idempotent
//! rewrite stages that restore content the live site loaded from services
//! that no longer exist (archived comments, music players), annotate pages
//! from exported metadata, strip ad markup and apply UI fixes. The run also
//! emits a JSON search index for the copy's client-side search.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────────────────┐   ┌──────────────┐
//! │   Source     │──▶│  Pipeline                 │──▶│  Output tree │
//! │   mirror     │   │  parse → stages → write   │   │  + index     │
//! └─────────────┘   └────────────┬─────────────┘   └──────────────┘
//!                                 ▲
//!                   ┌─────────────┴─────────────┐
//!                   │ Datasets (read-only, Arc) │
//!                   │ comments · music · works  │
//!                   └───────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! mirror datasets               # check the exports load
//! mirror stages                 # show stage order
//! mirror run --dry-run          # process everything, write nothing
//! mirror run --report run.json  # full run with a JSON report
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Error taxonomy |
//! | [`models`] | Core data types |
//! | [`datasets`] | Comments, music and article datasets |
//! | [`discovery`] | Page discovery over the mirror |
//! | [`document`] | Tolerant HTML document model |
//! | [`stages`] | The transformation stages |
//! | [`pipeline`] | Run orchestration |
//! | [`index`] | Search index builder |
//! | [`writer`] | Output tree writer |
//! | [`report`] | End-of-run report |
//! | [`progress`] | Progress reporting on stderr |
//! | [`inspect`] | `pages`, `datasets` and `stages` listings |

pub mod config;
pub mod datasets;
pub mod discovery;
pub mod document;
pub mod error;
pub mod index;
pub mod inspect;
pub mod models;
pub mod pipeline;
pub mod progress;
pub mod report;
pub mod stages;
pub mod writer;

//! # tuoyu-stats
//!
//! A local-first statistics engine for childcare (托育) workforce reporting.
//!
//! Three read-only sources are loaded, filtered by region / major / year /
//! education level, aggregated into distributions and cross-validated
//! against each other. Results are cached per query and invalidated when
//! any source file changes.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌───────────┐   ┌────────────┐   ┌───────────┐
//! │ institutions │   │  loader   │   │  filters   │   │ aggregate │
//! │ schools      │──▶│ JSON/text │──▶│ region +   │──▶│ dists +   │
//! │ questionnaire│   │ /xlsx     │   │ national   │   │ cross-val │
//! └──────────────┘   └───────────┘   └────────────┘   └─────┬─────┘
//!                                                           │
//!                    ┌──────────┐    ┌────────────┐         │
//!                    │   CLI    │◀───│  StatsApi  │◀────────┘
//!                    │ (tuoyu)  │    │  + cache   │
//!                    └──────────┘    └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! tuoyu stats --region 广东省          # region vs national stats
//! tuoyu demand --region 广东省         # questionnaire posting requirements
//! tuoyu fingerprints                   # source fingerprints
//! tuoyu cache clear
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`spreadsheet`] | First-sheet `.xlsx` reading |
//! | [`loader`] | Source loaders |
//! | [`zoning`] | Province/city from zoning strings |
//! | [`classify`] | Host type, 普惠 and service-mode inference |
//! | [`filters`] | Filtering and deduplication |
//! | [`aggregate`] | Distributions and cross-validation |
//! | [`demand`] | Talent-demand extraction |
//! | [`fingerprint`] | Source-file fingerprints |
//! | [`cache`] | Fingerprint-checked result cache |
//! | [`stats`] | Stats computation |
//! | [`api`] | Cached entry points |

pub mod aggregate;
pub mod api;
pub mod cache;
pub mod classify;
pub mod config;
pub mod demand;
pub mod filters;
pub mod fingerprint;
pub mod loader;
pub mod models;
pub mod spreadsheet;
pub mod stats;
pub mod zoning;

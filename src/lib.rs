//! Linesmith - automated market making for a peer-to-peer betting exchange.
//!
//! Replicates a sharp reference book's odds onto the exchange by placing
//! opposing wagers sized for a small guaranteed post-commission margin, then
//! maintains that liquidity per betting line through a polling
//! reconciliation loop.
//!
//! # Architecture
//!
//! ```text
//! src/
//! ├── domain/           # Pure types: odds, ladder, events, pricing, wagers
//! ├── application/      # Resolvers, position store, line controller, scheduler
//! ├── port/             # Outbound traits (reference feed, exchange API)
//! ├── adapter/          # HTTP adapters: odds feed, exchange, admin surface
//! └── infrastructure/   # Configuration and logging
//! ```
//!
//! The scheduler drives one cycle per poll interval: refresh the reference
//! snapshot, pair events, map market lines, recompute pricing targets,
//! refresh positions from the exchange's wager histories, then let the line
//! controller emit place/cancel actions which are executed with bounded
//! concurrency.

pub mod adapter;
pub mod application;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod port;

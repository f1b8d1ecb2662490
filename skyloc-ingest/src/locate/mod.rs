//! Turning extracted text spans into places
//!
//! - `candidates`: which spans to geocode, in which order
//! - `resolver`: tries candidates until one resolves
//! - `cache`: memoizing, deduplicating gateway to the geocoder
//! - `gate`: minimum spacing between outbound geocoder calls

pub mod cache;
pub mod candidates;
pub mod gate;
pub mod resolver;

pub use cache::{GeocodeCache, PlaceLookup, ResolveError};
pub use candidates::{select_candidates, Candidate};
pub use gate::MinIntervalGate;
pub use resolver::LocationResolver;

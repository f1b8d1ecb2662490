//! External collaborators: upstream feed, entity extraction, geocoding and
//! language detection

pub mod entity_extractor;
pub mod jetstream_client;
pub mod language;
pub mod nominatim_client;

pub use entity_extractor::{EntityExtractor, ExtractionError, HttpEntityExtractor};
pub use jetstream_client::JetstreamFeed;
pub use language::{LanguageDetector, WhatlangDetector};
pub use nominatim_client::{GeocodeError, Geocoder, NominatimClient};

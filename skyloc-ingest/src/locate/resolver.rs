//! Location resolver: first candidate that geocodes wins

use crate::locate::cache::PlaceLookup;
use crate::locate::candidates::select_candidates;
use skyloc_common::events::{LocatedEntity, TextSpan};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct LocationResolver {
    lookup: Arc<dyn PlaceLookup>,
}

impl LocationResolver {
    pub fn new(lookup: Arc<dyn PlaceLookup>) -> Self {
        Self { lookup }
    }

    /// Resolve the best location mentioned by `spans`
    ///
    /// Candidates are tried strictly in selection order and the first one the
    /// geocoder recognizes is returned; later candidates are never queried.
    /// A failed lookup only disqualifies its own candidate.
    pub async fn locate(&self, spans: &[TextSpan]) -> Option<LocatedEntity> {
        for candidate in select_candidates(spans) {
            let query = candidate.query();

            let place = match self.lookup.lookup(&query).await {
                Ok(Some(place)) => place,
                Ok(None) => continue,
                Err(e) => {
                    warn!(query = %query, "Lookup failed, skipping candidate: {}", e);
                    continue;
                }
            };

            debug!(query = %query, place = %place.display_name, "Located");
            return Some(LocatedEntity {
                text: candidate.span.text.clone(),
                start_char: candidate.span.start_char,
                end_char: candidate.span.end_char,
                nlp_type: candidate.span.kind.clone(),
                closest_gpe: candidate.nearest_gpe.map(|gpe| gpe.text.clone()),
                osm: place,
            });
        }

        debug!("No location found among {} spans", spans.len());
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locate::cache::ResolveError;
    use crate::services::nominatim_client::GeocodeError;
    use async_trait::async_trait;
    use skyloc_common::events::{EntityKind, OsmPlace};
    use std::collections::HashMap;
    use std::sync::Mutex;

    fn place(name: &str) -> OsmPlace {
        OsmPlace {
            osm_type: "relation".to_string(),
            osm_id: 42,
            lat: "1.5".to_string(),
            lon: "2.5".to_string(),
            category: "boundary".to_string(),
            place_type: "administrative".to_string(),
            name: name.to_string(),
            display_name: name.to_string(),
            boundingbox: Vec::new(),
        }
    }

    /// Lookup stub: known queries resolve, `failing` ones error, the rest miss
    #[derive(Default)]
    struct StubLookup {
        known: HashMap<String, OsmPlace>,
        failing: Vec<String>,
        queries: Mutex<Vec<String>>,
    }

    impl StubLookup {
        fn knowing(queries: &[&str]) -> Self {
            Self {
                known: queries.iter().map(|q| (q.to_string(), place(q))).collect(),
                ..Default::default()
            }
        }

        fn queries(&self) -> Vec<String> {
            self.queries.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PlaceLookup for StubLookup {
        async fn lookup(&self, query: &str) -> Result<Option<OsmPlace>, ResolveError> {
            self.queries.lock().unwrap().push(query.to_string());
            if self.failing.iter().any(|q| q == query) {
                return Err(ResolveError::Unavailable {
                    query: query.to_string(),
                    attempts: 3,
                    source: GeocodeError::Status(503),
                });
            }
            Ok(self.known.get(query).cloned())
        }
    }

    fn resolver(stub: &Arc<StubLookup>) -> LocationResolver {
        LocationResolver::new(Arc::clone(stub) as Arc<dyn PlaceLookup>)
    }

    fn golden_gate_spans() -> Vec<TextSpan> {
        vec![
            TextSpan::new("FAC", "Golden Gate Bridge", 15, 33),
            TextSpan::new("GPE", "San Francisco", 35, 48),
        ]
    }

    #[tokio::test]
    async fn test_first_priority_candidate_wins() {
        let stub = Arc::new(StubLookup::knowing(&[
            "Golden Gate Bridge, San Francisco",
            "San Francisco",
        ]));

        let entity = resolver(&stub).locate(&golden_gate_spans()).await.unwrap();

        assert_eq!(entity.text, "Golden Gate Bridge");
        assert_eq!(entity.start_char, 15);
        assert_eq!(entity.end_char, 33);
        assert_eq!(entity.nlp_type, EntityKind::Fac);
        assert_eq!(entity.closest_gpe.as_deref(), Some("San Francisco"));
        assert_eq!(entity.osm.name, "Golden Gate Bridge, San Francisco");
        // Secondary candidate never queried
        assert_eq!(stub.queries(), vec!["Golden Gate Bridge, San Francisco"]);
    }

    #[tokio::test]
    async fn test_falls_back_to_gpe() {
        let stub = Arc::new(StubLookup::knowing(&["San Francisco"]));

        let entity = resolver(&stub).locate(&golden_gate_spans()).await.unwrap();

        assert_eq!(entity.text, "San Francisco");
        assert_eq!(entity.nlp_type, EntityKind::Gpe);
        assert_eq!(entity.closest_gpe, None);
        assert_eq!(
            stub.queries(),
            vec!["Golden Gate Bridge, San Francisco", "San Francisco"]
        );
    }

    #[tokio::test]
    async fn test_lookup_error_skips_only_that_candidate() {
        let stub = Arc::new(StubLookup {
            failing: vec!["Golden Gate Bridge, San Francisco".to_string()],
            ..StubLookup::knowing(&["San Francisco"])
        });

        let entity = resolver(&stub).locate(&golden_gate_spans()).await.unwrap();
        assert_eq!(entity.text, "San Francisco");
    }

    #[tokio::test]
    async fn test_nothing_resolves() {
        let stub = Arc::new(StubLookup::knowing(&[]));

        assert!(resolver(&stub).locate(&golden_gate_spans()).await.is_none());
        assert_eq!(stub.queries().len(), 2);
    }

    #[tokio::test]
    async fn test_no_candidates_no_queries() {
        let stub = Arc::new(StubLookup::knowing(&["Ada"]));
        let spans = vec![TextSpan::new("PERSON", "Ada", 0, 3)];

        assert!(resolver(&stub).locate(&spans).await.is_none());
        assert!(stub.queries().is_empty());
    }
}

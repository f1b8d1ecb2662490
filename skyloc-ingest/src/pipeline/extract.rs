//! Extract stage: ingest queue → located results
//!
//! Per image attachment, in post order:
//! 1. Skip missing/empty or non-English alt text
//! 2. Extract entity spans (timed)
//! 3. Resolve the spans to a place (timed)
//! 4. Broadcast the located image
//!
//! An image without a location is a normal outcome. The only fatal condition
//! is the extraction service becoming unavailable.

use crate::error::PipelineResult;
use crate::locate::LocationResolver;
use crate::pipeline::event::{alt_text, InboundEvent};
use crate::pipeline::queue::IngestQueue;
use crate::pipeline::stats::PipelineStats;
use crate::services::entity_extractor::{EntityExtractor, ExtractionError};
use crate::services::language::LanguageDetector;
use crate::subscribers::SubscriberRegistry;
use skyloc_common::events::LocatedImage;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

pub struct ExtractStage {
    queue: Arc<IngestQueue<InboundEvent>>,
    detector: Arc<dyn LanguageDetector>,
    extractor: Arc<dyn EntityExtractor>,
    resolver: LocationResolver,
    registry: Arc<SubscriberRegistry>,
    stats: Arc<PipelineStats>,
}

impl ExtractStage {
    pub fn new(
        queue: Arc<IngestQueue<InboundEvent>>,
        detector: Arc<dyn LanguageDetector>,
        extractor: Arc<dyn EntityExtractor>,
        resolver: LocationResolver,
        registry: Arc<SubscriberRegistry>,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            queue,
            detector,
            extractor,
            resolver,
            registry,
            stats,
        }
    }

    /// Locate and broadcast every image of `event`
    ///
    /// Returns the number of images located.
    pub async fn process_event(&self, event: &InboundEvent) -> PipelineResult<usize> {
        let mut located = 0;

        for image in event.images() {
            let alt = alt_text(image);
            if alt.trim().is_empty() || !self.detector.is_english(alt) {
                continue;
            }
            self.stats.images_with_english_alt.inc();

            let started = Instant::now();
            let extracted = self.extractor.extract(alt).await;
            self.stats.extraction_time.observe(started.elapsed());

            let spans = match extracted {
                Ok(spans) => spans,
                Err(e @ ExtractionError::Unavailable { .. }) => {
                    error!("Entity extraction unavailable: {}", e);
                    return Err(e.into());
                }
                Err(e) => {
                    warn!("Skipping image, extraction failed: {}", e);
                    continue;
                }
            };

            let started = Instant::now();
            let entity = self.resolver.locate(&spans).await;
            self.stats.geocode_doc_time.observe(started.elapsed());

            let Some(entity) = entity else {
                continue;
            };

            self.stats.images_with_location.inc();
            located += 1;
            debug!(
                "Located '{}' at {}",
                entity.text, entity.osm.display_name
            );

            self.registry.broadcast(Arc::new(LocatedImage {
                entity,
                image: image.clone(),
                event: event.payload().clone(),
            }));
        }

        Ok(located)
    }

    /// Run until extraction fails; never returns `Ok`
    pub async fn run(self) -> PipelineResult<()> {
        info!("Extract stage started");

        loop {
            let event = self.queue.pop().await;
            self.process_event(&event).await?;
        }
    }
}

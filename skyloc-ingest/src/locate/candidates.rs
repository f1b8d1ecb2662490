//! Geocoding candidate selection
//!
//! Facilities and natural locations are the most specific anchors, so they are
//! tried first, each paired with the nearest geo-political entity to
//! disambiguate ("Golden Gate Bridge" + "San Francisco"). Bare GPEs follow as
//! fallbacks.

use skyloc_common::events::{EntityKind, TextSpan};

/// Span proposed for geocoding, with optional disambiguating GPE
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate<'a> {
    pub span: &'a TextSpan,
    pub nearest_gpe: Option<&'a TextSpan>,
}

impl<'a> Candidate<'a> {
    /// Geocoding query for this candidate
    pub fn query(&self) -> String {
        match self.nearest_gpe {
            Some(gpe) => format!("{}, {}", self.span.text, gpe.text),
            None => self.span.text.clone(),
        }
    }
}

/// Order `spans` (document order) into geocoding candidates
///
/// Priority candidates (every `FAC`/`LOC`, paired with the GPE closest by span
/// index) come first, then every `GPE` on its own. Other tags are ignored.
pub fn select_candidates(spans: &[TextSpan]) -> Vec<Candidate<'_>> {
    let gpes: Vec<(usize, &TextSpan)> = spans
        .iter()
        .enumerate()
        .filter(|(_, span)| span.kind == EntityKind::Gpe)
        .collect();

    let priority = spans
        .iter()
        .enumerate()
        .filter(|(_, span)| matches!(span.kind, EntityKind::Fac | EntityKind::Loc))
        .map(|(index, span)| Candidate {
            span,
            nearest_gpe: nearest(&gpes, index),
        });

    let secondary = gpes.iter().map(|(_, span)| Candidate {
        span,
        nearest_gpe: None,
    });

    priority.chain(secondary).collect()
}

// Ties keep the first (lowest-index) GPE.
fn nearest<'a>(gpes: &[(usize, &'a TextSpan)], index: usize) -> Option<&'a TextSpan> {
    let mut best: Option<(usize, &'a TextSpan)> = None;
    for &(gpe_index, gpe) in gpes {
        let distance = gpe_index.abs_diff(index);
        if best.map_or(true, |(best_distance, _)| distance < best_distance) {
            best = Some((distance, gpe));
        }
    }
    best.map(|(_, gpe)| gpe)
}

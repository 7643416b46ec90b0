//! The stability policy: prevents unsafe drops of `matchConfidence` across
//! hot-reloads (§4.4). Pure and independently testable from the rest of the
//! configuration engine.

use crate::types::Thresholds;

/// Maximum tolerated single-reload drop in `matchConfidence` before the
/// stability policy refuses it.
const MAX_ALLOWED_DROP: f64 = 0.15;

/// Apply the stability policy to one format's threshold set.
///
/// `previous` is the currently active threshold set for this format, if
/// any (absent on the very first load for a format). `highest_observed` is
/// the highest `matchConfidence` the background poller (or a prior call to
/// this function) has ever seen for this format; it is never decreased.
///
/// Returns the possibly-adjusted thresholds and the updated
/// `highest_observed` value.
///
/// A decrease in `matchConfidence` is permitted only if all of:
/// - `fuzzyHashThreshold` did not decrease,
/// - `renameConfidence ≥` the new `matchConfidence`,
/// - the drop is `≤ 0.15`.
///
/// Otherwise the threshold is preserved at `max(previous, highestObserved)`
/// (or, on a first load with no `previous`, at `max(candidate,
/// highestObserved)`), raising `renameConfidence` to match if that would
/// otherwise be violated.
pub fn apply(
    previous: Option<Thresholds>,
    mut candidate: Thresholds,
    highest_observed: f64,
) -> (Thresholds, f64) {
    let new_match_confidence = match previous {
        Some(previous) if candidate.match_confidence < previous.match_confidence => {
            let drop = previous.match_confidence - candidate.match_confidence;
            let fuzzy_did_not_decrease =
                candidate.fuzzy_hash_similarity >= previous.fuzzy_hash_similarity;
            let rename_still_covers = candidate.rename_confidence >= candidate.match_confidence;
            let drop_within_tolerance = drop <= MAX_ALLOWED_DROP;

            if fuzzy_did_not_decrease && rename_still_covers && drop_within_tolerance {
                candidate.match_confidence
            } else {
                previous.match_confidence.max(highest_observed)
            }
        }
        Some(_) => {
            // Equal or increased: always permitted.
            candidate.match_confidence
        }
        None => {
            // First load for this format: apply any higher value the
            // poller already observed before this explicit load.
            candidate.match_confidence.max(highest_observed)
        }
    };

    candidate.match_confidence = new_match_confidence;
    if candidate.rename_confidence < candidate.match_confidence {
        candidate.rename_confidence = candidate.match_confidence;
    }

    let updated_highest_observed = highest_observed.max(new_match_confidence);
    (candidate, updated_highest_observed)
}

//! Block accounting over track documents.

use crate::blocks::{BlockIdSet, SampleBlock};
use crate::document::TrackDocument;

/// Calls `visit` once for every block `tracks` references that is not in
/// `seen` yet, and adds those blocks to `seen`.
///
/// The same block may appear several times in one document after copy and
/// paste; it is still visited once.
pub fn inspect_blocks(
    tracks: &TrackDocument,
    mut visit: impl FnMut(&SampleBlock),
    seen: &mut BlockIdSet,
) {
    tracks.for_each_track(|track| {
        let Some(wave) = track.as_wave() else {
            return;
        };
        for block in wave.blocks() {
            if seen.insert(block.id()) {
                visit(block);
            }
        }
    });
}

/// Bytes of the blocks in `tracks` not already counted in `seen`.
pub fn space_usage(tracks: &TrackDocument, seen: &mut BlockIdSet) -> u64 {
    let mut total = 0;
    inspect_blocks(tracks, |block| total += block.space_usage(), seen);
    total
}

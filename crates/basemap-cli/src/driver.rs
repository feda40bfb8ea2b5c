//! Owner-thread frame loop

use basemap_tiles::{ColoredSegment, FrameStats, TileFetcher, TileRenderer, View};
use std::time::Duration;

/// Last frame rendered by [`run_until_settled`]
#[derive(Debug, Default)]
pub struct FrameOutcome {
    /// Number of frames rendered
    pub frames: u32,
    pub stats: FrameStats,
    /// Segments drawn in the last frame
    pub segments: Vec<ColoredSegment>,
}

impl FrameOutcome {
    pub fn is_settled(&self) -> bool {
        self.stats.is_settled()
    }
}

/// Render `view` once per frame until every visible tile has settled or `max_frames` have
/// been rendered. At least one frame is always rendered.
pub fn run_until_settled<F: TileFetcher>(
    renderer: &mut TileRenderer<F>,
    view: &View,
    max_frames: u32,
    frame_interval: Duration,
) -> FrameOutcome {
    let mut outcome = FrameOutcome::default();

    for frame in 1..=max_frames.max(1) {
        let mut segments = Vec::new();
        let stats = renderer.render(view, &mut segments);
        profiling::finish_frame!();

        outcome = FrameOutcome {
            frames: frame,
            stats,
            segments,
        };
        if outcome.is_settled() {
            tracing::debug!("View settled after {} frames", frame);
            break;
        }

        tracing::trace!(
            "Frame {}: {}/{} tiles settled, {} pending",
            frame,
            stats.settled_tiles,
            stats.visible_tiles,
            stats.pending
        );
        std::thread::sleep(frame_interval);
    }

    if !outcome.is_settled() {
        tracing::warn!(
            "Gave up after {} frames with {} of {} tiles unsettled",
            outcome.frames,
            outcome.stats.visible_tiles - outcome.stats.settled_tiles,
            outcome.stats.visible_tiles
        );
    }
    outcome
}

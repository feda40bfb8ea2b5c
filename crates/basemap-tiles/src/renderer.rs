//! Per-frame glue between a camera view, the tile cache and a line drawer

use crate::tile_math::{TileRange, clamp_latitude, zoom_for_extent};
use crate::{ColoredSegment, Config, Rgba, TileCache, TileFetcher, TileState};
use geo::{Coord, Rect};
use tokio::runtime::Handle;

/// Camera state the renderer reads each frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct View {
    /// Center of the view (x = longitude, y = latitude)
    pub center: Coord<f64>,
    /// Latitude degrees visible above and below the center
    pub half_extent_deg: f64,
    pub width_px: u32,
    pub height_px: u32,
}

impl View {
    pub fn new(center: Coord<f64>, half_extent_deg: f64, width_px: u32, height_px: u32) -> Self {
        Self {
            center,
            half_extent_deg,
            width_px,
            height_px,
        }
    }

    /// Whether the view has no visible area
    pub fn is_degenerate(&self) -> bool {
        self.width_px == 0
            || self.height_px == 0
            || !self.half_extent_deg.is_finite()
            || self.half_extent_deg <= 0.0
    }

    /// Visible longitude/latitude bounds, before any latitude clamping.
    ///
    /// The horizontal extent follows the aspect ratio of the screen.
    pub fn bounds(&self) -> Rect<f64> {
        let aspect = self.width_px as f64 / self.height_px.max(1) as f64;
        let half_width = self.half_extent_deg * aspect;
        Rect::new(
            Coord {
                x: self.center.x - half_width,
                y: self.center.y - self.half_extent_deg,
            },
            Coord {
                x: self.center.x + half_width,
                y: self.center.y + self.half_extent_deg,
            },
        )
    }
}

/// Receives every visible segment, once per segment per frame
pub trait LineSink {
    fn add_line(&mut self, a: Coord<f64>, b: Coord<f64>, color: Rgba);
}

impl LineSink for Vec<ColoredSegment> {
    fn add_line(&mut self, a: Coord<f64>, b: Coord<f64>, color: Rgba) {
        self.push(ColoredSegment { a, b, color });
    }
}

/// Summary of one rendered frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub zoom: u8,
    /// Tiles covering the view
    pub visible_tiles: usize,
    /// Visible tiles that are ready or failed
    pub settled_tiles: usize,
    pub segments_drawn: usize,
    /// Ready tiles in the cache after eviction
    pub cached: usize,
    /// Tiles still being fetched
    pub pending: usize,
}

impl FrameStats {
    /// Whether every visible tile has finished loading one way or another
    pub fn is_settled(&self) -> bool {
        self.settled_tiles == self.visible_tiles
    }
}

/// Draws cached vector tiles under the current view
pub struct TileRenderer<F: TileFetcher> {
    cache: TileCache<F>,
    max_zoom: u8,
    max_cached_tiles: usize,
}

impl<F: TileFetcher> TileRenderer<F> {
    pub fn new(fetcher: F, config: &Config, runtime: Handle) -> Self {
        Self {
            cache: TileCache::new(fetcher, config, runtime),
            max_zoom: config.max_zoom,
            max_cached_tiles: config.max_cached_tiles,
        }
    }

    pub fn cache(&self) -> &TileCache<F> {
        &self.cache
    }

    /// Absorb completed fetches, request every tile under `view` and forward ready segments
    /// to `sink`, then evict old tiles.
    pub fn render(&mut self, view: &View, sink: &mut impl LineSink) -> FrameStats {
        #[cfg(feature = "profiling")]
        profiling::scope!("TileRenderer::render");

        self.cache.process_completed_fetches();

        let mut stats = FrameStats::default();
        if view.is_degenerate() {
            return self.finish(stats);
        }

        let visible = view.bounds();
        let lat_min = clamp_latitude(visible.min().y);
        let lat_max = clamp_latitude(visible.max().y);
        if lat_min >= lat_max {
            tracing::trace!("View lies outside the Mercator latitude range");
            return self.finish(stats);
        }
        let bounds = Rect::new(
            Coord {
                x: visible.min().x,
                y: lat_min,
            },
            Coord {
                x: visible.max().x,
                y: lat_max,
            },
        );

        stats.zoom = zoom_for_extent(view.half_extent_deg, view.height_px).min(self.max_zoom);
        let range = TileRange::covering(bounds, stats.zoom);
        stats.visible_tiles = range.tile_count();

        for key in range.keys() {
            if let Some(lines) = self.cache.request_tile(key) {
                for line in lines {
                    sink.add_line(line.a, line.b, line.color);
                }
                stats.segments_drawn += lines.len();
            }
            if matches!(self.cache.state(&key), TileState::Ready | TileState::Failed) {
                stats.settled_tiles += 1;
            }
        }

        self.cache.evict_old_tiles(self.max_cached_tiles);
        self.finish(stats)
    }

    fn finish(&self, mut stats: FrameStats) -> FrameStats {
        stats.cached = self.cache.cached_count();
        stats.pending = self.cache.pending_count();
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mvt::test_support::square_tile;
    use crate::{FetchResult, Result, TileKey};
    use std::time::{Duration, Instant};

    struct StaticFetcher(Vec<u8>);

    impl TileFetcher for StaticFetcher {
        async fn fetch(&self, _key: TileKey) -> Result<Vec<u8>> {
            Ok(self.0.clone())
        }
    }

    struct PendingFetcher;

    impl TileFetcher for PendingFetcher {
        async fn fetch(&self, _key: TileKey) -> Result<Vec<u8>> {
            std::future::pending::<Result<Vec<u8>>>().await
        }
    }

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap()
    }

    fn renderer(rt: &tokio::runtime::Runtime, config: Config) -> TileRenderer<PendingFetcher> {
        let config = Config {
            request_timeout: Duration::from_millis(50),
            ..config
        };
        TileRenderer::new(PendingFetcher, &config, rt.handle().clone())
    }

    fn world_view() -> View {
        View::new(Coord { x: 0.0, y: 0.0 }, 90.0, 200, 200)
    }

    fn segment(y: f64) -> ColoredSegment {
        ColoredSegment {
            a: Coord { x: 0.0, y },
            b: Coord { x: 1.0, y },
            color: Rgba::new(0.5, 0.5, 0.5, 1.0),
        }
    }

    #[test]
    fn test_view_bounds_follow_aspect_ratio() {
        let view = View::new(Coord { x: 10.0, y: 20.0 }, 1.0, 400, 200);
        let bounds = view.bounds();
        assert_eq!(bounds.min(), Coord { x: 8.0, y: 19.0 });
        assert_eq!(bounds.max(), Coord { x: 12.0, y: 21.0 });
    }

    #[test]
    fn test_first_frame_requests_then_draws_ready_tile() {
        let rt = runtime();
        let config = Config {
            request_timeout: Duration::from_secs(2),
            ..Config::default()
        };
        let fetcher = StaticFetcher(square_tile("streets", 100));
        let mut renderer = TileRenderer::new(fetcher, &config, rt.handle().clone());
        let mut sink = Vec::new();

        let stats = renderer.render(&world_view(), &mut sink);
        assert_eq!(stats.zoom, 0);
        assert_eq!(stats.visible_tiles, 1);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.segments_drawn, 0);
        assert!(!stats.is_settled());
        assert!(sink.is_empty());

        let deadline = Instant::now() + Duration::from_secs(5);
        let stats = loop {
            let stats = renderer.render(&world_view(), &mut sink);
            if stats.is_settled() {
                break stats;
            }
            assert!(Instant::now() < deadline, "tile never settled");
            std::thread::sleep(Duration::from_millis(5));
        };
        assert_eq!(stats.segments_drawn, 4);
        assert_eq!(stats.cached, 1);
        assert_eq!(stats.pending, 0);
        assert_eq!(sink.len(), 4);

        // Ready tiles are drawn again every frame
        renderer.render(&world_view(), &mut sink);
        assert_eq!(sink.len(), 8);
    }

    #[test]
    fn test_zoom_is_capped() {
        let rt = runtime();
        let config = Config {
            max_zoom: 12,
            ..Config::default()
        };
        let mut renderer = renderer(&rt, config);
        let view = View::new(Coord { x: 13.4, y: 52.5 }, 0.0005, 800, 1000);

        let stats = renderer.render(&view, &mut Vec::new());
        assert_eq!(stats.zoom, 12);
        assert!(stats.visible_tiles >= 1);
    }

    #[test]
    fn test_degenerate_view_still_drains() {
        let rt = runtime();
        let mut renderer = renderer(&rt, Config::default());
        renderer
            .cache()
            .inbox()
            .push(FetchResult::success(TileKey::new(3, 1, 1), vec![segment(0.0)]));

        let view = View::new(Coord { x: 0.0, y: 0.0 }, 1.0, 640, 0);
        let mut sink = Vec::new();
        let stats = renderer.render(&view, &mut sink);

        assert_eq!(stats.visible_tiles, 0);
        assert_eq!(stats.cached, 1);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_view_beyond_mercator_range_requests_nothing() {
        let rt = runtime();
        let mut renderer = renderer(&rt, Config::default());
        let view = View::new(Coord { x: 0.0, y: 89.9 }, 0.01, 100, 100);

        let stats = renderer.render(&view, &mut Vec::new());
        assert_eq!(stats.visible_tiles, 0);
        assert_eq!(stats.pending, 0);
    }

    #[test]
    fn test_budget_limits_first_frame_requests() {
        let rt = runtime();
        let mut renderer = renderer(&rt, Config::default());
        // Wide zoom 2 view covering all 16 tiles
        let view = View::new(Coord { x: 0.0, y: 0.0 }, 85.0, 1400, 600);

        let stats = renderer.render(&view, &mut Vec::new());
        assert_eq!(stats.zoom, 2);
        assert_eq!(stats.visible_tiles, 16);
        assert_eq!(stats.pending, Config::default().max_concurrent_fetches);
        // Row-major order: the first row is dispatched first
        for column in 0..4 {
            assert_eq!(
                renderer.cache().state(&TileKey::new(2, column, 0)),
                TileState::Fetching
            );
        }
    }

    #[test]
    fn test_render_evicts_to_cap() {
        let rt = runtime();
        let config = Config {
            max_cached_tiles: 1,
            ..Config::default()
        };
        let mut renderer = renderer(&rt, config);
        for column in 0..3 {
            renderer
                .cache()
                .inbox()
                .push(FetchResult::success(TileKey::new(5, column, 0), Vec::new()));
        }

        let stats = renderer.render(&world_view(), &mut Vec::new());
        assert_eq!(stats.cached, 1);
    }
}

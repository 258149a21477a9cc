//! Integration tests for the synchronous stages
//!
//! These tests drive the background filter, frame aggregator and
//! characterizer together the way the ingestion thread does.

use std::collections::HashSet;
use std::time::Duration;

use lbad_algorithms::*;
use lbad_core::{
    BackgroundConfig, CharacteristicsVector, Frame, ObjectCharacterizer, PipelineConfig, ScanPoint,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Static wall during the first `learn_ms`, then a jittering object in front of it
fn synthetic_stream(learn_ms: u64, object_ms: u64, seed: u64) -> Vec<ScanPoint> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut points = Vec::new();
    for t in 0..learn_ms + object_ms {
        // Wall at x = 5 in both phases, swept over a fixed 10x10 raster
        points.push(ScanPoint::from_xyz(
            5.0,
            (t % 10) as f32 * 0.2 - 1.0,
            ((t / 10) % 10) as f32 * 0.2 - 1.0,
            30.0,
            t,
        ));
        if t >= learn_ms {
            points.push(ScanPoint::from_xyz(
                1.0 + rng.gen_range(-0.2..0.2),
                rng.gen_range(-0.2..0.2),
                rng.gen_range(-0.2..0.2),
                60.0,
                t,
            ));
        }
    }
    points
}

fn handle(frame: Frame, characterizer: &mut MomentCharacterizer) -> CharacteristicsVector {
    for p in frame.points {
        characterizer.new_point(p);
    }
    characterizer.extract_characteristics()
}

#[test]
fn test_learning_points_never_reach_frames() {
    let config = PipelineConfig::default();
    let mut filter = BackgroundFilter::new(&config).unwrap();
    let mut aggregator = FrameAggregator::new(config.frame_time()).unwrap();

    let stream = synthetic_stream(500, 300, 1);
    let mut learned: HashSet<u64> = HashSet::new();
    let mut frames = Vec::new();

    for (index, point) in stream.iter().enumerate() {
        let learning = filter.is_learning(point.timestamp);
        let class = filter.classify(point);
        if learning {
            assert_eq!(class, Classification::Background);
            learned.insert(index as u64);
        }
        frames.extend(aggregator.on_tick(point.timestamp));
        if class == Classification::Candidate {
            frames.extend(aggregator.on_point(*point));
        }
    }
    frames.extend(aggregator.flush());

    assert!(!frames.is_empty());
    for frame in &frames {
        for p in frame.points.iter() {
            assert!(p.timestamp >= Duration::from_millis(500));
        }
    }
    assert_eq!(learned.len(), 500);
}

#[test]
fn test_candidate_points_are_conserved() {
    let config = PipelineConfig {
        frame_time_ms: 40,
        background: BackgroundConfig {
            voxel_size: 0.1,
            ..BackgroundConfig::default()
        },
        ..PipelineConfig::default()
    };
    let mut filter = BackgroundFilter::new(&config).unwrap();
    let mut aggregator = FrameAggregator::new(config.frame_time()).unwrap();
    let mut characterizer = MomentCharacterizer::new();

    let mut dispatched = 0usize;
    let mut vectors = Vec::new();
    for point in synthetic_stream(200, 400, 2) {
        if let Some(frame) = aggregator.on_tick(point.timestamp) {
            dispatched += frame.len();
            vectors.push(handle(frame, &mut characterizer));
        }
        if filter.classify(&point) == Classification::Candidate {
            if let Some(frame) = aggregator.on_point(point) {
                dispatched += frame.len();
                vectors.push(handle(frame, &mut characterizer));
            }
        }
    }
    if let Some(frame) = aggregator.flush() {
        dispatched += frame.len();
        vectors.push(handle(frame, &mut characterizer));
    }

    let candidates = filter.stats().candidates as usize;
    assert!(candidates > 0);
    assert_eq!(dispatched, candidates);
    assert_eq!(
        vectors.iter().map(|cv| cv.point_count).sum::<usize>(),
        candidates
    );
    // 400 ms of object at 40 ms per frame
    assert!(vectors.len() >= 10);
    for cv in &vectors {
        assert!(cv.centroid.x > 0.5 && cv.centroid.x < 1.5);
        assert!(cv.mean_reflectivity > 59.0);
    }
}

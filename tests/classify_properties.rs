use anyhow::Result;
use serde_json::{json, Value};

use slotwatch::{
    classify, error_kind, EngineConfig, ErrorKind, Frame, OccupancyEngine, Point, Region,
    RegionModel, WarningKind,
};

fn rect(id: &str, x0: i32, y0: i32, x1: i32, y1: i32) -> Region {
    Region::new(
        id,
        vec![
            Point::new(x0, y0),
            Point::new(x1, y0),
            Point::new(x1, y1),
            Point::new(x0, y1),
        ],
    )
    .unwrap()
}

/// Square cells of `cell` pixels alternating black and white.
fn checkerboard(width: u32, height: u32, cell: u32) -> Frame {
    let pixels = (0..height)
        .flat_map(|y| {
            (0..width).flat_map(move |x| {
                let v = if (x / cell + y / cell) % 2 == 0 { 0 } else { 255 };
                [v, v, v]
            })
        })
        .collect();
    Frame::from_rgb(width, height, pixels).unwrap()
}

/// Deterministic pseudo-random frame.
fn noise(width: u32, height: u32) -> Frame {
    let mut state = 0x2545_f491u32;
    let pixels = (0..width * height * 3)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state >> 24) as u8
        })
        .collect();
    Frame::from_rgb(width, height, pixels).unwrap()
}

#[test]
fn uniform_grey_scenario_matches_wire_report() -> Result<()> {
    let regions = RegionModel::from_json(
        r#"{"slots":[{"id":"A","polygon":[[0,0],[10,0],[10,10],[0,10]]}]}"#,
    )?;
    let frame = Frame::filled(10, 10, [128, 128, 128])?;
    let result = classify(&frame, &regions)?;

    let report: Value = serde_json::from_str(&result.snapshot.report().to_json()?)?;
    assert_eq!(
        report,
        json!({
            "total": 1,
            "occupied": 0,
            "free": 1,
            "slots": {"A": {"occupied": false, "count": 0, "occupancy_ratio": 0.0}}
        })
    );
    assert!(result.warnings.is_empty());
    Ok(())
}

#[test]
fn black_frame_is_all_free() -> Result<()> {
    let regions = RegionModel::new(vec![
        rect("A1", 0, 0, 19, 19),
        rect("A2", 20, 0, 39, 19),
        rect("B1", 5, 22, 35, 38),
    ])?;
    let frame = Frame::filled(40, 40, [0, 0, 0])?;
    let result = classify(&frame, &regions)?;
    assert_eq!(result.snapshot.total, 3);
    assert_eq!(result.snapshot.free, 3);
    for verdict in result.snapshot.per_region.values() {
        assert_eq!(verdict.foreground_pixel_count, 0);
        assert_eq!(verdict.edge_pixel_count, 0);
    }
    Ok(())
}

#[test]
fn checkerboard_is_occupied_on_texture_alone() -> Result<()> {
    let regions = RegionModel::new(vec![rect("C", 5, 5, 54, 54)])?;
    let frame = checkerboard(60, 60, 6);
    let engine = OccupancyEngine::new(EngineConfig {
        edge_detection: false,
        ..EngineConfig::default()
    })?;
    let result = engine.classify(&frame, &regions)?;
    let verdict = &result.snapshot.per_region["C"];
    assert!(verdict.occupied);
    assert_eq!(verdict.edge_pixel_count, 0);
    assert!(verdict.occupancy_ratio > 0.15);
    Ok(())
}

#[test]
fn dark_vehicle_on_bright_lot_is_occupied() -> Result<()> {
    let regions = RegionModel::new(vec![rect("car", 10, 10, 39, 39), rect("empty", 50, 10, 79, 39)])?;
    let mut pixels = Vec::with_capacity(90 * 50 * 3);
    for y in 0..50u32 {
        for x in 0..90u32 {
            let v = if (13..37).contains(&x) && (17..33).contains(&y) {
                20
            } else {
                200
            };
            pixels.extend_from_slice(&[v, v, v]);
        }
    }
    let frame = Frame::from_rgb(90, 50, pixels)?;
    let result = classify(&frame, &regions)?;
    assert!(result.snapshot.per_region["car"].occupied);
    assert!(!result.snapshot.per_region["empty"].occupied);
    assert_eq!(result.snapshot.occupied, 1);
    assert_eq!(result.snapshot.free, 1);
    Ok(())
}

#[test]
fn classification_is_idempotent() -> Result<()> {
    let regions = RegionModel::new(vec![rect("A", 2, 2, 30, 30), rect("B", 33, 2, 61, 30)])?;
    let frame = noise(64, 32);
    let first = classify(&frame, &regions)?;
    let second = classify(&frame, &regions)?;
    assert_eq!(first.annotated, second.annotated);
    assert_eq!(first.snapshot, second.snapshot);
    Ok(())
}

#[test]
fn totals_and_ratios_stay_in_bounds() -> Result<()> {
    let regions = RegionModel::new(vec![
        rect("A", 0, 0, 20, 15),
        rect("B", 22, 0, 63, 15),
        rect("C", 0, 17, 63, 31),
        Region::new(
            "T",
            vec![Point::new(10, 5), Point::new(50, 8), Point::new(30, 28)],
        )?,
    ])?;
    let result = classify(&noise(64, 32), &regions)?;
    let snapshot = &result.snapshot;
    assert_eq!(snapshot.total, regions.len());
    assert_eq!(snapshot.total, snapshot.occupied + snapshot.free);
    for verdict in snapshot.per_region.values() {
        assert!(verdict.slot_area > 0);
        assert!((0.0..=1.0).contains(&verdict.occupancy_ratio));
        assert!((0.0..=1.0).contains(&verdict.edge_ratio));
        assert!(verdict.foreground_pixel_count <= verdict.slot_area);
    }
    Ok(())
}

#[test]
fn two_point_region_is_rejected() {
    let err = RegionModel::from_json(r#"{"slots":[{"id":"A","polygon":[[0,0],[10,0]]}]}"#)
        .unwrap_err();
    assert_eq!(error_kind(&err), Some(ErrorKind::InvalidRegion));
}

#[test]
fn region_outside_frame_warns_or_fails_in_strict_mode() -> Result<()> {
    let regions = RegionModel::new(vec![rect("in", 0, 0, 9, 9), rect("out", 100, 100, 120, 120)])?;
    let frame = Frame::filled(20, 20, [90, 90, 90])?;

    let result = classify(&frame, &regions)?;
    assert_eq!(result.snapshot.total, 2);
    assert!(!result.snapshot.per_region["out"].occupied);
    assert_eq!(result.warnings.len(), 1);
    assert_eq!(result.warnings[0].region_id, "out");
    assert_eq!(result.warnings[0].kind, WarningKind::EmptyArea);

    let strict = OccupancyEngine::new(EngineConfig {
        strict_regions: true,
        ..EngineConfig::default()
    })?;
    let err = strict.classify(&frame, &regions).unwrap_err();
    assert_eq!(error_kind(&err), Some(ErrorKind::InvalidRegion));
    Ok(())
}

#[test]
fn undecodable_bytes_are_a_decode_error() {
    let err = Frame::decode(b"definitely not an image").unwrap_err();
    assert_eq!(error_kind(&err), Some(ErrorKind::FrameDecode));
}

#[test]
fn annotated_frame_round_trips_through_disk() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let regions = RegionModel::new(vec![rect("A", 2, 2, 30, 30)])?;
    let result = classify(&Frame::filled(40, 40, [128, 128, 128])?, &regions)?;
    let path = dir.path().join("annotated.png");
    result.annotated.save(&path)?;
    assert_eq!(Frame::open(&path)?, result.annotated);
    Ok(())
}

#[test]
fn far_off_frame_vertices_classify_without_overflow() -> Result<()> {
    let regions = RegionModel::new(vec![Region::new(
        "wide",
        vec![
            Point::new(-2_000_000_000, 0),
            Point::new(2_000_000_000, 5),
            Point::new(0, 10),
        ],
    )?])?;
    let result = classify(&Frame::filled(20, 20, [90, 90, 90])?, &regions)?;
    let verdict = &result.snapshot.per_region["wide"];
    assert_eq!(result.snapshot.total, 1);
    assert!(verdict.slot_area > 0);
    assert!(!verdict.occupied);
    Ok(())
}

//! Region model: named polygons over the frame plane.
//!
//! A `RegionModel` is validated as a whole when it is built, so the classifier can
//! assume every polygon has at least three vertices, encloses positive area and does
//! not cross itself. The on-disk format is the `slots.json` layout produced by the
//! region marker:
//!
//! ```json
//! { "slots": [ { "id": "L1", "polygon": [[10, 10], [60, 10], [60, 90], [10, 90]] } ] }
//! ```

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use regex::Regex;
use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;
use std::sync::OnceLock;

use crate::error::OccupancyError;

/// Integer pixel coordinate. Serialised as `[x, y]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[i32; 2]", into = "[i32; 2]")]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl From<[i32; 2]> for Point {
    fn from([x, y]: [i32; 2]) -> Self {
        Self { x, y }
    }
}

impl From<Point> for [i32; 2] {
    fn from(p: Point) -> Self {
        [p.x, p.y]
    }
}

impl From<(i32, i32)> for Point {
    fn from((x, y): (i32, i32)) -> Self {
        Self { x, y }
    }
}

/// Accepts `x,y`, `x y`, `XxY` and `[x, y]`.
impl FromStr for Point {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        static POINT_RE: OnceLock<Regex> = OnceLock::new();
        let re = POINT_RE.get_or_init(|| {
            Regex::new(r"^\s*\[?\s*(-?\d+)\s*[,x ]\s*(-?\d+)\s*\]?\s*$").unwrap()
        });
        let caps = re
            .captures(raw)
            .ok_or_else(|| anyhow!("point must look like 'x,y', got '{}'", raw))?;
        let x = caps[1]
            .parse()
            .with_context(|| format!("x coordinate out of range in '{}'", raw))?;
        let y = caps[2]
            .parse()
            .with_context(|| format!("y coordinate out of range in '{}'", raw))?;
        Ok(Self { x, y })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Region {
    id: String,
    polygon: Vec<Point>,
}

impl Region {
    /// Build a region, rejecting polygons the classifier cannot give a defined answer for.
    pub fn new(id: impl Into<String>, polygon: Vec<Point>) -> Result<Self> {
        let region = Self {
            id: id.into(),
            polygon,
        };
        region.validate()?;
        Ok(region)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn polygon(&self) -> &[Point] {
        &self.polygon
    }

    /// Mean of the vertices, truncated toward zero.
    pub fn centroid(&self) -> Point {
        let n = self.polygon.len() as i64;
        let (sx, sy) = self
            .polygon
            .iter()
            .fold((0i64, 0i64), |(sx, sy), p| (sx + p.x as i64, sy + p.y as i64));
        Point::new((sx / n) as i32, (sy / n) as i32)
    }

    /// Inclusive bounding box as `(min, max)`.
    pub fn bounds(&self) -> (Point, Point) {
        let mut min = self.polygon[0];
        let mut max = self.polygon[0];
        for p in &self.polygon[1..] {
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
        }
        (min, max)
    }

    /// Twice the signed shoelace area.
    pub fn doubled_area(&self) -> i128 {
        let n = self.polygon.len();
        (0..n)
            .map(|i| {
                let a = self.polygon[i];
                let b = self.polygon[(i + 1) % n];
                a.x as i128 * b.y as i128 - b.x as i128 * a.y as i128
            })
            .sum()
    }

    /// True when the pixel at `(x, y)` lies inside the polygon or on its boundary.
    pub fn contains(&self, x: i32, y: i32) -> bool {
        let p = Point::new(x, y);
        let n = self.polygon.len();
        let mut inside = false;
        for i in 0..n {
            let a = self.polygon[i];
            let b = self.polygon[(i + 1) % n];
            if on_segment(a, b, p) {
                return true;
            }
            if (a.y > y) != (b.y > y) {
                let t = (y as i64 - a.y as i64) as f64 / (b.y as i64 - a.y as i64) as f64;
                let x_cross = a.x as f64 + t * (b.x as i64 - a.x as i64) as f64;
                if (x as f64) < x_cross {
                    inside = !inside;
                }
            }
        }
        inside
    }

    fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(OccupancyError::invalid_region("region id must not be empty").into());
        }
        if self.polygon.len() < 3 {
            return Err(OccupancyError::invalid_region(format!(
                "region '{}' needs at least 3 points, got {}",
                self.id,
                self.polygon.len()
            ))
            .into());
        }
        let n = self.polygon.len();
        for i in 0..n {
            if self.polygon[i] == self.polygon[(i + 1) % n] {
                return Err(OccupancyError::invalid_region(format!(
                    "region '{}' repeats vertex ({}, {})",
                    self.id, self.polygon[i].x, self.polygon[i].y
                ))
                .into());
            }
        }
        if self.doubled_area() == 0 {
            return Err(OccupancyError::invalid_region(format!(
                "region '{}' encloses zero area",
                self.id
            ))
            .into());
        }
        if self.is_self_intersecting() {
            return Err(OccupancyError::invalid_region(format!(
                "region '{}' polygon intersects itself",
                self.id
            ))
            .into());
        }
        Ok(())
    }

    fn is_self_intersecting(&self) -> bool {
        let n = self.polygon.len();
        for i in 0..n {
            let (a1, a2) = (self.polygon[i], self.polygon[(i + 1) % n]);
            for j in (i + 1)..n {
                // Adjacent edges share a vertex by construction.
                if j == i + 1 || (i == 0 && j == n - 1) {
                    continue;
                }
                let (b1, b2) = (self.polygon[j], self.polygon[(j + 1) % n]);
                if segments_intersect(a1, a2, b1, b2) {
                    return true;
                }
            }
        }
        false
    }
}

/// Differences span up to 2^33, so the products need 128 bits.
fn cross(o: Point, a: Point, b: Point) -> i128 {
    (a.x as i128 - o.x as i128) * (b.y as i128 - o.y as i128)
        - (a.y as i128 - o.y as i128) * (b.x as i128 - o.x as i128)
}

fn on_segment(a: Point, b: Point, p: Point) -> bool {
    cross(a, b, p) == 0
        && p.x >= a.x.min(b.x)
        && p.x <= a.x.max(b.x)
        && p.y >= a.y.min(b.y)
        && p.y <= a.y.max(b.y)
}

fn segments_intersect(a1: Point, a2: Point, b1: Point, b2: Point) -> bool {
    let d1 = cross(b1, b2, a1).signum();
    let d2 = cross(b1, b2, a2).signum();
    let d3 = cross(a1, a2, b1).signum();
    let d4 = cross(a1, a2, b2).signum();
    if d1 * d2 < 0 && d3 * d4 < 0 {
        return true;
    }
    (d1 == 0 && on_segment(b1, b2, a1))
        || (d2 == 0 && on_segment(b1, b2, a2))
        || (d3 == 0 && on_segment(a1, a2, b1))
        || (d4 == 0 && on_segment(a1, a2, b2))
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegionFile {
    #[serde(default)]
    slots: Vec<RegionEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RegionEntry {
    id: String,
    polygon: Vec<Point>,
}

/// Ordered, validated set of regions for one image.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RegionModel {
    regions: Vec<Region>,
}

impl RegionModel {
    pub fn new(regions: Vec<Region>) -> Result<Self> {
        {
            let mut seen = HashSet::new();
            for region in &regions {
                if !seen.insert(region.id.as_str()) {
                    return Err(OccupancyError::invalid_region(format!(
                        "duplicate region id '{}'",
                        region.id
                    ))
                    .into());
                }
            }
        }
        Ok(Self { regions })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Region> {
        self.regions.iter()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Region> {
        self.regions.iter().find(|r| r.id == id)
    }

    /// New model with `region` appended.
    pub fn with_region(&self, region: Region) -> Result<Self> {
        let mut regions = self.regions.clone();
        regions.push(region);
        Self::new(regions)
    }

    /// New model without the region called `id`.
    pub fn without_region(&self, id: &str) -> Result<Self> {
        if self.get(id).is_none() {
            return Err(anyhow!("no region with id '{}'", id));
        }
        Ok(Self {
            regions: self
                .regions
                .iter()
                .filter(|r| r.id != id)
                .cloned()
                .collect(),
        })
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let file: RegionFile = serde_json::from_str(raw).context("invalid region file")?;
        let regions = file
            .slots
            .into_iter()
            .map(|entry| Region::new(entry.id, entry.polygon))
            .collect::<Result<Vec<_>>>()?;
        Self::new(regions)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        let file = RegionFile {
            slots: self
                .regions
                .iter()
                .map(|r| RegionEntry {
                    id: r.id.clone(),
                    polygon: r.polygon.clone(),
                })
                .collect(),
        };
        Ok(serde_json::to_string_pretty(&file)?)
    }

    /// Load a region file. A missing file is an empty model.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::warn!(
                    "region file {} not found; using an empty region model",
                    path.display()
                );
                return Ok(Self::empty());
            }
            Err(e) => {
                return Err(anyhow!(
                    "failed to read region file {}: {}",
                    path.display(),
                    e
                ))
            }
        };
        Self::from_json(&raw).with_context(|| format!("region file {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = self.to_json_pretty()?;
        std::fs::write(path, format!("{json}\n"))
            .map_err(|e| anyhow!("failed to write region file {}: {}", path.display(), e))
    }
}

impl<'a> IntoIterator for &'a RegionModel {
    type Item = &'a Region;
    type IntoIter = std::slice::Iter<'a, Region>;

    fn into_iter(self) -> Self::IntoIter {
        self.regions.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{error_kind, ErrorKind};

    fn square(id: &str, x0: i32, y0: i32, side: i32) -> Region {
        Region::new(
            id,
            vec![
                Point::new(x0, y0),
                Point::new(x0 + side, y0),
                Point::new(x0 + side, y0 + side),
                Point::new(x0, y0 + side),
            ],
        )
        .unwrap()
    }

    #[test]
    fn two_point_region_is_invalid() {
        let err = Region::new("A", vec![Point::new(0, 0), Point::new(5, 5)]).unwrap_err();
        assert_eq!(error_kind(&err), Some(ErrorKind::InvalidRegion));
    }

    #[test]
    fn collinear_region_is_invalid() {
        let err = Region::new(
            "line",
            vec![Point::new(0, 0), Point::new(5, 5), Point::new(10, 10)],
        )
        .unwrap_err();
        assert_eq!(error_kind(&err), Some(ErrorKind::InvalidRegion));
    }

    #[test]
    fn bowtie_region_is_invalid() {
        let err = Region::new(
            "bowtie",
            vec![
                Point::new(0, 0),
                Point::new(10, 10),
                Point::new(10, 0),
                Point::new(0, 10),
            ],
        )
        .unwrap_err();
        assert_eq!(error_kind(&err), Some(ErrorKind::InvalidRegion));
    }

    #[test]
    fn empty_id_is_invalid() {
        let err = Region::new(
            "  ",
            vec![Point::new(0, 0), Point::new(4, 0), Point::new(0, 4)],
        )
        .unwrap_err();
        assert_eq!(error_kind(&err), Some(ErrorKind::InvalidRegion));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let err = RegionModel::new(vec![square("A", 0, 0, 4), square("A", 10, 10, 4)])
            .unwrap_err();
        assert_eq!(error_kind(&err), Some(ErrorKind::InvalidRegion));
    }

    #[test]
    fn contains_is_inclusive_of_boundary() {
        let r = square("A", 0, 0, 10);
        assert!(r.contains(0, 0));
        assert!(r.contains(10, 5));
        assert!(r.contains(5, 5));
        assert!(!r.contains(11, 5));
        assert!(!r.contains(-1, 0));
    }

    #[test]
    fn contains_handles_vertices_at_the_coordinate_limits() {
        let r = Region::new(
            "wide",
            vec![
                Point::new(-2_000_000_000, 0),
                Point::new(2_000_000_000, 5),
                Point::new(0, 10),
            ],
        )
        .unwrap();
        assert!(r.doubled_area() != 0);
        assert!(r.contains(0, 5));
        assert!(!r.contains(0, 11));
        assert!(!r.contains(0, -1));

        let huge = Region::new(
            "huge",
            vec![
                Point::new(i32::MIN, i32::MIN),
                Point::new(i32::MAX, i32::MIN),
                Point::new(i32::MAX, i32::MAX),
                Point::new(i32::MIN, i32::MAX),
            ],
        )
        .unwrap();
        assert!(huge.contains(0, 0));
        assert!(huge.contains(i32::MAX, 0));
    }

    #[test]
    fn centroid_truncates() {
        let r = Region::new(
            "tri",
            vec![Point::new(0, 0), Point::new(5, 0), Point::new(0, 5)],
        )
        .unwrap();
        assert_eq!(r.centroid(), Point::new(1, 1));
    }

    #[test]
    fn parses_slots_file_format() {
        let model = RegionModel::from_json(
            r#"{"slots":[{"id":"L1","polygon":[[0,0],[10,0],[10,10],[0,10]]}]}"#,
        )
        .unwrap();
        assert_eq!(model.len(), 1);
        assert_eq!(model.regions()[0].id(), "L1");
        assert_eq!(model.regions()[0].polygon()[2], Point::new(10, 10));

        let round = RegionModel::from_json(&model.to_json_pretty().unwrap()).unwrap();
        assert_eq!(round, model);
    }

    #[test]
    fn invalid_polygon_in_file_is_reported() {
        let err = RegionModel::from_json(r#"{"slots":[{"id":"L1","polygon":[[0,0],[10,0]]}]}"#)
            .unwrap_err();
        assert_eq!(error_kind(&err), Some(ErrorKind::InvalidRegion));
    }

    #[test]
    fn missing_file_loads_empty_model() {
        let dir = tempfile::tempdir().unwrap();
        let model = RegionModel::load(&dir.path().join("slots.json")).unwrap();
        assert!(model.is_empty());
    }

    #[test]
    fn parses_point_arguments() {
        assert_eq!("10,20".parse::<Point>().unwrap(), Point::new(10, 20));
        assert_eq!(" [3, -4] ".parse::<Point>().unwrap(), Point::new(3, -4));
        assert_eq!("640x480".parse::<Point>().unwrap(), Point::new(640, 480));
        assert!("10".parse::<Point>().is_err());
        assert!("a,b".parse::<Point>().is_err());
        assert!("99999999999,1".parse::<Point>().is_err());
    }

    #[test]
    fn add_and_remove_regions() {
        let model = RegionModel::empty()
            .with_region(square("A", 0, 0, 4))
            .unwrap()
            .with_region(square("B", 10, 0, 4))
            .unwrap();
        assert_eq!(model.len(), 2);
        let model = model.without_region("A").unwrap();
        assert_eq!(model.len(), 1);
        assert!(model.get("B").is_some());
        assert!(model.without_region("A").is_err());
    }
}

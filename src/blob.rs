// blob.rs — Contours → per-frame blob candidates.
//
// For each contour:
//
//   position = mean of the contour points
//   area     = (max_x − min_x) · (max_y − min_y)
//
// The area is the bounding-box footprint, not the polygon area. It only
// has to rank blobs against each other and reject specks, and it costs one
// pass over the points. Candidates with `area <= min_area` are dropped.

use std::ops::{Add, AddAssign, Mul, Sub};

use crate::config::DetectorConfig;
use crate::contour::Contour;

/// 2D vector in pixel units (y down).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    #[inline]
    pub const fn new(x: f32, y: f32) -> Self {
        Vec2 { x, y }
    }

    #[inline]
    pub fn length_squared(self) -> f32 {
        self.x * self.x + self.y * self.y
    }

    #[inline]
    pub fn length(self) -> f32 {
        self.length_squared().sqrt()
    }

    #[inline]
    pub fn distance_squared(self, other: Vec2) -> f32 {
        (self - other).length_squared()
    }
}

impl Add for Vec2 {
    type Output = Vec2;
    #[inline]
    fn add(self, o: Vec2) -> Vec2 {
        Vec2::new(self.x + o.x, self.y + o.y)
    }
}

impl AddAssign for Vec2 {
    #[inline]
    fn add_assign(&mut self, o: Vec2) {
        self.x += o.x;
        self.y += o.y;
    }
}

impl Sub for Vec2 {
    type Output = Vec2;
    #[inline]
    fn sub(self, o: Vec2) -> Vec2 {
        Vec2::new(self.x - o.x, self.y - o.y)
    }
}

impl Mul<f32> for Vec2 {
    type Output = Vec2;
    #[inline]
    fn mul(self, s: f32) -> Vec2 {
        Vec2::new(self.x * s, self.y * s)
    }
}

/// A blob seen in the current frame only.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    /// Centroid of the contour points.
    pub position: Vec2,
    /// Bounding-box footprint `dx · dy`.
    pub area: i64,
}

impl Candidate {
    pub fn new(x: f32, y: f32, area: i64) -> Self {
        Candidate { position: Vec2::new(x, y), area }
    }

    /// Centroid and bounding-box area of a contour. `None` for an empty
    /// contour.
    pub fn from_contour(contour: &Contour) -> Option<Self> {
        let first = contour.points.first()?;
        let (mut min_x, mut max_x, mut min_y, mut max_y) = (first.x, first.x, first.y, first.y);
        let mut sum = Vec2::ZERO;
        for p in &contour.points {
            sum += Vec2::new(p.x as f32, p.y as f32);
            min_x = min_x.min(p.x);
            max_x = max_x.max(p.x);
            min_y = min_y.min(p.y);
            max_y = max_y.max(p.y);
        }
        let n = contour.points.len() as f32;
        let area = (max_x - min_x) as i64 * (max_y - min_y) as i64;
        Some(Candidate { position: sum * (1.0 / n), area })
    }
}

/// Size filter from contours to candidates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlobDetector {
    min_area: i64,
}

impl Default for BlobDetector {
    fn default() -> Self {
        Self::from_config(&DetectorConfig::default())
    }
}

impl BlobDetector {
    pub fn new(min_area: i64) -> Self {
        BlobDetector { min_area }
    }

    pub fn from_config(config: &DetectorConfig) -> Self {
        Self::new(config.min_area)
    }

    pub fn min_area(&self) -> i64 {
        self.min_area
    }

    pub fn detect(&self, contours: &[Contour]) -> Vec<Candidate> {
        let mut out = Vec::new();
        self.detect_into(contours, &mut out);
        out
    }

    /// Clears `out` and fills it with this frame's candidates, in contour
    /// order.
    pub fn detect_into(&self, contours: &[Contour], out: &mut Vec<Candidate>) {
        out.clear();
        out.extend(
            contours
                .iter()
                .filter_map(Candidate::from_contour)
                .filter(|c| c.area > self.min_area),
        );
    }
}

// contour.rs — Closed contours from a binary mask.
//
// Contour extraction sits between the readback and the blob detector. The
// pipeline only depends on the `ContourSource` trait; `OuterContours` is the
// default implementation, built on imageproc's border following
// (Suzuki–Abe). It keeps outer borders that have no parent, i.e. one
// contour per connected foreground region, holes and nested regions
// ignored.
//
// Border following emits every boundary pixel. By default runs of
// identical steps are collapsed to their end points (a straight edge keeps
// only its two corners). The blob detector's centroid is the mean of these
// compressed points.

use image::GrayImage;
use imageproc::contours::{find_contours, BorderType};

use crate::image::Image;

/// Integer pixel coordinate on a contour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContourPoint {
    pub x: i32,
    pub y: i32,
}

impl ContourPoint {
    #[inline]
    pub const fn new(x: i32, y: i32) -> Self {
        ContourPoint { x, y }
    }
}

/// Ordered, implicitly closed point list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Contour {
    pub points: Vec<ContourPoint>,
}

impl Contour {
    pub fn new(points: Vec<ContourPoint>) -> Self {
        Contour { points }
    }

    /// Build from `(x, y)` pairs.
    pub fn from_xy(points: &[(i32, i32)]) -> Self {
        Contour { points: points.iter().map(|&(x, y)| ContourPoint::new(x, y)).collect() }
    }

    /// Axis-aligned rectangle outline with corners (x0, y0) and (x1, y1).
    pub fn rect(x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
        Self::from_xy(&[(x0, y0), (x1, y0), (x1, y1), (x0, y1)])
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Drop every point whose incoming and outgoing steps are equal, so
    /// straight runs keep only their end points. The contour is treated as
    /// closed.
    pub fn simplify(&mut self) {
        let n = self.points.len();
        if n < 3 {
            return;
        }
        let step = |a: ContourPoint, b: ContourPoint| (b.x - a.x, b.y - a.y);
        let pts = &self.points;
        let keep: Vec<ContourPoint> = (0..n)
            .filter(|&i| {
                let prev = pts[(i + n - 1) % n];
                let next = pts[(i + 1) % n];
                step(prev, pts[i]) != step(pts[i], next)
            })
            .map(|i| pts[i])
            .collect();
        if !keep.is_empty() {
            self.points = keep;
        }
    }
}

/// Anything that turns a binary mask (0 = background, non-zero =
/// foreground) into closed contours.
pub trait ContourSource {
    fn find_contours(&mut self, mask: &Image<u8>) -> Vec<Contour>;
}

/// External contours via imageproc.
#[derive(Debug, Clone, Copy)]
pub struct OuterContours {
    simplify: bool,
}

impl Default for OuterContours {
    fn default() -> Self {
        OuterContours { simplify: true }
    }
}

impl OuterContours {
    /// Collapsed straight runs (the default).
    pub fn new() -> Self {
        Self::default()
    }

    /// Every boundary pixel, no simplification.
    pub fn dense() -> Self {
        OuterContours { simplify: false }
    }
}

impl ContourSource for OuterContours {
    fn find_contours(&mut self, mask: &Image<u8>) -> Vec<Contour> {
        let Some(gray) = GrayImage::from_raw(
            mask.width() as u32,
            mask.height() as u32,
            mask.as_slice().to_vec(),
        ) else {
            return Vec::new();
        };

        find_contours::<i32>(&gray)
            .into_iter()
            .filter(|c| matches!(c.border_type, BorderType::Outer) && c.parent.is_none())
            .map(|c| {
                let mut contour = Contour {
                    points: c.points.iter().map(|p| ContourPoint::new(p.x, p.y)).collect(),
                };
                if self.simplify {
                    contour.simplify();
                }
                contour
            })
            .collect()
    }
}

/// Any closure over a mask is a contour source. Handy in tests.
impl<F> ContourSource for F
where
    F: FnMut(&Image<u8>) -> Vec<Contour>,
{
    fn find_contours(&mut self, mask: &Image<u8>) -> Vec<Contour> {
        self(mask)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paint(mask: &mut Image<u8>, x0: usize, y0: usize, x1: usize, y1: usize) {
        for y in y0..=y1 {
            for x in x0..=x1 {
                mask.set(x, y, 255);
            }
        }
    }

    fn bounds(c: &Contour) -> (i32, i32, i32, i32) {
        let xs = c.points.iter().map(|p| p.x);
        let ys = c.points.iter().map(|p| p.y);
        (
            xs.clone().min().unwrap(),
            ys.clone().min().unwrap(),
            xs.max().unwrap(),
            ys.max().unwrap(),
        )
    }

    #[test]
    fn test_empty_mask_has_no_contours() {
        let mask: Image<u8> = Image::new(16, 16);
        assert!(OuterContours::new().find_contours(&mask).is_empty());
    }

    #[test]
    fn test_two_regions_two_contours() {
        let mut mask: Image<u8> = Image::new(40, 30);
        paint(&mut mask, 2, 3, 11, 9);
        paint(&mut mask, 20, 15, 35, 25);
        let mut found: Vec<_> =
            OuterContours::dense().find_contours(&mask).iter().map(bounds).collect();
        found.sort();
        assert_eq!(found, vec![(2, 3, 11, 9), (20, 15, 35, 25)]);
    }

    #[test]
    fn test_holes_and_islands_are_ignored() {
        let mut mask: Image<u8> = Image::new(30, 30);
        paint(&mut mask, 2, 2, 27, 27);
        // Punch a hole and put an island inside it.
        for y in 8..=21 {
            for x in 8..=21 {
                mask.set(x, y, 0);
            }
        }
        paint(&mut mask, 13, 13, 16, 16);

        let found = OuterContours::new().find_contours(&mask);
        assert_eq!(found.len(), 1);
        assert_eq!(bounds(&found[0]), (2, 2, 27, 27));
    }

    #[test]
    fn test_simplify_keeps_corners() {
        let mut c = Contour::from_xy(&[
            (0, 0), (1, 0), (2, 0), (3, 0),
            (3, 1), (3, 2),
            (2, 2), (1, 2), (0, 2),
            (0, 1),
        ]);
        c.simplify();
        assert_eq!(c, Contour::rect(0, 0, 3, 2));
    }

    #[test]
    fn test_simplified_contour_has_same_bounds() {
        let mut mask: Image<u8> = Image::new(32, 32);
        paint(&mut mask, 4, 6, 20, 25);
        let dense = OuterContours::dense().find_contours(&mask);
        let simple = OuterContours::new().find_contours(&mask);
        assert_eq!(dense.len(), 1);
        assert_eq!(simple.len(), 1);
        assert!(simple[0].len() < dense[0].len());
        assert_eq!(bounds(&simple[0]), bounds(&dense[0]));
    }

    #[test]
    fn test_closure_source() {
        let mut calls = 0;
        let mut source = |_: &Image<u8>| {
            calls += 1;
            vec![Contour::rect(0, 0, 4, 4)]
        };
        let mask: Image<u8> = Image::new(8, 8);
        assert_eq!(source.find_contours(&mask).len(), 1);
        drop(source);
        assert_eq!(calls, 1);
    }
}

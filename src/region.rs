//! Pixman-style damage regions
//!
//! A `Region` is a union of disjoint axis-aligned rectangles in output
//! pixels. The rectangle list is kept disjoint by construction: adding a
//! rect first carves it out of every stored rect, then stores it whole.
//! That makes union idempotent and keeps enumeration cheap for scissored
//! clears.

use crate::geometry::Rect;

/// Union of disjoint rectangles
#[derive(Debug, Clone, Default)]
pub struct Region {
    rects: Vec<Rect>,
}

/// Parts of `a` not covered by `b`, as up to four band rects
fn subtract_rect(a: &Rect, b: &Rect) -> Vec<Rect> {
    let Some(overlap) = a.intersection(b) else {
        return vec![*a];
    };

    let mut out = Vec::with_capacity(4);

    // band above the overlap
    if overlap.y > a.y {
        out.push(Rect::new(a.x, a.y, a.width, overlap.y - a.y));
    }
    // band below
    if overlap.y2() < a.y2() {
        out.push(Rect::new(a.x, overlap.y2(), a.width, a.y2() - overlap.y2()));
    }
    // left and right slivers, limited to the overlap's rows
    if overlap.x > a.x {
        out.push(Rect::new(a.x, overlap.y, overlap.x - a.x, overlap.height));
    }
    if overlap.x2() < a.x2() {
        out.push(Rect::new(
            overlap.x2(),
            overlap.y,
            a.x2() - overlap.x2(),
            overlap.height,
        ));
    }

    out
}

impl Region {
    pub fn new() -> Self {
        Self { rects: Vec::new() }
    }

    pub fn from_rect(rect: Rect) -> Self {
        let mut region = Self::new();
        region.add_rect(&rect);
        region
    }

    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    pub fn clear(&mut self) {
        self.rects.clear();
    }

    /// The disjoint rectangles making up this region
    pub fn rects(&self) -> &[Rect] {
        &self.rects
    }

    /// Union a single rect into the region
    pub fn add_rect(&mut self, rect: &Rect) {
        if rect.is_empty() {
            return;
        }

        let mut next = Vec::with_capacity(self.rects.len() + 1);
        for r in &self.rects {
            next.extend(subtract_rect(r, rect));
        }
        next.push(*rect);
        self.rects = next;
    }

    /// Union another region into this one
    pub fn add_region(&mut self, other: &Region) {
        for r in &other.rects {
            self.add_rect(r);
        }
    }

    /// Keep only the parts inside `rect`
    pub fn intersect_rect(&mut self, rect: &Rect) {
        self.rects = self
            .rects
            .iter()
            .filter_map(|r| r.intersection(rect))
            .collect();
    }

    /// Keep only the parts inside `other`
    pub fn intersect_region(&mut self, other: &Region) {
        let mut next = Vec::new();
        for r in &self.rects {
            for o in &other.rects {
                if let Some(overlap) = r.intersection(o) {
                    next.push(overlap);
                }
            }
        }
        self.rects = next;
    }

    /// Remove the parts inside `rect`
    pub fn subtract_rect(&mut self, rect: &Rect) {
        if rect.is_empty() {
            return;
        }

        let mut next = Vec::new();
        for r in &self.rects {
            next.extend(subtract_rect(r, rect));
        }
        self.rects = next;
    }

    /// Remove the parts inside `other`
    pub fn subtract_region(&mut self, other: &Region) {
        for r in &other.rects {
            self.subtract_rect(r);
        }
    }

    pub fn translate(&mut self, dx: i32, dy: i32) {
        for r in &mut self.rects {
            r.x += dx;
            r.y += dy;
        }
    }

    /// Bounding box of the whole region
    pub fn extents(&self) -> Rect {
        let Some(first) = self.rects.first() else {
            return Rect::default();
        };

        let mut x1 = first.x;
        let mut y1 = first.y;
        let mut x2 = first.x2();
        let mut y2 = first.y2();
        for r in &self.rects[1..] {
            x1 = x1.min(r.x);
            y1 = y1.min(r.y);
            x2 = x2.max(r.x2());
            y2 = y2.max(r.y2());
        }

        Rect::new(x1, y1, x2 - x1, y2 - y1)
    }

    /// True if every pixel of `other` is also in this region
    pub fn covers(&self, other: &Region) -> bool {
        let mut rest = other.clone();
        rest.subtract_region(self);
        rest.is_empty()
    }

    /// Validity check: every stored rect has area and none overlap
    pub fn selfcheck(&self) -> bool {
        for (i, a) in self.rects.iter().enumerate() {
            if a.is_empty() {
                return false;
            }
            for b in &self.rects[i + 1..] {
                if a.intersects(b) {
                    return false;
                }
            }
        }
        true
    }

    /// Total covered area in pixels
    pub fn area(&self) -> i64 {
        self.rects
            .iter()
            .map(|r| r.width as i64 * r.height as i64)
            .sum()
    }
}

impl PartialEq for Region {
    /// Coverage equality, independent of how either side is banded
    fn eq(&self, other: &Self) -> bool {
        self.covers(other) && other.covers(self)
    }
}

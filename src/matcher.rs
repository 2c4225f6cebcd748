// matcher.rs — Frame-to-frame blob association and lifecycle.
//
// Each update takes this frame's candidates and the tracked set:
//
//   1. Clear every tracked blob's `matched` flag.
//   2. For each candidate i, score every tracked blob j and sort the list
//      ascending by cost (squared centroid distance). Ties keep ascending j.
//   3. Greedy pass in candidate order: walk the candidate's list past blobs
//      already claimed this pass and stop at the first free one. Claim it
//      if cost < max_cost, otherwise the candidate goes unmatched. Lists
//      are sorted, so nothing further down could pass the cost test.
//   4. Unmatched candidates become new blobs (age 0, matched).
//   5. Matched blobs take the candidate's position and area, age += 1,
//      extend the trail once age > trail_start_age, re-estimate direction.
//   6. Blobs still unmatched age −= 1 and are evicted once age < eviction_age.
//
// This is not a minimum-cost assignment. Two candidates whose best blob is
// the same: the lower index wins it and the other falls back to its next
// free blob, even when swapping the pair would lower the total cost.
//
// AGE
// ───
// Age is a signed confidence counter rather than a frame count. It climbs
// while a blob keeps being matched and falls while it is missing. A blob
// matched for 10 frames survives 61 missed frames: 10 → −51 is evicted.
//
// The matched flags double as the "already claimed" bitmap during the
// greedy pass, indexed by tracked position, so the claim check is O(1).

use std::collections::VecDeque;

use tracing::{debug, trace};

use crate::blob::{Candidate, Vec2};
use crate::config::MatcherConfig;

/// A tracked entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Blob {
    /// Unique within one matcher, starting at 1. Never reused.
    pub id: u64,
    pub position: Vec2,
    pub area: i64,
    /// Signed confidence counter. See the module notes.
    pub age: i32,
    /// `true` if a candidate refreshed (or created) this blob this frame.
    pub matched: bool,
    /// Exponentially smoothed heading, roughly unit length once settled.
    pub direction: Vec2,
    /// Recent positions, oldest first.
    pub trail: VecDeque<Vec2>,
}

impl Blob {
    fn spawn(id: u64, candidate: &Candidate) -> Self {
        Blob {
            id,
            position: candidate.position,
            area: candidate.area,
            age: 0,
            matched: true,
            direction: Vec2::ZERO,
            trail: VecDeque::new(),
        }
    }

    /// Seen this frame.
    #[inline]
    pub fn is_visible(&self) -> bool {
        self.matched
    }

    /// Trail holds at least `min_len` positions.
    #[inline]
    pub fn has_trail(&self, min_len: usize) -> bool {
        self.trail.len() >= min_len
    }

    fn refresh(&mut self, candidate: &Candidate, config: &MatcherConfig) {
        self.position = candidate.position;
        self.area = candidate.area;
        self.age += 1;
        self.matched = true;

        if self.age > config.trail_start_age {
            self.trail.push_back(self.position);
        }
        while self.trail.len() > config.trail_cap {
            self.trail.pop_front();
        }

        self.update_direction(config.direction_segments, config.direction_smoothing);
    }

    /// Blend the heading of the last few trail segments into `direction`.
    /// Needs at least three trail points; shorter trails leave it as is.
    fn update_direction(&mut self, segments: usize, smoothing: f32) {
        let n = self.trail.len();
        if n < 3 {
            return;
        }

        let mut sample = Vec2::ZERO;
        for i in (1..n).rev().take(segments) {
            sample += self.trail[i] - self.trail[i - 1];
        }

        let len = sample.length();
        let unit = if len.is_finite() && len > 0.0 { sample * (1.0 / len) } else { Vec2::ZERO };

        self.direction = self.direction * smoothing + unit * (1.0 - smoothing);
    }
}

/// Score of one candidate/tracked pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Similarity {
    pub candidate: usize,
    pub tracked: usize,
    pub position_dist_sq: f32,
    /// Computed for diagnostics; not part of `cost`.
    pub area_dist_sq: i64,
    /// Ordering and acceptance key.
    pub cost: f32,
}

impl Similarity {
    pub fn new(candidate: usize, c: &Candidate, tracked: usize, b: &Blob) -> Self {
        let position_dist_sq = c.position.distance_squared(b.position);
        let da = b.area - c.area;
        Similarity {
            candidate,
            tracked,
            position_dist_sq,
            area_dist_sq: da.saturating_mul(da),
            cost: position_dist_sq,
        }
    }
}

/// What one update did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchStats {
    /// Candidates offered this frame.
    pub candidates: usize,
    /// Candidates assigned to an existing blob.
    pub matched: usize,
    /// New blobs spawned from unmatched candidates.
    pub created: usize,
    /// Existing blobs that went unmatched and lost age.
    pub aged: usize,
    /// Blobs removed this frame.
    pub evicted: usize,
    /// Blobs tracked after the update.
    pub tracked: usize,
}

/// Owns the tracked set. Callers only ever see it through `blobs()`.
pub struct BlobMatcher {
    config: MatcherConfig,
    blobs: Vec<Blob>,
    next_id: u64,
    /// Per-candidate sorted cost lists, kept for inspection and reused.
    similarities: Vec<Vec<Similarity>>,
    /// Tracked index claimed by each candidate.
    assignments: Vec<Option<usize>>,
}

impl Default for BlobMatcher {
    fn default() -> Self {
        Self::new(MatcherConfig::default())
    }
}

impl BlobMatcher {
    pub fn new(config: MatcherConfig) -> Self {
        BlobMatcher {
            config,
            blobs: Vec::new(),
            next_id: 1,
            similarities: Vec::new(),
            assignments: Vec::new(),
        }
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    /// Current tracked set, in creation order.
    pub fn blobs(&self) -> &[Blob] {
        &self.blobs
    }

    /// Sorted cost lists from the last update, one per candidate.
    pub fn similarities(&self) -> &[Vec<Similarity>] {
        &self.similarities
    }

    /// Tracked index each candidate was assigned to in the last update,
    /// before new blobs were appended.
    pub fn assignments(&self) -> &[Option<usize>] {
        &self.assignments
    }

    /// Drop every tracked blob. Ids keep counting up.
    pub fn clear(&mut self) {
        self.blobs.clear();
        self.similarities.clear();
        self.assignments.clear();
    }

    /// Run one association step.
    pub fn update(&mut self, candidates: &[Candidate]) -> MatchStats {
        let mut stats = MatchStats { candidates: candidates.len(), ..Default::default() };

        for blob in &mut self.blobs {
            blob.matched = false;
        }

        self.score(candidates);
        self.claim();

        // Spawn and refresh in candidate order. Spawned blobs are appended,
        // so the tracked indices in `assignments` stay valid.
        for (candidate, assignment) in candidates.iter().zip(&self.assignments) {
            match *assignment {
                Some(j) => {
                    self.blobs[j].refresh(candidate, &self.config);
                    stats.matched += 1;
                }
                None => {
                    let id = self.next_id;
                    self.next_id += 1;
                    debug!(id, x = candidate.position.x, y = candidate.position.y, area = candidate.area, "blob created");
                    self.blobs.push(Blob::spawn(id, candidate));
                    stats.created += 1;
                }
            }
        }

        let eviction_age = self.config.eviction_age;
        for blob in &mut self.blobs {
            if !blob.matched {
                blob.age -= 1;
                stats.aged += 1;
            }
        }
        let before = self.blobs.len();
        self.blobs.retain(|b| {
            let keep = b.age >= eviction_age;
            if !keep {
                debug!(id = b.id, "blob evicted");
            }
            keep
        });
        stats.evicted = before - self.blobs.len();
        stats.tracked = self.blobs.len();

        trace!(?stats, "matcher update");
        stats
    }

    fn score(&mut self, candidates: &[Candidate]) {
        self.similarities.resize_with(candidates.len(), Vec::new);
        for (i, (candidate, list)) in candidates.iter().zip(&mut self.similarities).enumerate() {
            list.clear();
            list.extend(self.blobs.iter().enumerate().map(|(j, b)| Similarity::new(i, candidate, j, b)));
            // Stable: equal costs stay in ascending tracked order.
            list.sort_by(|a, b| a.cost.total_cmp(&b.cost));
        }
    }

    fn claim(&mut self) {
        self.assignments.clear();
        for list in &self.similarities {
            let free = list.iter().find(|s| !self.blobs[s.tracked].matched);
            let assignment = free.filter(|s| s.cost < self.config.max_cost).map(|s| {
                self.blobs[s.tracked].matched = true;
                s.tracked
            });
            self.assignments.push(assignment);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn cand(x: f32, y: f32) -> Candidate {
        Candidate::new(x, y, 200)
    }

    #[test]
    fn test_first_frame_spawns_everything() {
        let mut m = BlobMatcher::default();
        let stats = m.update(&[cand(10.0, 10.0), cand(100.0, 100.0)]);
        assert_eq!(stats.created, 2);
        assert_eq!(stats.matched, 0);
        assert_eq!(stats.aged, 0);
        let ids: Vec<u64> = m.blobs().iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert!(m.blobs().iter().all(|b| b.age == 0 && b.matched && b.trail.is_empty()));
    }

    #[test]
    fn test_close_candidate_matches() {
        let mut m = BlobMatcher::default();
        m.update(&[cand(10.0, 10.0)]);
        let stats = m.update(&[Candidate::new(12.0, 11.0, 205)]);
        assert_eq!(stats.matched, 1);
        let b = &m.blobs()[0];
        assert_eq!((b.id, b.age, b.area), (1, 1, 205));
        assert_eq!(b.position, Vec2::new(12.0, 11.0));
    }

    #[test]
    fn test_cost_must_be_strictly_below_max() {
        let mut m = BlobMatcher::default();
        m.update(&[cand(0.0, 0.0)]);
        // 30² + 10² = 1000: rejected.
        let stats = m.update(&[cand(30.0, 10.0)]);
        assert_eq!(stats.matched, 0);
        assert_eq!(stats.created, 1);
        assert_eq!(m.blobs()[0].age, -1);
    }

    #[test]
    fn test_contested_blob_goes_to_lower_index_then_next_free() {
        let mut m = BlobMatcher::default();
        m.update(&[cand(0.0, 0.0), cand(20.0, 0.0)]);

        // Both candidates sit nearest to blob 0. Candidate 0 claims it,
        // candidate 1 moves on to blob 1 (cost 121).
        let stats = m.update(&[cand(1.0, 0.0), cand(9.0, 0.0)]);
        assert_eq!(m.assignments(), &[Some(0), Some(1)]);
        assert_eq!(stats.matched, 2);
        assert_eq!(stats.created, 0);
        assert_eq!(m.blobs().len(), 2);
        assert_eq!(m.blobs()[1].position, Vec2::new(9.0, 0.0));
        assert_eq!(m.similarities()[1][0].tracked, 0);
    }

    #[test]
    fn test_next_free_blob_must_still_pass_cost() {
        let mut m = BlobMatcher::default();
        m.update(&[cand(0.0, 0.0), cand(50.0, 0.0)]);

        // Candidate 1's next free blob is 41 px away: cost 1681, rejected.
        let stats = m.update(&[cand(1.0, 0.0), cand(9.0, 0.0)]);
        assert_eq!(m.assignments(), &[Some(0), None]);
        assert_eq!((stats.matched, stats.created), (1, 1));
        assert_eq!(m.blobs()[1].age, -1);
    }

    #[test]
    fn test_equal_costs_prefer_lower_tracked_index() {
        let mut m = BlobMatcher::default();
        m.update(&[cand(0.0, 0.0), cand(20.0, 0.0)]);

        // Equidistant from both blobs.
        m.update(&[cand(10.0, 0.0)]);
        let list = &m.similarities()[0];
        assert_eq!(list[0].cost, list[1].cost);
        assert_eq!((list[0].tracked, list[1].tracked), (0, 1));
        assert_eq!(m.assignments(), &[Some(0)]);
        assert_eq!(m.blobs()[0].position, Vec2::new(10.0, 0.0));
        assert_eq!(m.blobs()[1].age, -1);
    }

    #[test]
    fn test_similarity_lists_are_sorted_and_carry_area() {
        let mut m = BlobMatcher::default();
        m.update(&[Candidate::new(50.0, 0.0, 300), Candidate::new(0.0, 0.0, 100)]);
        m.update(&[Candidate::new(2.0, 0.0, 110)]);
        let list = &m.similarities()[0];
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].tracked, 1);
        assert_eq!(list[0].area_dist_sq, 100);
        assert_relative_eq!(list[0].cost, 4.0);
        assert!(list[0].cost <= list[1].cost);
    }

    #[test]
    fn test_trail_starts_after_age_threshold_and_is_capped() {
        let mut m = BlobMatcher::default();
        for i in 0..200 {
            m.update(&[cand(i as f32 * 0.5, 0.0)]);
            let b = &m.blobs()[0];
            assert!(b.trail.len() <= 55);
            if b.age <= 10 {
                assert!(b.trail.is_empty());
            }
        }
        let b = &m.blobs()[0];
        assert_eq!(b.age, 199);
        assert_eq!(b.trail.len(), 55);
        // Oldest entries were dropped from the front.
        assert_eq!(b.trail.back(), Some(&Vec2::new(99.5, 0.0)));
        assert_eq!(b.trail.front(), Some(&Vec2::new(72.5, 0.0)));
    }

    #[test]
    fn test_direction_converges_to_heading() {
        let mut m = BlobMatcher::default();
        for i in 0..300 {
            m.update(&[cand(0.0, i as f32)]);
        }
        let d = m.blobs()[0].direction;
        assert_relative_eq!(d.x, 0.0);
        assert_relative_eq!(d.y, 1.0, epsilon = 1e-3);
    }

    #[test]
    fn test_stationary_blob_keeps_zero_direction() {
        let mut m = BlobMatcher::default();
        for _ in 0..40 {
            m.update(&[cand(5.0, 5.0)]);
        }
        let b = &m.blobs()[0];
        assert!(b.trail.len() >= 3);
        assert_eq!(b.direction, Vec2::ZERO);
    }

    #[test]
    fn test_direction_needs_three_trail_points() {
        let mut blob = Blob::spawn(1, &cand(0.0, 0.0));
        blob.trail.extend([Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0)]);
        blob.update_direction(5, 0.9);
        assert_eq!(blob.direction, Vec2::ZERO);

        blob.trail.push_back(Vec2::new(2.0, 0.0));
        blob.update_direction(5, 0.9);
        assert_relative_eq!(blob.direction.x, 0.1);
    }

    #[test]
    fn test_direction_uses_recent_segments_only() {
        let mut blob = Blob::spawn(1, &cand(0.0, 0.0));
        // Six segments heading +y, then five heading +x.
        for y in 0..=6 {
            blob.trail.push_back(Vec2::new(0.0, y as f32));
        }
        for x in 1..=5 {
            blob.trail.push_back(Vec2::new(x as f32, 6.0));
        }
        blob.update_direction(5, 0.9);
        assert_relative_eq!(blob.direction.x, 0.1);
        assert_relative_eq!(blob.direction.y, 0.0);
    }

    #[test]
    fn test_unmatched_blob_evicted_below_bound() {
        let mut m = BlobMatcher::default();
        m.update(&[cand(0.0, 0.0)]);
        // Age 0 → −50 over 50 empty frames: still tracked.
        for _ in 0..50 {
            m.update(&[]);
        }
        assert_eq!(m.blobs()[0].age, -50);
        let stats = m.update(&[]);
        assert_eq!(stats.evicted, 1);
        assert!(m.blobs().is_empty());
    }

    #[test]
    fn test_ids_are_not_reused() {
        let mut m = BlobMatcher::default();
        m.update(&[cand(0.0, 0.0)]);
        m.clear();
        m.update(&[cand(0.0, 0.0)]);
        assert_eq!(m.blobs()[0].id, 2);
    }
}

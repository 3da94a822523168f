//! Edit distances over Unicode codepoints.
//!
//! [`EditRows`] computes the restricted Damerau-Levenshtein matrix
//! (insertions, deletions, substitutions and adjacent transpositions each
//! cost 1) one candidate codepoint at a time, which is what the fuzzy
//! matchers need while walking the automaton: a row can be pushed for each
//! step down and overwritten when the traversal backtracks.

use smallvec::SmallVec;

/// Incremental edit-distance matrix between a fixed query and a candidate
/// that grows and shrinks one codepoint at a time.
///
/// Row `j` holds the distances between every query prefix and the first `j`
/// candidate codepoints. Pushing row `j` discards every row above it, so a
/// depth-first walk can simply push at the depth it reached.
#[derive(Debug, Clone)]
pub struct EditRows {
    query: SmallVec<[u32; 32]>,
    width: usize,
    rows: Vec<u32>,
    candidate: Vec<u32>,
    /// `completion[j]`: minimum of `row[k][n]` over `k <= j`.
    completion: Vec<u32>,
    depth: usize,
}

impl EditRows {
    /// Matrix for `query`, given as codepoints.
    pub fn new(query: &[u32]) -> Self {
        let width = query.len() + 1;
        let rows: Vec<u32> = (0..width as u32).collect();
        EditRows {
            query: query.iter().copied().collect(),
            width,
            rows,
            candidate: vec![0],
            completion: vec![query.len() as u32],
            depth: 0,
        }
    }

    /// Number of query codepoints.
    pub fn query_len(&self) -> usize {
        self.query.len()
    }

    /// Depth of the last row pushed.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Compute row `depth` for candidate codepoint `c`; rows above `depth`
    /// are discarded.
    ///
    /// # Panics
    ///
    /// Panics if `depth` is 0 or more than one past the current depth.
    pub fn push(&mut self, depth: usize, c: u32) {
        assert!(depth >= 1 && depth <= self.depth + 1, "rows must be pushed in order");

        let w = self.width;
        self.rows.truncate(depth * w);
        self.rows.resize((depth + 1) * w, 0);
        self.candidate.truncate(depth);
        self.candidate.push(c);
        self.completion.truncate(depth);
        self.depth = depth;

        let (done, current) = self.rows.split_at_mut(depth * w);
        let prev = &done[(depth - 1) * w..];
        let two_ago = if depth >= 2 {
            Some(&done[(depth - 2) * w..(depth - 1) * w])
        } else {
            None
        };

        current[0] = depth as u32;
        for i in 1..w {
            let q = self.query[i - 1];
            let cost = u32::from(q != c);
            let mut best = (prev[i] + 1).min(current[i - 1] + 1).min(prev[i - 1] + cost);
            if let Some(two_ago) = two_ago {
                if i > 1 && q == self.candidate[depth - 1] && self.query[i - 2] == c {
                    best = best.min(two_ago[i - 2] + 1);
                }
            }
            current[i] = best;
        }

        let here = current[w - 1];
        let before = self.completion[depth - 1];
        self.completion.push(before.min(here));
    }

    fn row(&self, depth: usize) -> &[u32] {
        &self.rows[depth * self.width..(depth + 1) * self.width]
    }

    /// Distance between the whole query and the candidate at `depth`.
    pub fn distance(&self, depth: usize) -> u32 {
        self.row(depth)[self.width - 1]
    }

    /// Smallest entry of row `depth`: a lower bound on the distance of any
    /// extension of the candidate.
    pub fn min_in_row(&self, depth: usize) -> u32 {
        self.row(depth).iter().copied().min().unwrap_or(0)
    }

    /// Distance between the whole query and the closest prefix of the
    /// candidate at `depth`.
    pub fn completion_distance(&self, depth: usize) -> u32 {
        self.completion[depth]
    }
}

//! Pairing required inputs with available concepts.
//!
//! Both strategies take a compatibility list per required input (indices of
//! the available concepts that satisfy it) and return, when every required
//! input can be given a distinct concept, the chosen index for each.

use std::collections::VecDeque;

use crate::config::AssignmentStrategy;

impl AssignmentStrategy {
    pub fn assign(self, compatible: &[Vec<usize>], available: usize) -> Option<Vec<usize>> {
        match self {
            AssignmentStrategy::Greedy => greedy(compatible, available),
            AssignmentStrategy::Exact => hopcroft_karp(compatible, available),
        }
    }
}

/// First-match-wins, in input order.
pub fn greedy(compatible: &[Vec<usize>], available: usize) -> Option<Vec<usize>> {
    let mut used = vec![false; available];
    let mut chosen = Vec::with_capacity(compatible.len());
    for candidates in compatible {
        let pick = candidates.iter().copied().find(|&j| !used[j])?;
        used[pick] = true;
        chosen.push(pick);
    }
    Some(chosen)
}

/// Maximum bipartite matching; `Some` only if it covers every required input.
pub fn hopcroft_karp(compatible: &[Vec<usize>], available: usize) -> Option<Vec<usize>> {
    let matching = maximum_matching(compatible, available);
    matching.into_iter().collect()
}

const UNREACHED: usize = usize::MAX;

/// Hopcroft–Karp over `left` (required inputs) × `right` (available concepts).
pub fn maximum_matching(adj: &[Vec<usize>], right: usize) -> Vec<Option<usize>> {
    let mut state = Matching {
        adj,
        left: vec![None; adj.len()],
        right: vec![None; right],
        dist: vec![UNREACHED; adj.len()],
    };
    while state.layer() {
        for u in 0..adj.len() {
            if state.left[u].is_none() {
                state.augment(u);
            }
        }
    }
    state.left
}

struct Matching<'a> {
    adj: &'a [Vec<usize>],
    left: Vec<Option<usize>>,
    right: Vec<Option<usize>>,
    dist: Vec<usize>,
}

impl Matching<'_> {
    /// BFS from free left vertices; true if some augmenting path exists.
    fn layer(&mut self) -> bool {
        let mut queue = VecDeque::new();
        for (u, m) in self.left.iter().enumerate() {
            if m.is_none() {
                self.dist[u] = 0;
                queue.push_back(u);
            } else {
                self.dist[u] = UNREACHED;
            }
        }
        let adj = self.adj;
        let mut found = false;
        while let Some(u) = queue.pop_front() {
            for &v in &adj[u] {
                let owner = self.right[v];
                match owner {
                    None => found = true,
                    Some(w) if self.dist[w] == UNREACHED => {
                        self.dist[w] = self.dist[u] + 1;
                        queue.push_back(w);
                    }
                    Some(_) => {}
                }
            }
        }
        found
    }

    fn augment(&mut self, u: usize) -> bool {
        let adj = self.adj;
        for &v in &adj[u] {
            let owner = self.right[v];
            let free = match owner {
                None => true,
                Some(w) => self.dist[w] == self.dist[u] + 1 && self.augment(w),
            };
            if free {
                self.left[u] = Some(v);
                self.right[v] = Some(u);
                return true;
            }
        }
        self.dist[u] = UNREACHED;
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greedy_takes_first_free_candidate() {
        let compat = vec![vec![1, 0], vec![0, 1]];
        assert_eq!(greedy(&compat, 2), Some(vec![1, 0]));
    }

    #[test]
    fn greedy_misses_assignment_exact_finds() {
        // r0 could use a0 or a1, r1 only a0; greedy gives a0 to r0.
        let compat = vec![vec![0, 1], vec![0]];
        assert_eq!(greedy(&compat, 2), None);
        assert_eq!(hopcroft_karp(&compat, 2), Some(vec![1, 0]));
    }

    #[test]
    fn both_fail_without_enough_distinct_concepts() {
        let compat = vec![vec![0], vec![0]];
        assert_eq!(AssignmentStrategy::Greedy.assign(&compat, 1), None);
        assert_eq!(AssignmentStrategy::Exact.assign(&compat, 1), None);
    }

    #[test]
    fn empty_requirements_are_trivially_satisfied() {
        assert_eq!(greedy(&[], 0), Some(vec![]));
        assert_eq!(hopcroft_karp(&[], 3), Some(vec![]));
    }

    #[test]
    fn maximum_matching_needs_long_augmenting_paths() {
        let compat = vec![vec![0, 1], vec![1, 2], vec![0]];
        let m = maximum_matching(&compat, 3);
        assert!(m.iter().all(Option::is_some));
        let mut used: Vec<usize> = m.into_iter().flatten().collect();
        used.sort_unstable();
        used.dedup();
        assert_eq!(used.len(), 3);
    }
}

// src/build/shape.rs

//! Tree-size optimizer
//!
//! Given the number of data chunks `n` and the pointers `p` that fit in
//! one manifest packet, choose the per-node split between direct pointers
//! `d` and indirect pointers `m` (with `d + m = p`) that minimizes wasted
//! pointer capacity. The optimizer runs once per build; its result is
//! immutable input to the tree builder.
//!
//! Capacity of a tree with `k` internal nodes is
//! `N(k, d, m) = k·(d·m + m² − m) + d + m`; the smallest sufficient `k`
//! is `ceil((n − d − m) / (m·(d + m − 1)))`, and `k = 0` (a single leaf)
//! covers `n ≤ p` for any split. Ties on waste break to the median of the
//! candidate list ordered by ascending `m`, which keeps the leaf/indirect
//! ratio balanced and is deterministic.

use crate::build::BuildError;
use tracing::debug;

/// The optimizer's chosen tree shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeShape {
    /// Pointers per packet (`d + m`), also the leaf direct capacity.
    pub pointers_per_packet: usize,
    /// Direct pointers per internal node.
    pub direct_per_node: usize,
    /// Indirect pointers per internal node.
    pub indirect_per_node: usize,
    /// Internal (non-leaf) manifest count the shape predicts.
    pub internal_nodes: u64,
    /// Pointer capacity left unused: `N(k, d, m) − n`.
    pub waste: u64,
    /// Predicted tree height; 0 means a single leaf.
    pub height: u32,
}

/// One evaluated `(d, m)` split.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    direct: usize,
    indirect: usize,
    internal_nodes: u64,
    waste: u64,
}

/// Choose the split minimizing waste for `num_chunks` data pointers and
/// `pointers_per_packet` pointer slots per manifest.
pub fn optimize(num_chunks: u64, pointers_per_packet: usize) -> Result<TreeShape, BuildError> {
    let n = num_chunks;
    let p = pointers_per_packet;
    if n == 0 || p == 0 {
        return Err(BuildError::NoValidShape {
            num_chunks: n,
            pointers_per_packet: p,
        });
    }

    let mut best: Vec<Candidate> = Vec::new();
    for m in 0..=p {
        let d = p - m;
        let candidate = match evaluate(n, d, m) {
            Some(c) => c,
            None => continue,
        };
        match best.first() {
            Some(leader) if candidate.waste > leader.waste => {}
            Some(leader) if candidate.waste < leader.waste => best = vec![candidate],
            Some(_) => best.push(candidate),
            None => best.push(candidate),
        }
    }

    let chosen = if best.is_empty() {
        return Err(BuildError::NoValidShape {
            num_chunks: n,
            pointers_per_packet: p,
        });
    } else {
        // Median of the ascending-m candidate list.
        best[best.len() / 2]
    };

    let height = height_for(n, &chosen, p);
    let shape = TreeShape {
        pointers_per_packet: p,
        direct_per_node: chosen.direct,
        indirect_per_node: chosen.indirect,
        internal_nodes: chosen.internal_nodes,
        waste: chosen.waste,
        height,
    };
    debug!(
        n,
        p,
        d = shape.direct_per_node,
        m = shape.indirect_per_node,
        k = shape.internal_nodes,
        waste = shape.waste,
        height = shape.height,
        "optimized tree shape"
    );
    Ok(shape)
}

/// Capacity of `k` internal nodes under split `(d, m)`, plus one packet's
/// worth of top-level pointers.
pub fn capacity(k: u64, d: usize, m: usize) -> u64 {
    let d = d as u64;
    let m = m as u64;
    k * (d * m + m * m - m) + d + m
}

fn evaluate(n: u64, d: usize, m: usize) -> Option<Candidate> {
    let p = (d + m) as u64;
    if n <= p {
        // Everything fits in one leaf, no internal nodes needed.
        return Some(Candidate {
            direct: d,
            indirect: m,
            internal_nodes: 0,
            waste: p - n,
        });
    }
    // A deeper tree needs indirect pointers and at least two slots per node.
    let denom = (m as u64) * (d as u64 + m as u64 - 1);
    if m == 0 || denom == 0 {
        return None;
    }
    let k = (n - p).div_ceil(denom);
    Some(Candidate {
        direct: d,
        indirect: m,
        internal_nodes: k,
        waste: capacity(k, d, m) - n,
    })
}

/// Smallest height whose full m-ary node count covers the predicted tree.
fn height_for(n: u64, chosen: &Candidate, p: usize) -> u32 {
    let k = chosen.internal_nodes;
    if k == 0 {
        return 0;
    }
    let m = chosen.indirect as u64;
    let leaf_data = n.saturating_sub(k * chosen.direct as u64);
    let leaves = leaf_data.div_ceil(p as u64).max(1);
    let total = k + leaves;
    if m == 1 {
        // A chain: one node per level.
        return (total - 1) as u32;
    }
    // Find the smallest h with (m^(h+1) − 1) / (m − 1) ≥ total.
    let mut h = 0u32;
    let mut nodes = 1u64; // m^0
    let mut sum = 1u64;
    while sum < total {
        h += 1;
        nodes = nodes.saturating_mul(m);
        sum = sum.saturating_add(nodes);
    }
    h
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fourteen_chunks_three_pointers() {
        // All three viable splits waste one slot; the median pick is the
        // balanced one.
        let shape = optimize(14, 3).unwrap();
        assert_eq!(shape.direct_per_node, 1);
        assert_eq!(shape.indirect_per_node, 2);
        assert_eq!(shape.internal_nodes, 3);
        assert_eq!(shape.waste, 1);
        assert_eq!(shape.height, 2);
    }

    #[test]
    fn five_chunks_three_pointers() {
        // (d=2, m=1) reaches exactly 5 with one internal node.
        let shape = optimize(5, 3).unwrap();
        assert_eq!(shape.direct_per_node, 2);
        assert_eq!(shape.indirect_per_node, 1);
        assert_eq!(shape.internal_nodes, 1);
        assert_eq!(shape.waste, 0);
        assert_eq!(shape.height, 1);
    }

    #[test]
    fn single_leaf_when_everything_fits() {
        let shape = optimize(7, 10).unwrap();
        assert_eq!(shape.internal_nodes, 0);
        assert_eq!(shape.height, 0);
        assert_eq!(shape.waste, 3);
    }

    #[test]
    fn waste_is_minimal_and_nonnegative() {
        for (n, p) in [
            (1u64, 2usize),
            (14, 3),
            (100, 7),
            (1000, 10),
            (12345, 31),
            (7, 7),
            (8, 7),
        ] {
            let shape = optimize(n, p).unwrap();

            // The chosen capacity covers n.
            assert!(
                capacity(shape.internal_nodes, shape.direct_per_node, shape.indirect_per_node)
                    >= n
            );

            // No other split does strictly better.
            for m in 0..=p {
                let d = p - m;
                if let Some(other) = super::evaluate(n, d, m) {
                    assert!(
                        other.waste >= shape.waste,
                        "split (d={d}, m={m}) wastes {} < chosen {}",
                        other.waste,
                        shape.waste
                    );
                }
            }
        }
    }

    #[test]
    fn tie_break_is_deterministic() {
        let a = optimize(14, 3).unwrap();
        let b = optimize(14, 3).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn single_pointer_per_packet_cannot_branch() {
        assert!(optimize(10, 1).is_err());
        // One chunk still fits in a one-pointer leaf.
        let shape = optimize(1, 1).unwrap();
        assert_eq!(shape.internal_nodes, 0);
    }

    #[test]
    fn zero_inputs_rejected() {
        assert!(optimize(0, 4).is_err());
        assert!(optimize(4, 0).is_err());
    }

    #[test]
    fn chain_height_matches_internal_count() {
        // Force a chain: 5 chunks, p = 3 gives (d=2, m=1), k=1, height 1.
        let shape = optimize(5, 3).unwrap();
        assert_eq!(shape.height, shape.internal_nodes as u32);
    }
}

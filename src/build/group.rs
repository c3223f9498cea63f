// src/build/group.rs

//! Hash-group accumulation
//!
//! [`HashGroupBuilder`] collects pointers front-and-back up to a capacity
//! and freezes them into an immutable hash group.
//! [`HashGroupBuilderPair`] is what the tree builder actually holds: it
//! multiplexes direct (data) and indirect (sub-manifest) pointers onto one
//! shared builder when both pointer classes use the same naming scheme, or
//! onto two builders when the schemes differ and the node must carry a
//! data group and an indirect group separately.

use crate::build::BuildError;
use crate::digest::Digest;
use crate::manifest::{GroupMeta, HashGroup, PointerList};
use std::collections::VecDeque;

/// Accumulates pointers for one hash group.
#[derive(Debug)]
pub struct HashGroupBuilder {
    pointers: VecDeque<Digest>,
    max: usize,
}

impl HashGroupBuilder {
    pub fn new(max: usize) -> Self {
        Self {
            pointers: VecDeque::with_capacity(max),
            max,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.pointers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pointers.is_empty()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.pointers.len() >= self.max
    }

    fn append(&mut self, digest: Digest) -> Result<(), BuildError> {
        if self.is_full() {
            return Err(BuildError::GroupFull { capacity: self.max });
        }
        self.pointers.push_back(digest);
        Ok(())
    }

    fn prepend(&mut self, digest: Digest) -> Result<(), BuildError> {
        if self.is_full() {
            return Err(BuildError::GroupFull { capacity: self.max });
        }
        self.pointers.push_front(digest);
        Ok(())
    }

    /// Freeze the accumulated pointers, in their current order, into a
    /// hash group.
    fn into_group(self, meta: Option<GroupMeta>) -> Result<HashGroup, BuildError> {
        let pointers = PointerList::new(self.pointers.into_iter().collect())?;
        Ok(HashGroup::new(meta, pointers))
    }
}

/// Running totals for one pointer class.
#[derive(Debug, Default, Clone, Copy)]
struct ClassState {
    count: usize,
    max: usize,
    bytes: u64,
    /// Smallest segment id seen, for the group's start-segment field.
    start_segment: Option<u64>,
}

impl ClassState {
    fn new(max: usize) -> Self {
        Self {
            max,
            ..Default::default()
        }
    }

    fn admit(&mut self, size: Option<u64>, segment_id: Option<u64>) -> Result<(), BuildError> {
        if self.count >= self.max {
            return Err(BuildError::GroupFull { capacity: self.max });
        }
        self.count += 1;
        self.bytes += size.unwrap_or(0);
        if let Some(id) = segment_id {
            self.start_segment = Some(match self.start_segment {
                Some(existing) => existing.min(id),
                None => id,
            });
        }
        Ok(())
    }
}

/// One or two underlying builders behind a single append/prepend surface.
#[derive(Debug)]
pub struct HashGroupBuilderPair {
    data: HashGroupBuilder,
    /// Present when data and manifest pointers use different naming
    /// schemes and must land in separate groups.
    manifests: Option<HashGroupBuilder>,
    direct: ClassState,
    indirect: ClassState,
}

impl HashGroupBuilderPair {
    /// Both pointer classes share one group; direct pointers must be
    /// inserted so they precede indirect pointers (the tree builder's
    /// prepend order guarantees this).
    pub fn merged(max_direct: usize, max_indirect: usize) -> Self {
        Self {
            data: HashGroupBuilder::new(max_direct + max_indirect),
            manifests: None,
            direct: ClassState::new(max_direct),
            indirect: ClassState::new(max_indirect),
        }
    }

    /// Separate data and indirect groups.
    pub fn split(max_direct: usize, max_indirect: usize) -> Self {
        Self {
            data: HashGroupBuilder::new(max_direct),
            manifests: Some(HashGroupBuilder::new(max_indirect)),
            direct: ClassState::new(max_direct),
            indirect: ClassState::new(max_indirect),
        }
    }

    #[inline]
    pub fn is_direct_full(&self) -> bool {
        self.direct.count >= self.direct.max
    }

    #[inline]
    pub fn is_indirect_full(&self) -> bool {
        self.indirect.count >= self.indirect.max
    }

    #[inline]
    pub fn direct_len(&self) -> usize {
        self.direct.count
    }

    #[inline]
    pub fn indirect_len(&self) -> usize {
        self.indirect.count
    }

    /// Bytes directly pointed at (leaf data).
    #[inline]
    pub fn direct_bytes(&self) -> u64 {
        self.direct.bytes
    }

    /// All payload bytes reachable through this node.
    #[inline]
    pub fn total_bytes(&self) -> u64 {
        self.direct.bytes + self.indirect.bytes
    }

    #[inline]
    pub fn direct_start_segment(&self) -> Option<u64> {
        self.direct.start_segment
    }

    #[inline]
    pub fn indirect_start_segment(&self) -> Option<u64> {
        self.indirect.start_segment
    }

    pub fn append_direct(
        &mut self,
        digest: Digest,
        size: Option<u64>,
        segment_id: Option<u64>,
    ) -> Result<(), BuildError> {
        self.direct.admit(size, segment_id)?;
        self.data.append(digest)
    }

    pub fn prepend_direct(
        &mut self,
        digest: Digest,
        size: Option<u64>,
        segment_id: Option<u64>,
    ) -> Result<(), BuildError> {
        self.direct.admit(size, segment_id)?;
        self.data.prepend(digest)
    }

    pub fn append_indirect(
        &mut self,
        digest: Digest,
        size: Option<u64>,
        segment_id: Option<u64>,
    ) -> Result<(), BuildError> {
        self.indirect.admit(size, segment_id)?;
        match &mut self.manifests {
            Some(builder) => builder.append(digest),
            None => self.data.append(digest),
        }
    }

    pub fn prepend_indirect(
        &mut self,
        digest: Digest,
        size: Option<u64>,
        segment_id: Option<u64>,
    ) -> Result<(), BuildError> {
        self.indirect.admit(size, segment_id)?;
        match &mut self.manifests {
            Some(builder) => builder.prepend(digest),
            None => self.data.prepend(digest),
        }
    }

    /// Freeze into the node's hash groups: one merged group, or data group
    /// then indirect group, skipping whichever side is empty.
    pub fn finish(
        self,
        data_meta: Option<GroupMeta>,
        manifest_meta: Option<GroupMeta>,
    ) -> Result<Vec<HashGroup>, BuildError> {
        let mut groups = Vec::with_capacity(2);
        match self.manifests {
            None => {
                if !self.data.is_empty() {
                    groups.push(self.data.into_group(data_meta)?);
                }
            }
            Some(manifests) => {
                if !self.data.is_empty() {
                    groups.push(self.data.into_group(data_meta)?);
                }
                if !manifests.is_empty() {
                    groups.push(manifests.into_group(manifest_meta)?);
                }
            }
        }
        if groups.is_empty() {
            return Err(BuildError::EmptyNode);
        }
        Ok(groups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest(i: u8) -> Digest {
        Digest::sha256_of(&[i])
    }

    #[test]
    fn merged_keeps_direct_before_indirect() {
        // The tree builder's order: absorb one indirect, prepend another,
        // then prepend the direct pointers.
        let mut pair = HashGroupBuilderPair::merged(2, 2);
        pair.append_indirect(digest(10), Some(100), None).unwrap();
        pair.prepend_indirect(digest(11), Some(100), None).unwrap();
        pair.prepend_direct(digest(1), Some(10), None).unwrap();
        pair.prepend_direct(digest(0), Some(10), None).unwrap();

        assert_eq!(pair.total_bytes(), 220);
        assert_eq!(pair.direct_bytes(), 20);

        let groups = pair.finish(None, None).unwrap();
        assert_eq!(groups.len(), 1);
        let order: Vec<Digest> = groups[0].pointers.iter().cloned().collect();
        assert_eq!(order, vec![digest(0), digest(1), digest(11), digest(10)]);
    }

    #[test]
    fn split_emits_data_group_first() {
        let mut pair = HashGroupBuilderPair::split(1, 2);
        pair.append_indirect(digest(20), None, Some(9)).unwrap();
        pair.prepend_indirect(digest(21), None, Some(8)).unwrap();
        pair.prepend_direct(digest(2), None, Some(4)).unwrap();

        let groups = pair
            .finish(
                Some(GroupMeta {
                    nc_id: Some(1),
                    ..Default::default()
                }),
                Some(GroupMeta {
                    nc_id: Some(2),
                    ..Default::default()
                }),
            )
            .unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].meta.as_ref().unwrap().nc_id, Some(1));
        assert_eq!(groups[0].pointers.len(), 1);
        assert_eq!(groups[1].meta.as_ref().unwrap().nc_id, Some(2));
        let order: Vec<Digest> = groups[1].pointers.iter().cloned().collect();
        assert_eq!(order, vec![digest(21), digest(20)]);
    }

    #[test]
    fn capacity_is_enforced_per_class() {
        let mut pair = HashGroupBuilderPair::merged(1, 1);
        pair.prepend_direct(digest(0), None, None).unwrap();
        assert!(pair.is_direct_full());
        assert!(matches!(
            pair.prepend_direct(digest(1), None, None).unwrap_err(),
            BuildError::GroupFull { capacity: 1 }
        ));

        // The indirect class still has room.
        assert!(!pair.is_indirect_full());
        pair.append_indirect(digest(2), None, None).unwrap();
        assert!(pair.is_indirect_full());
    }

    #[test]
    fn start_segment_is_minimum_seen() {
        let mut pair = HashGroupBuilderPair::split(3, 3);
        pair.prepend_direct(digest(5), None, Some(5)).unwrap();
        pair.prepend_direct(digest(4), None, Some(4)).unwrap();
        pair.prepend_direct(digest(3), None, Some(3)).unwrap();
        assert_eq!(pair.direct_start_segment(), Some(3));

        pair.append_indirect(digest(9), None, Some(2)).unwrap();
        pair.prepend_indirect(digest(8), None, Some(1)).unwrap();
        assert_eq!(pair.indirect_start_segment(), Some(1));
    }

    #[test]
    fn empty_side_is_skipped() {
        let mut pair = HashGroupBuilderPair::split(3, 3);
        pair.prepend_direct(digest(0), None, None).unwrap();
        let groups = pair.finish(None, None).unwrap();
        assert_eq!(groups.len(), 1);
    }

    #[test]
    fn no_pointers_is_an_error() {
        let pair = HashGroupBuilderPair::merged(2, 2);
        assert!(matches!(
            pair.finish(None, None).unwrap_err(),
            BuildError::EmptyNode
        ));
    }

    #[test]
    fn zero_indirect_capacity_makes_a_leaf_builder() {
        let mut pair = HashGroupBuilderPair::merged(3, 0);
        assert!(pair.is_indirect_full());
        pair.prepend_direct(digest(1), Some(7), None).unwrap();
        let groups = pair.finish(None, None).unwrap();
        assert_eq!(groups[0].pointers.len(), 1);
    }
}

// tests/naming.rs
//! Name-constructor scoping: definitions introduced at an interior node
//! must affect only that node's branch.

use casket::manifest::{
    GroupMeta, HashGroup, Manifest, NameConstructor, NcDef, Node, NodeMeta, PointerList,
};
use casket::store::StoreError;
use casket::{Digest, MemoryStore, Name, Packet, PacketStore, PayloadType, Traverser};
use std::cell::RefCell;

/// Store wrapper recording the retrieval name of every fetch.
struct RecordingStore {
    inner: MemoryStore,
    requests: RefCell<Vec<(Option<Name>, Digest)>>,
}

impl RecordingStore {
    fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            requests: RefCell::new(Vec::new()),
        }
    }
}

impl PacketStore for RecordingStore {
    fn get(&self, name: Option<&Name>, digest: &Digest) -> Result<Packet, StoreError> {
        self.requests
            .borrow_mut()
            .push((name.cloned(), digest.clone()));
        self.inner.get(name, digest)
    }

    fn put(&mut self, packet: &Packet) -> Result<bool, StoreError> {
        self.inner.put(packet)
    }

    fn contains(&self, digest: &Digest) -> bool {
        self.inner.contains(digest)
    }

    fn len(&self) -> usize {
        self.inner.len()
    }
}

fn manifest_packet(node: Node) -> Packet {
    Packet::new(None, PayloadType::Manifest, Manifest::plain(node).encode()).unwrap()
}

fn data_group(nc_id: u64, start: u64, pointer: Digest) -> HashGroup {
    HashGroup::new(
        Some(GroupMeta {
            nc_id: Some(nc_id),
            start_segment_id: Some(start),
            ..Default::default()
        }),
        PointerList::new(vec![pointer]).unwrap(),
    )
}

#[test]
fn interior_definitions_stay_on_their_branch() {
    let mut store = MemoryStore::new();

    // Two data packets, one per branch.
    let left_data = Packet::data(None, b"left-bytes".to_vec()).unwrap();
    let right_data = Packet::data(None, b"right-bytes".to_vec()).unwrap();
    store.put(&left_data).unwrap();
    store.put(&right_data).unwrap();

    // Left child overrides constructor 1 to the /override prefix for its
    // own subtree.
    let left = manifest_packet(
        Node::new(
            Some(NodeMeta {
                nc_defs: vec![NcDef::new(
                    1,
                    NameConstructor::Segmented("/override".parse().unwrap()),
                )],
                ..Default::default()
            }),
            vec![data_group(1, 0, left_data.digest().clone())],
        )
        .unwrap(),
    );
    store.put(&left).unwrap();

    // Right child carries no definitions and resolves under the root's.
    let right = manifest_packet(
        Node::new(
            None,
            vec![data_group(1, 1, right_data.digest().clone())],
        )
        .unwrap(),
    );
    store.put(&right).unwrap();

    // Root defines constructor 1 as /base and points at both children by
    // digest (constructor 0, nameless).
    let root = manifest_packet(
        Node::new(
            Some(NodeMeta {
                nc_defs: vec![NcDef::new(
                    1,
                    NameConstructor::Segmented("/base".parse().unwrap()),
                )],
                ..Default::default()
            }),
            vec![HashGroup::new(
                None,
                PointerList::new(vec![left.digest().clone(), right.digest().clone()])
                    .unwrap(),
            )],
        )
        .unwrap(),
    );
    store.put(&root).unwrap();

    let store = RecordingStore::new(store);
    let mut out = Vec::new();
    Traverser::new(&store).traverse(&root, &mut out).unwrap();

    // Preorder: left branch before right branch.
    assert_eq!(out, b"left-bytesright-bytes".to_vec());

    let requests = store.requests.borrow();
    let name_for = |digest: &Digest| -> Option<Name> {
        requests
            .iter()
            .find(|(_, d)| d == digest)
            .and_then(|(name, _)| name.clone())
    };

    // The left branch's data resolved under its own override...
    assert_eq!(
        name_for(left_data.digest()),
        Some("/override/seg=0".parse().unwrap())
    );
    // ...while the sibling still resolved under the root's definition.
    assert_eq!(
        name_for(right_data.digest()),
        Some("/base/seg=1".parse().unwrap())
    );
    // The children themselves were fetched namelessly.
    assert_eq!(name_for(left.digest()), None);
    assert_eq!(name_for(right.digest()), None);
}

//! Property-based tests for the buffer and byte-tag engine.
//!
//! # Buffer Invariants
//! - Size conservation: growth and shrink sequences keep size and bytes
//!   consistent with a plain `Vec<u8>` model
//! - Realization: materializing the zero span never changes the bytes
//! - Fragmentation identity: fragments that tile a buffer join back into it
//! - Write isolation: writing through one view never changes another view
//!   of the same storage
//!
//! # Tag Invariants
//! - Tag survival: a fragment sees exactly the tags intersecting its range,
//!   and reassembly restores every tag at every byte it covered
//! - Copy-on-write: inserts into one copy never show through another
//! - Compaction idempotence: compacting an unchanged window keeps every entry
//! - Empty windows: a list shrunk to zero bytes holds no visible tag, and
//!   regrowing it brings none back

use std::collections::BTreeSet;

use packet_sim_core::{
    buffer::ZcBuffer,
    packet::Packet,
    tag::{Tag, TagId, TagList},
};
use proptest::prelude::*;

// ============================================================================
// Generators
// ============================================================================

/// Header bytes, zero span length, trailer bytes.
fn arb_parts() -> impl Strategy<Value = (Vec<u8>, usize, Vec<u8>)> {
    (
        proptest::collection::vec(any::<u8>(), 0..32),
        0_usize..512,
        proptest::collection::vec(any::<u8>(), 0..32),
    )
}

#[derive(Debug, Clone)]
enum BufferOp {
    AddAtStart(Vec<u8>),
    AddAtEnd(Vec<u8>),
    RemoveAtStart(usize),
    RemoveAtEnd(usize),
}

fn arb_buffer_op() -> impl Strategy<Value = BufferOp> {
    prop_oneof![
        proptest::collection::vec(any::<u8>(), 1..40).prop_map(BufferOp::AddAtStart),
        proptest::collection::vec(any::<u8>(), 1..40).prop_map(BufferOp::AddAtEnd),
        (0_usize..700).prop_map(BufferOp::RemoveAtStart),
        (0_usize..700).prop_map(BufferOp::RemoveAtEnd),
    ]
}

/// Raw tag placements; reduced modulo the buffer size by `place_tags`.
fn arb_raw_tags() -> impl Strategy<Value = Vec<(usize, usize)>> {
    proptest::collection::vec((any::<usize>(), 1_usize..200), 1..8)
}

fn arb_raw_cuts() -> impl Strategy<Value = Vec<usize>> {
    proptest::collection::vec(any::<usize>(), 0..6)
}

// ============================================================================
// Helpers
// ============================================================================

fn model_of(header: &[u8], zero_len: usize, trailer: &[u8]) -> Vec<u8> {
    let mut model = header.to_vec();
    model.resize(header.len() + zero_len, 0);
    model.extend_from_slice(trailer);
    model
}

/// `(start, len)` pieces tiling `[0, size)`, cut at the given raw positions.
fn pieces(size: usize, raw_cuts: &[usize]) -> Vec<(usize, usize)> {
    let mut cuts: BTreeSet<usize> = raw_cuts
        .iter()
        .filter(|_| size > 0)
        .map(|c| c % size)
        .filter(|&c| c > 0)
        .collect();
    cuts.insert(size);

    let mut result = Vec::new();
    let mut start = 0;
    for end in cuts {
        result.push((start, end - start));
        start = end;
    }
    result
}

/// `(id, start, end)` ranges inside `[0, size)`; ids are the positions.
fn place_tags(size: usize, raw: &[(usize, usize)]) -> Vec<(u32, usize, usize)> {
    raw.iter()
        .enumerate()
        .map(|(i, &(start, len))| {
            let start = start % size;
            let end = (start + len).min(size);
            (i as u32, start, end)
        })
        .collect()
}

fn spans(list: &TagList) -> Vec<(TagId, usize, usize)> {
    let mut spans: Vec<_> = list
        .iter()
        .map(|span| (span.tag.id(), span.start, span.end))
        .collect();
    spans.sort();
    spans
}

fn packet_spans(packet: &Packet) -> Vec<(TagId, usize, usize)> {
    spans(packet.byte_tag_list())
}

fn assert_all_tags_present(packet: &Packet, tags: &[(u32, usize, usize)]) {
    for &(id, start, end) in tags {
        for offset in start..end {
            let tag = packet.get_byte_tag(TagId(id), offset);
            assert_eq!(tag.and_then(|t| t.value_u64()), Some(u64::from(id)), "tag {id} lost at {offset}");
        }
    }
}

// ============================================================================
// Buffer Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn prop_size_conservation(
        (header, zero_len, trailer) in arb_parts(),
        ops in proptest::collection::vec(arb_buffer_op(), 0..24),
    ) {
        let mut buffer = ZcBuffer::from_parts(&header, zero_len, &trailer).unwrap();
        let mut model = model_of(&header, zero_len, &trailer);

        for op in ops {
            match op {
                BufferOp::AddAtStart(bytes) => {
                    buffer.add_at_start(bytes.len()).unwrap();
                    buffer.begin_mut().write_bytes(&bytes).unwrap();
                    let tail = std::mem::replace(&mut model, bytes);
                    model.extend(tail);
                }
                BufferOp::AddAtEnd(bytes) => {
                    buffer.add_at_end(bytes.len()).unwrap();
                    let mut it = buffer.end_mut();
                    it.move_backward(bytes.len()).unwrap();
                    it.write_bytes(&bytes).unwrap();
                    model.extend_from_slice(&bytes);
                }
                BufferOp::RemoveAtStart(n) => {
                    buffer.remove_at_start(n);
                    if n > model.len() {
                        model.clear();
                    } else {
                        model.drain(..n);
                    }
                }
                BufferOp::RemoveAtEnd(n) => {
                    buffer.remove_at_end(n);
                    if n > model.len() {
                        model.clear();
                    } else {
                        model.truncate(model.len() - n);
                    }
                }
            }
            prop_assert_eq!(buffer.size(), model.len());
        }

        prop_assert_eq!(buffer.to_vec(), model);
    }

    #[test]
    fn prop_realize_round_trip(
        (header, zero_len, trailer) in arb_parts(),
        trim_front in 0_usize..16,
    ) {
        let mut buffer = ZcBuffer::from_parts(&header, zero_len, &trailer).unwrap();
        buffer.remove_at_start(trim_front.min(buffer.size()));
        let before = buffer.to_vec();

        let real = buffer.make_real_buffer().unwrap();
        prop_assert!(!real.is_zero_compressed());
        prop_assert_eq!(real.to_vec(), before.clone());

        buffer.realize().unwrap();
        prop_assert!(!buffer.is_zero_compressed());
        prop_assert_eq!(buffer.to_vec(), before);
    }

    #[test]
    fn prop_fragmentation_identity(
        (header, zero_len, trailer) in arb_parts(),
        raw_cuts in arb_raw_cuts(),
    ) {
        let original = ZcBuffer::from_parts(&header, zero_len, &trailer).unwrap();
        let expected = original.to_vec();
        let fragments: Vec<ZcBuffer> = pieces(original.size(), &raw_cuts)
            .into_iter()
            .map(|(start, len)| original.make_fragment(start, len).unwrap())
            .collect();

        let mut by_trailers = fragments[0].clone();
        for fragment in &fragments[1..] {
            by_trailers.append(fragment).unwrap();
        }
        prop_assert_eq!(by_trailers.to_vec(), expected.clone());

        let mut by_headers = fragments[fragments.len() - 1].clone();
        for fragment in fragments[..fragments.len() - 1].iter().rev() {
            by_headers.prepend(fragment).unwrap();
        }
        prop_assert_eq!(by_headers.to_vec(), expected.clone());

        // the shared storage was never clobbered
        prop_assert_eq!(original.to_vec(), expected);
    }

    #[test]
    fn prop_shared_write_isolation(
        (header, zero_len, trailer) in arb_parts(),
        writes in proptest::collection::vec((any::<usize>(), any::<u8>()), 1..8),
    ) {
        let original = ZcBuffer::from_parts(&header, zero_len, &trailer).unwrap();
        let expected = original.to_vec();
        prop_assume!(!expected.is_empty());

        // nothing of the copy is its own yet
        let mut copy = original.clone();
        for &(raw, value) in &writes {
            let mut it = copy.begin_mut();
            it.move_forward(raw % expected.len()).unwrap();
            prop_assert!(it.write_u8(value).is_err());
        }
        prop_assert_eq!(original.to_vec(), expected.clone());
        prop_assert_eq!(copy.to_vec(), expected.clone());

        copy.make_writable().unwrap();
        let zero = header.len()..header.len() + zero_len;
        let mut model = expected.clone();
        for &(raw, value) in &writes {
            let offset = raw % model.len();
            let mut it = copy.begin_mut();
            it.move_forward(offset).unwrap();
            let written = it.write_u8(value).is_ok();
            prop_assert_eq!(written, !zero.contains(&offset));
            if written {
                model[offset] = value;
            }
        }
        prop_assert_eq!(copy.to_vec(), model);
        prop_assert_eq!(original.to_vec(), expected);
    }
}

// ============================================================================
// Tag Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(96))]

    #[test]
    fn prop_tag_survival(
        header in proptest::collection::vec(any::<u8>(), 0..40),
        zero_len in 1_usize..400,
        raw_tags in arb_raw_tags(),
        raw_cuts in arb_raw_cuts(),
    ) {
        let buffer = ZcBuffer::from_parts(&header, zero_len, &[]).unwrap();
        let mut original = Packet::from_buffer(buffer).unwrap();
        let tags = place_tags(original.size(), &raw_tags);
        for &(id, start, end) in &tags {
            original.add_byte_tag(Tag::from_u64(id, u64::from(id)), start, end - start).unwrap();
        }

        let cut = pieces(original.size(), &raw_cuts);
        let fragments: Vec<Packet> = cut
            .iter()
            .map(|&(start, len)| original.make_fragment(start, len).unwrap())
            .collect();

        for (&(start, len), fragment) in cut.iter().zip(&fragments) {
            let expected: BTreeSet<u32> = tags
                .iter()
                .filter(|&&(_, s, e)| s < start + len && start < e)
                .map(|&(id, _, _)| id)
                .collect();
            let visible: BTreeSet<u32> = fragment
                .byte_tags()
                .iter()
                .map(|span| span.tag.id().0)
                .collect();
            prop_assert_eq!(visible, expected);
        }

        let mut by_trailers = fragments[0].clone();
        for fragment in &fragments[1..] {
            by_trailers.append(fragment).unwrap();
        }
        assert_all_tags_present(&by_trailers, &tags);
        prop_assert_eq!(packet_spans(&by_trailers), packet_spans(&original));

        let mut by_headers = fragments[fragments.len() - 1].clone();
        for fragment in fragments[..fragments.len() - 1].iter().rev() {
            by_headers.prepend(fragment).unwrap();
        }
        assert_all_tags_present(&by_headers, &tags);
        prop_assert_eq!(packet_spans(&by_headers), packet_spans(&original));
    }

    #[test]
    fn prop_copy_on_write_non_interference(
        size in 1_usize..300,
        base in arb_raw_tags(),
        extra in arb_raw_tags(),
    ) {
        let mut ancestor = TagList::with_buffer_size(size).unwrap();
        for (id, start, end) in place_tags(size, &base) {
            ancestor.insert(Tag::empty(id), start, end - start).unwrap();
        }

        let mut a = ancestor.clone();
        let mut b = ancestor.clone();
        let b_before = spans(&b);

        for (i, (_, start, end)) in place_tags(size, &extra).into_iter().enumerate() {
            a.insert(Tag::empty(100 + i as u32), start, end - start).unwrap();
        }
        prop_assert_eq!(spans(&b), b_before.clone());
        for i in 0..extra.len() as u32 {
            for offset in 0..size {
                prop_assert!(!b.exists(TagId(100 + i), offset));
            }
        }

        let a_after = spans(&a);
        b.insert(Tag::empty(500), 0, size).unwrap();
        prop_assert_eq!(spans(&a), a_after);
        prop_assert_eq!(spans(&ancestor), b_before);
        prop_assert!(!a.exists(TagId(500), 0));
    }

    #[test]
    fn prop_compaction_idempotence(
        size in 4_usize..300,
        raw in arb_raw_tags(),
        shrink in (0_usize..1000, 0_usize..1000),
    ) {
        let mut list = TagList::with_buffer_size(size).unwrap();
        for (id, start, end) in place_tags(size, &raw) {
            list.insert(Tag::empty(id), start, end - start).unwrap();
        }

        // keep at least one byte in the window
        let front = shrink.0 % (size / 2);
        let back = shrink.1 % (size - front - 1).max(1);
        list.remove_at_start(front);
        list.remove_at_end(back);
        prop_assert!(list.buffer_size() >= 1);

        // first insert compacts away the entries that fell out of the window
        list.insert(Tag::empty(998), 0, 1).unwrap();
        let compacted = list.internal_size();
        let snapshot = spans(&list);
        prop_assert_eq!(compacted, list.len());

        // second insert compacts an unchanged window
        list.insert(Tag::empty(999), 0, 1).unwrap();
        prop_assert_eq!(list.internal_size(), compacted + 1);

        let mut after = spans(&list);
        after.retain(|&(id, _, _)| id != TagId(999));
        prop_assert_eq!(after, snapshot);
    }

    #[test]
    fn prop_empty_window_hides_tags(
        size in 1_usize..300,
        raw in arb_raw_tags(),
        split in any::<usize>(),
        regrow in (0_usize..64, 0_usize..64),
        shared in any::<bool>(),
    ) {
        let tags = place_tags(size, &raw);
        let mut list = TagList::with_buffer_size(size).unwrap();
        for &(id, start, end) in &tags {
            list.insert(Tag::empty(id), start, end - start).unwrap();
        }
        let sibling = shared.then(|| list.clone());

        let front = split % (size + 1);
        list.remove_at_start(front);
        list.remove_at_end(size - front);
        prop_assert_eq!(list.buffer_size(), 0);
        prop_assert_eq!(list.len(), 0);
        prop_assert_eq!(list.iter().count(), 0);

        list.add_at_start(regrow.0).unwrap();
        list.add_at_end(regrow.1).unwrap();
        prop_assert_eq!(list.len(), 0);
        for offset in 0..list.buffer_size() {
            for &(id, _, _) in &tags {
                prop_assert!(!list.exists(TagId(id), offset));
            }
        }

        if let Some(sibling) = sibling {
            prop_assert_eq!(sibling.len(), tags.len());
        }
    }
}

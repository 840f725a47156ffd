//! Linked-list descriptor chain builder and editor.
//!
//! A chain is the in-memory structure the DMA hardware walks on its own: an
//! arena of data elements split into up to [`MAX_SUBLISTS`] sublists for
//! parallel descriptor prefetch, each sublist terminated by a zero-valued
//! link sentinel and carrying the local-interrupt flag on its last real
//! element. The chain value owns the arena plus a side-record with total
//! size, per-sublist byte accounting, and, while a truncation edit is
//! active, the saved state needed to reverse the edit exactly.
//!
//! The caller owns a chain outright. The engine reads its head address once
//! at transfer start; a chain whose channel has not completed must not be
//! mutated.

use card_regs::dma::ChanControl;
use card_regs::{DataElement, ELEMENT_SIZE};

use crate::{CardEngine, Error, Result};

/// Hard cap on sublists per chain.
pub const MAX_SUBLISTS: usize = 8;

/// One extent of a scatter-gather mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SgEntry {
    pub addr: u64,
    pub len: u64,
}

/// Sublist split parameters, snapshotted from the engine tunables when a
/// chain is laid out.
#[derive(Debug, Clone, Copy)]
pub struct ChainPolicy {
    /// Sublist count to split into when splitting applies.
    pub split: u32,
    /// Minimum element count before any split happens.
    pub min_split: u32,
}

impl Default for ChainPolicy {
    fn default() -> Self {
        Self {
            split: 3,
            min_split: 20,
        }
    }
}

/// Count the data elements needed to cover `src` → `dst` starting at
/// `dst_offset` bytes into the destination mapping. Allocates nothing.
pub fn plan_elements(src: &[SgEntry], dst: &[SgEntry], dst_offset: u64) -> usize {
    walk_spans(src, dst, dst_offset, 0, |_, _, _| {}).0
}

/// [`plan_elements`] with a per-pair byte budget, for chains assembled from
/// several mapping pairs.
pub fn plan_elements_capped(
    src: &[SgEntry],
    dst: &[SgEntry],
    dst_offset: u64,
    max_size: u64,
) -> usize {
    walk_spans(src, dst, dst_offset, max_size, |_, _, _| {}).0
}

/// Bytes a chain buffer for `element_count` elements will occupy, for
/// callers that account for the allocation before making it.
pub fn chain_buffer_size(element_count: usize, policy: ChainPolicy, single_list: bool) -> usize {
    (element_count + sublist_count(element_count, policy, single_list)) * ELEMENT_SIZE
}

fn sublist_count(element_count: usize, policy: ChainPolicy, single_list: bool) -> usize {
    if element_count > 0
        && element_count as u32 >= policy.min_split
        && policy.split > 1
        && !single_list
    {
        (policy.split as usize).min(element_count).min(MAX_SUBLISTS)
    } else {
        1
    }
}

/// Walk a source/destination mapping pair and hand `emit` every data
/// element the transfer needs: each element covers the largest run
/// contiguous in both mappings, so the element count is driven by the
/// finer-grained side. Returns `(element_count, total_bytes)`.
fn walk_spans(
    src: &[SgEntry],
    dst: &[SgEntry],
    dst_offset: u64,
    max_size: u64,
    mut emit: impl FnMut(u64, u64, u32),
) -> (usize, u64) {
    let mut count = 0usize;
    let mut total = 0u64;
    let mut budget = if max_size == 0 { u64::MAX } else { max_size };

    let mut src_iter = src.iter().copied().filter(|e| e.len > 0);
    let mut dst_iter = dst.iter().copied().filter(|e| e.len > 0);

    let mut skip = dst_offset;
    let mut cur_dst = loop {
        match dst_iter.next() {
            Some(mut entry) => {
                if skip < entry.len {
                    entry.addr += skip;
                    entry.len -= skip;
                    break Some(entry);
                }
                skip -= entry.len;
            }
            None => break None,
        }
    };
    let mut cur_src = src_iter.next();

    while budget > 0 {
        let (Some(src_run), Some(dst_run)) = (cur_src.as_mut(), cur_dst.as_mut()) else {
            break;
        };
        let chunk = src_run
            .len
            .min(dst_run.len)
            .min(budget)
            .min(u32::MAX as u64);

        emit(src_run.addr, dst_run.addr, chunk as u32);
        count += 1;
        total += chunk;
        budget -= chunk;

        src_run.addr += chunk;
        src_run.len -= chunk;
        dst_run.addr += chunk;
        dst_run.len -= chunk;
        if src_run.len == 0 {
            cur_src = src_iter.next();
        }
        if dst_run.len == 0 {
            cur_dst = dst_iter.next();
        }
    }

    (count, total)
}

/// Saved pre-edit state of an active truncation.
struct CutState {
    slot: u32,
    saved_size: u32,
    saved_control: u32,
    saved_next: DataElement,
    list_idx: u32,
    lists_keep: u32,
    xfer_size_keep: u64,
    prev_total: u64,
}

/// An owned, hardware-walkable descriptor chain.
pub struct DmaChain {
    /// Data slots plus one sentinel slot per sublist, contiguous.
    elems: Box<[DataElement]>,
    num_elements: u32,
    /// Sublist count fixed at layout time; indexing geometry never changes.
    layout_lists: u32,
    /// Arena slot index where each sublist starts.
    list_base: [u32; MAX_SUBLISTS],
    /// Sublists currently reachable by the hardware (shrinks under an
    /// active truncation).
    active_lists: u32,
    num_filled: u32,
    xfer_size: [u64; MAX_SUBLISTS],
    total_size: u64,
    cut: Option<CutState>,
}

impl DmaChain {
    /// Lay out a chain for `element_count` data elements. The sublist count
    /// follows `policy` unless `single_list` forces one sublist; each
    /// sublist reserves one extra slot for its end-of-list sentinel.
    pub fn new(element_count: usize, policy: ChainPolicy, single_list: bool) -> Result<Self> {
        if element_count == 0 || element_count > u32::MAX as usize / 2 {
            return Err(Error::InvalidArgument);
        }

        let lists = sublist_count(element_count, policy, single_list);
        let per_list = element_count / lists;
        let mut list_base = [0u32; MAX_SUBLISTS];
        for (i, base) in list_base.iter_mut().enumerate().take(lists) {
            *base = (i * (per_list + 1)) as u32;
        }

        Ok(Self {
            elems: vec![DataElement::default(); element_count + lists].into_boxed_slice(),
            num_elements: element_count as u32,
            layout_lists: lists as u32,
            list_base,
            active_lists: lists as u32,
            num_filled: 0,
            xfer_size: [0; MAX_SUBLISTS],
            total_size: 0,
            cut: None,
        })
    }

    /// Populate the chain from one source/destination mapping pair.
    /// Returns the total bytes the chain transfers.
    pub fn fill(&mut self, src: &[SgEntry], dst: &[SgEntry], dst_offset: u64) -> Result<u64> {
        self.begin_fill();
        let (count, total) = walk_spans(src, dst, dst_offset, 0, |s, d, len| {
            self.push_element(s, d, len)
        });
        self.finish_fill(count, total)
    }

    /// Populate the chain from a sequence of `(src, dst, max_size)` mapping
    /// pairs, for transfers into multiple destination objects in one
    /// descriptor walk. `dst_offset` applies to the first pair only; a
    /// `max_size` of zero means unbounded.
    pub fn fill_from_iter<'a, I>(&mut self, dst_offset: u64, pairs: I) -> Result<u64>
    where
        I: IntoIterator<Item = (&'a [SgEntry], &'a [SgEntry], u64)>,
    {
        self.begin_fill();
        let mut count = 0usize;
        let mut total = 0u64;
        let mut offset = dst_offset;

        for (src, dst, max_size) in pairs {
            let (pair_count, pair_total) = walk_spans(src, dst, offset, max_size, |s, d, len| {
                self.push_element(s, d, len)
            });
            if pair_count == 0 {
                log::error!("chain fill produced no elements for a mapping pair");
                return Err(Error::ChainMismatch);
            }
            count += pair_count;
            total += pair_total;
            offset = 0;
        }

        self.finish_fill(count, total)
    }

    /// Shorten the chain to exactly `new_size` bytes without reallocating.
    ///
    /// The element at the cut point is truncated in place and gains the
    /// local-interrupt flag, the element after it becomes a link sentinel
    /// (its prior content saved), and sublists past the cut drop out of the
    /// active count. Requesting the currently-active size is a no-op; a
    /// fresh truncation first reverses any still-active one, so repeated
    /// edits never compound.
    pub fn truncate(&mut self, new_size: u64) -> Result<()> {
        if new_size == 0 || self.num_filled != self.num_elements {
            return Err(Error::InvalidArgument);
        }
        if self.total_size == new_size {
            return Ok(());
        }
        if self.cut.is_some() {
            self.restore();
        }

        let mut list_idx = 0usize;
        let mut slot = self.list_base[0] as usize;
        let mut total = self.elems[slot].transfer_size as u64;
        while total < new_size {
            slot += 1;
            if self.elems[slot].has(ChanControl::LLP) {
                if list_idx + 1 < self.active_lists as usize {
                    list_idx += 1;
                    slot = self.list_base[list_idx] as usize;
                } else {
                    log::error!("chain edit size {} exceeds available length", new_size);
                    return Err(Error::InvalidArgument);
                }
            }
            total += self.elems[slot].transfer_size as u64;
        }

        // Landing exactly on the chain's natural last element needs no cut.
        if total == new_size
            && list_idx as u32 == self.active_lists - 1
            && self.elems[slot].has(ChanControl::LIE)
            && self.elems[slot + 1].has(ChanControl::LLP)
        {
            self.total_size = new_size;
            return Ok(());
        }

        let cut = CutState {
            slot: slot as u32,
            saved_size: self.elems[slot].transfer_size,
            saved_control: self.elems[slot].control,
            saved_next: self.elems[slot + 1],
            list_idx: list_idx as u32,
            lists_keep: self.active_lists,
            xfer_size_keep: self.xfer_size[list_idx],
            prev_total: self.total_size,
        };

        if total > new_size {
            self.elems[slot].transfer_size -= (total - new_size) as u32;
        }
        self.elems[slot].control |= ChanControl::LIE.bits();
        self.elems[slot + 1] = DataElement::link_sentinel();

        self.active_lists = list_idx as u32 + 1;
        let mut kept = new_size;
        for bytes in &self.xfer_size[..list_idx] {
            kept -= bytes;
        }
        self.xfer_size[list_idx] = kept;
        self.total_size = new_size;
        self.cut = Some(cut);

        Ok(())
    }

    /// Reverse the most recent truncation exactly. A chain with no active
    /// edit is unaffected.
    pub fn restore(&mut self) {
        let Some(cut) = self.cut.take() else {
            return;
        };
        let slot = cut.slot as usize;
        self.elems[slot].transfer_size = cut.saved_size;
        self.elems[slot].control = cut.saved_control;
        self.elems[slot + 1] = cut.saved_next;
        self.active_lists = cut.lists_keep;
        self.xfer_size[cut.list_idx as usize] = cut.xfer_size_keep;
        self.total_size = cut.prev_total;
    }

    /// Rewrite the source/destination addresses of one already-filled data
    /// element, addressed by its logical index.
    pub fn set_element_addresses(&mut self, index: u32, src: u64, dst: u64) -> Result<()> {
        if index >= self.num_elements {
            return Err(Error::InvalidArgument);
        }
        let slot = self.data_slot(index);
        self.elems[slot].set_addresses(src, dst);
        Ok(())
    }

    pub fn num_elements(&self) -> usize {
        self.num_elements as usize
    }

    /// Sublists currently reachable by the hardware.
    pub fn sublist_count(&self) -> usize {
        self.active_lists as usize
    }

    /// Data elements assigned to a sublist by the layout.
    pub fn sublist_elements(&self, list: usize) -> usize {
        let per_list = (self.num_elements / self.layout_lists) as usize;
        if list + 1 == self.layout_lists as usize {
            self.num_elements as usize - per_list * (self.layout_lists as usize - 1)
        } else {
            per_list
        }
    }

    /// Byte offset of a sublist's first slot within the chain buffer.
    pub fn sublist_offset(&self, list: usize) -> usize {
        self.list_base[list] as usize * ELEMENT_SIZE
    }

    /// Bytes a sublist currently transfers.
    pub fn sublist_bytes(&self, list: usize) -> u64 {
        self.xfer_size[list]
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn buffer_size(&self) -> usize {
        self.elems.len() * ELEMENT_SIZE
    }

    pub fn has_active_edit(&self) -> bool {
        self.cut.is_some()
    }

    /// The raw arena, data and sentinel slots interleaved per layout.
    pub fn elements(&self) -> &[DataElement] {
        &self.elems
    }

    fn begin_fill(&mut self) {
        self.num_filled = 0;
        self.xfer_size = [0; MAX_SUBLISTS];
        self.active_lists = self.layout_lists;
        self.total_size = 0;
        self.cut = None;
    }

    fn push_element(&mut self, src: u64, dst: u64, size: u32) {
        if self.num_filled >= self.num_elements {
            // Over-produced span; finish_fill reports the mismatch.
            self.num_filled = self.num_filled.saturating_add(1);
            return;
        }

        let per_list = self.num_elements / self.layout_lists;
        let list_idx = ((self.num_filled / per_list) as usize).min(self.layout_lists as usize - 1);
        let offset_in_list = self.num_filled - per_list * list_idx as u32;
        let slot = (self.list_base[list_idx] + offset_in_list) as usize;

        self.elems[slot] = DataElement::data(src, dst, size);
        self.xfer_size[list_idx] += size as u64;

        let is_last = if list_idx as u32 == self.layout_lists - 1 {
            self.num_filled == self.num_elements - 1
        } else {
            offset_in_list == per_list - 1
        };
        if is_last {
            self.elems[slot].control |= ChanControl::LIE.bits();
            self.elems[slot + 1] = DataElement::link_sentinel();
        }

        self.num_filled += 1;
    }

    fn finish_fill(&mut self, count: usize, total: u64) -> Result<u64> {
        if count == 0 || count != self.num_elements as usize {
            log::error!(
                "chain fill wrote {} elements, planned {}",
                count,
                self.num_elements
            );
            return Err(Error::ChainMismatch);
        }
        self.total_size = total;
        Ok(total)
    }

    fn data_slot(&self, index: u32) -> usize {
        let per_list = self.num_elements / self.layout_lists;
        let list_idx = ((index / per_list) as usize).min(self.layout_lists as usize - 1);
        (self.list_base[list_idx] + (index - per_list * list_idx as u32)) as usize
    }
}

impl CardEngine {
    /// Compute, without allocating, how many data elements a chain for this
    /// mapping pair needs.
    pub fn plan_chain(&self, src: &[SgEntry], dst: &[SgEntry], dst_offset: u64) -> Result<usize> {
        let count = plan_elements(src, dst, dst_offset);
        if count == 0 {
            return Err(Error::InvalidArgument);
        }
        Ok(count)
    }

    /// [`CardEngine::plan_chain`] over a sequence of mapping pairs, matching
    /// [`DmaChain::fill_from_iter`].
    pub fn plan_chain_iter<'a, I>(&self, dst_offset: u64, pairs: I) -> Result<usize>
    where
        I: IntoIterator<Item = (&'a [SgEntry], &'a [SgEntry], u64)>,
    {
        let mut count = 0usize;
        let mut offset = dst_offset;
        for (src, dst, max_size) in pairs {
            count += plan_elements_capped(src, dst, offset, max_size);
            offset = 0;
        }
        if count == 0 {
            return Err(Error::InvalidArgument);
        }
        Ok(count)
    }

    /// Lay out a chain under the engine's current split tunables.
    pub fn alloc_chain(&self, element_count: usize, single_list: bool) -> Result<DmaChain> {
        DmaChain::new(element_count, self.chain_policy(), single_list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pages(base: u64, count: usize, page: u64) -> Vec<SgEntry> {
        // Discontiguous extents so runs cannot merge across them.
        (0..count)
            .map(|i| SgEntry {
                addr: base + i as u64 * page * 2,
                len: page,
            })
            .collect()
    }

    fn filled_chain(elements: usize, split: u32, min_split: u32) -> DmaChain {
        let src = pages(0x10_0000, elements, 4096);
        let dst = [SgEntry {
            addr: 0x8000_0000,
            len: elements as u64 * 4096,
        }];
        let policy = ChainPolicy { split, min_split };
        let mut chain = DmaChain::new(elements, policy, false).unwrap();
        let total = chain.fill(&src, &dst, 0).unwrap();
        assert_eq!(total, elements as u64 * 4096);
        chain
    }

    #[test]
    fn test_plan_driven_by_finer_side() {
        let src = [SgEntry {
            addr: 0x1000,
            len: 16384,
        }];
        let dst = pages(0x2000, 4, 4096);
        assert_eq!(plan_elements(&src, &dst, 0), 4);
        assert_eq!(plan_elements(&dst, &src, 0), 4);
    }

    #[test]
    fn test_plan_with_dst_offset() {
        let src = [SgEntry {
            addr: 0x1000,
            len: 4096,
        }];
        let dst = pages(0x2000, 4, 4096);
        // Offset lands mid-extent: 2048 in extent 0, 2048 in extent 1.
        assert_eq!(plan_elements(&src, &dst, 2048), 2);
        // Offset past the whole destination yields nothing.
        assert_eq!(plan_elements(&src, &dst, 4 * 4096), 0);
    }

    #[test]
    fn test_plan_capped() {
        let src = pages(0x1000, 8, 4096);
        let dst = [SgEntry {
            addr: 0x2000,
            len: 8 * 4096,
        }];
        assert_eq!(plan_elements_capped(&src, &dst, 0, 3 * 4096), 3);
        // Budget cuts an element short rather than dropping it.
        assert_eq!(plan_elements_capped(&src, &dst, 0, 4096 + 100), 2);
    }

    #[test]
    fn test_layout_sublists_sum_to_element_count() {
        for elements in [1usize, 5, 19, 20, 21, 50, 127] {
            for split in [1u32, 2, 3, 4, 8] {
                let policy = ChainPolicy {
                    split,
                    min_split: 20,
                };
                let chain = DmaChain::new(elements, policy, false).unwrap();
                let lists = chain.sublist_count();
                assert!(lists <= split.max(1) as usize);

                let total: usize = (0..lists).map(|l| chain.sublist_elements(l)).sum();
                assert_eq!(total, elements);

                for l in 0..lists.saturating_sub(1) {
                    assert_eq!(chain.sublist_elements(l), elements / lists);
                }
            }
        }
    }

    #[test]
    fn test_layout_split_thresholds() {
        let policy = ChainPolicy {
            split: 4,
            min_split: 20,
        };
        assert_eq!(DmaChain::new(19, policy, false).unwrap().sublist_count(), 1);
        assert_eq!(DmaChain::new(20, policy, false).unwrap().sublist_count(), 4);
        assert_eq!(DmaChain::new(20, policy, true).unwrap().sublist_count(), 1);

        let no_split = ChainPolicy {
            split: 1,
            min_split: 20,
        };
        assert_eq!(
            DmaChain::new(50, no_split, false).unwrap().sublist_count(),
            1
        );
    }

    #[test]
    fn test_buffer_size_accounts_sentinels() {
        let policy = ChainPolicy {
            split: 4,
            min_split: 20,
        };
        assert_eq!(chain_buffer_size(50, policy, false), (50 + 4) * ELEMENT_SIZE);
        assert_eq!(chain_buffer_size(10, policy, false), 11 * ELEMENT_SIZE);
        let chain = DmaChain::new(50, policy, false).unwrap();
        assert_eq!(chain.buffer_size(), (50 + 4) * ELEMENT_SIZE);
    }

    #[test]
    fn test_fill_sublist_invariants() {
        let chain = filled_chain(50, 4, 20);
        assert_eq!(chain.sublist_count(), 4);
        assert_eq!(
            (0..4).map(|l| chain.sublist_elements(l)).collect::<Vec<_>>(),
            vec![12, 12, 12, 14]
        );

        for list in 0..4 {
            let start = chain.sublist_offset(list) / ELEMENT_SIZE;
            let len = chain.sublist_elements(list);
            let elems = &chain.elements()[start..start + len + 1];

            // Exactly one LIE, on the last data element.
            let lie_positions: Vec<_> = (0..len)
                .filter(|&i| elems[i].has(ChanControl::LIE))
                .collect();
            assert_eq!(lie_positions, vec![len - 1]);

            // Every data element carries the cycle bit; the terminator is a
            // zero-valued link sentinel.
            assert!(elems[..len].iter().all(|e| e.has(ChanControl::CB)));
            assert_eq!(elems[len], DataElement::link_sentinel());

            assert_eq!(chain.sublist_bytes(list), len as u64 * 4096);
        }
    }

    #[test]
    fn test_fill_mismatch_detected() {
        let src = pages(0x10_0000, 10, 4096);
        let dst = [SgEntry {
            addr: 0x8000_0000,
            len: 10 * 4096,
        }];
        let mut chain = DmaChain::new(12, ChainPolicy::default(), true).unwrap();
        assert_eq!(chain.fill(&src, &dst, 0), Err(Error::ChainMismatch));
    }

    #[test]
    fn test_fill_from_iter_accumulates() {
        let src_a = pages(0x10_0000, 4, 4096);
        let dst_a = [SgEntry {
            addr: 0x8000_0000,
            len: 4 * 4096,
        }];
        let src_b = pages(0x20_0000, 3, 4096);
        let dst_b = [SgEntry {
            addr: 0x9000_0000,
            len: 3 * 4096,
        }];

        let pairs = [
            (&src_a[..], &dst_a[..], 0u64),
            (&src_b[..], &dst_b[..], 0u64),
        ];
        let mut chain = DmaChain::new(7, ChainPolicy::default(), true).unwrap();
        let total = chain.fill_from_iter(0, pairs).unwrap();
        assert_eq!(total, 7 * 4096);
        assert_eq!(chain.total_size(), 7 * 4096);
    }

    #[test]
    fn test_truncate_restore_roundtrip() {
        let reference = filled_chain(50, 4, 20);
        let full = reference.total_size();

        for new_size in [1, 4096, 49152, 50000, 98304, full - 1] {
            let mut chain = filled_chain(50, 4, 20);
            let before: Vec<_> = chain.elements().to_vec();

            chain.truncate(new_size).unwrap();
            assert!(chain.has_active_edit());
            assert_eq!(chain.total_size(), new_size);

            chain.restore();
            assert!(!chain.has_active_edit());
            assert_eq!(chain.total_size(), full);
            assert_eq!(chain.sublist_count(), 4);
            assert_eq!(chain.elements(), &before[..]);
            for list in 0..4 {
                assert_eq!(
                    chain.sublist_bytes(list),
                    chain.sublist_elements(list) as u64 * 4096
                );
            }
        }
    }

    #[test]
    fn test_truncate_full_size_is_noop() {
        let mut chain = filled_chain(50, 4, 20);
        let before: Vec<_> = chain.elements().to_vec();
        chain.truncate(chain.total_size()).unwrap();
        assert!(!chain.has_active_edit());
        assert_eq!(chain.elements(), &before[..]);
    }

    #[test]
    fn test_truncate_rejects_bad_sizes() {
        let mut chain = filled_chain(30, 4, 20);
        assert_eq!(chain.truncate(0), Err(Error::InvalidArgument));
        assert_eq!(
            chain.truncate(30 * 4096 + 1),
            Err(Error::InvalidArgument)
        );
        assert!(!chain.has_active_edit());
    }

    #[test]
    fn test_truncate_mid_sublist_two() {
        let mut chain = filled_chain(50, 4, 20);
        // Sublists carry 12*4096 bytes each; cut 848 bytes into the first
        // element of the second sublist.
        let new_size = 12 * 4096 + 848;
        chain.truncate(new_size).unwrap();

        assert_eq!(chain.sublist_count(), 2);
        assert_eq!(chain.total_size(), new_size);
        assert_eq!(chain.sublist_bytes(0), 12 * 4096);
        assert_eq!(chain.sublist_bytes(1), 848);

        let cut_slot = chain.sublist_offset(1) / ELEMENT_SIZE;
        let cut = &chain.elements()[cut_slot];
        assert_eq!(cut.transfer_size, 848);
        assert!(cut.has(ChanControl::LIE));
        assert_eq!(chain.elements()[cut_slot + 1], DataElement::link_sentinel());

        chain.restore();
        assert_eq!(chain.sublist_count(), 4);
        let restored = &chain.elements()[cut_slot];
        assert_eq!(restored.transfer_size, 4096);
        assert!(!restored.has(ChanControl::LIE));
    }

    #[test]
    fn test_truncate_exact_element_boundary() {
        let mut chain = filled_chain(30, 1, 100);
        // Exactly five whole elements: the fifth keeps its size but gains
        // the interrupt flag, and its successor becomes the sentinel.
        chain.truncate(5 * 4096).unwrap();
        let elems = chain.elements();
        assert_eq!(elems[4].transfer_size, 4096);
        assert!(elems[4].has(ChanControl::LIE));
        assert_eq!(elems[5], DataElement::link_sentinel());
    }

    #[test]
    fn test_second_truncate_reverses_first() {
        let mut twice = filled_chain(50, 4, 20);
        twice.truncate(20000).unwrap();
        twice.truncate(90000).unwrap();

        let mut once = filled_chain(50, 4, 20);
        once.truncate(90000).unwrap();

        assert_eq!(twice.elements(), once.elements());
        assert_eq!(twice.total_size(), once.total_size());
        assert_eq!(twice.sublist_count(), once.sublist_count());
    }

    #[test]
    fn test_truncate_idempotent_at_active_size() {
        let mut chain = filled_chain(50, 4, 20);
        chain.truncate(50000).unwrap();
        let snapshot: Vec<_> = chain.elements().to_vec();
        chain.truncate(50000).unwrap();
        assert_eq!(chain.elements(), &snapshot[..]);
    }

    #[test]
    fn test_set_element_addresses() {
        let mut chain = filled_chain(50, 4, 20);
        // Element 12 is the first element of the second sublist; its slot
        // skips the first sublist's sentinel.
        chain.set_element_addresses(12, 0xAAAA_0000, 0xBBBB_0000).unwrap();

        let slot = chain.sublist_offset(1) / ELEMENT_SIZE;
        assert_eq!(chain.elements()[slot].src(), 0xAAAA_0000);
        assert_eq!(chain.elements()[slot].dst(), 0xBBBB_0000);
        // Size and control are left alone.
        assert_eq!(chain.elements()[slot].transfer_size, 4096);

        assert_eq!(
            chain.set_element_addresses(50, 0, 0),
            Err(Error::InvalidArgument)
        );
    }

    #[test]
    fn test_refill_resets_prior_edit() {
        let mut chain = filled_chain(50, 4, 20);
        chain.truncate(50000).unwrap();

        let src = pages(0x30_0000, 50, 4096);
        let dst = [SgEntry {
            addr: 0xA000_0000,
            len: 50 * 4096,
        }];
        let total = chain.fill(&src, &dst, 0).unwrap();
        assert_eq!(total, 50 * 4096);
        assert!(!chain.has_active_edit());
        assert_eq!(chain.sublist_count(), 4);
    }
}

// This module implements the conversion queue builder, the fixpoint computation at the heart of
// the initialization pass. Starting from annotated root values it alternates two phases until a
// full cycle discovers no new value. The forward phase walks every queued value in order and
// merges its metadata into each data-flow successor, appending newly reached successors and
// moving already queued ones behind the value that feeds them, so a value is revisited after its
// known predecessors. The backward phase sweeps the queue in reverse and, for every value marked
// for backtracking, pulls its floating-point producers into the queue right before it as new
// roots. The merge rule keeps the metadata of the closest root, handles aggregate/scalar shape
// mismatches by synthesizing a fresh record shaped like the target, and projects struct
// metadata through constant field indices. Distances only decrease and flags only get set, which
// bounds the number of times a value can be re-queued behind the cursor.

//! Conversion queue construction.

use super::value_info::{ValueInfo, INFINITE_DISTANCE};
use crate::annotation::MdInfo;
use crate::core::{IrAdaptor, IrType, ValueKind};
use hashbrown::HashMap;
use std::collections::BTreeSet;
use std::hash::Hash;

/// Ordered set of values scheduled for conversion and their records.
#[derive(Debug, Clone)]
pub struct ConversionQueue<V: Ord> {
    order: Vec<V>,
    info: HashMap<V, ValueInfo<V>>,
}

impl<V: Ord> Default for ConversionQueue<V> {
    fn default() -> Self {
        Self {
            order: Vec::new(),
            info: HashMap::new(),
        }
    }
}

impl<V: Copy + Eq + Ord + Hash> ConversionQueue<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Queued values in traversal order.
    pub fn values(&self) -> &[V] {
        &self.order
    }

    pub fn info(&self, val: V) -> Option<&ValueInfo<V>> {
        self.info.get(&val)
    }

    pub fn contains(&self, val: V) -> bool {
        self.order.contains(&val)
    }

    pub fn position(&self, val: V) -> Option<usize> {
        self.order.iter().position(|&v| v == val)
    }

    /// Queued values with their records, in traversal order.
    pub fn iter(&self) -> impl Iterator<Item = (V, &ValueInfo<V>)> + '_ {
        self.order
            .iter()
            .filter_map(move |&v| self.info.get(&v).map(|info| (v, info)))
    }

    /// Sub-queue of the values accepted by `keep`, order preserved.
    pub fn retain(&self, mut keep: impl FnMut(V) -> bool) -> Self {
        let order: Vec<V> = self.order.iter().copied().filter(|&v| keep(v)).collect();
        let info = order
            .iter()
            .filter_map(|v| self.info.get(v).map(|info| (*v, info.clone())))
            .collect();
        Self { order, info }
    }
}

/// Outcome of deriving a successor's metadata along one edge.
enum Derived {
    Assign(Option<MdInfo>),
    Keep,
}

/// Fixpoint engine computing a [`ConversionQueue`] from root values.
pub struct ConversionQueueBuilder<'a, A: IrAdaptor> {
    adaptor: &'a A,
}

impl<'a, A: IrAdaptor> ConversionQueueBuilder<'a, A> {
    pub fn new(adaptor: &'a A) -> Self {
        Self { adaptor }
    }

    /// Build the queue of every value reachable from `roots`.
    ///
    /// When a value appears twice among the roots the first record wins.
    pub fn build(
        &self,
        roots: impl IntoIterator<Item = (A::ValueRef, ValueInfo<A::ValueRef>)>,
    ) -> ConversionQueue<A::ValueRef> {
        let mut queue = ConversionQueue::new();
        for (val, info) in roots {
            if queue.contains(val) {
                log::debug!("root {:?} queued twice; keeping the first record", val);
                continue;
            }
            queue.order.push(val);
            queue.info.insert(val, info);
        }

        loop {
            let before = queue.len();
            self.forward_phase(&mut queue);
            self.backtracking_phase(&mut queue);
            log::trace!("queue cycle: {} -> {} values", before, queue.len());
            if queue.len() == before {
                break;
            }
        }

        self.compute_root_sets(&mut queue);
        log::debug!("conversion queue built with {} values", queue.len());
        queue
    }

    fn is_side_channel(&self, val: A::ValueRef) -> bool {
        matches!(self.adaptor.annotation_marker(val), Ok(Some(_)) | Err(_))
    }

    fn forward_phase(&self, queue: &mut ConversionQueue<A::ValueRef>) {
        let mut next = 0;
        while next < queue.order.len() {
            let v = queue.order[next];
            let v_backtracking = queue.info.get(&v).is_some_and(|i| i.is_backtracking_node);

            for u in self.adaptor.successors(v) {
                if self.is_side_channel(u) {
                    continue;
                }

                let mut changed = self.merge_into(&mut queue.info, v, u);
                if v_backtracking {
                    let info = queue.info.entry(u).or_default();
                    if !info.is_backtracking_node {
                        info.is_backtracking_node = true;
                        changed = true;
                    }
                }

                match queue.position(u) {
                    None => {
                        log::trace!("forward: {:?} -> new {:?}", v, u);
                        queue.order.push(u);
                    }
                    Some(pos) if pos > next => {
                        queue.order.remove(pos);
                        queue.order.push(u);
                    }
                    Some(pos) if pos < next && changed => {
                        log::trace!("forward: {:?} -> requeue {:?}", v, u);
                        queue.order.remove(pos);
                        next -= 1;
                        queue.order.push(u);
                    }
                    Some(_) => {}
                }
            }
            next += 1;
        }
    }

    fn backtracking_phase(&self, queue: &mut ConversionQueue<A::ValueRef>) {
        let mut cursor = queue.order.len();
        while cursor > 0 {
            cursor -= 1;
            let v = queue.order[cursor];
            let is_backtracking = queue.info.get(&v).is_some_and(|i| i.is_backtracking_node);
            if !is_backtracking || self.adaptor.kind_of(v) != ValueKind::Instruction {
                continue;
            }

            let mut v_pos = cursor;
            for o in self.adaptor.operands(v) {
                if !self.adaptor.kind_of(o).is_data_flow() {
                    continue;
                }
                if !self.adaptor.static_type(o).is_floating_family() {
                    log::trace!("backtracking: {:?} is not a kind of float, skipped", o);
                    continue;
                }

                if let Some(info) = queue.info.get_mut(&v) {
                    info.demote_root();
                }
                queue.info.entry(o).or_default().is_backtracking_node = true;

                if queue.position(o).is_some() {
                    self.merge_into(&mut queue.info, v, o);
                } else {
                    log::debug!("backtracking: {:?} pulls in producer {:?}", v, o);
                    queue.order.insert(v_pos, o);
                    v_pos += 1;
                    self.merge_into(&mut queue.info, v, o);
                    if let Some(info) = queue.info.get_mut(&o) {
                        info.promote_to_root();
                    }
                }
            }
            // Producers inserted before `v` are swept next.
            cursor = v_pos;
        }
    }

    /// Merge `source`'s record into `target`'s; returns whether `target`
    /// changed.
    fn merge_into(
        &self,
        info: &mut HashMap<A::ValueRef, ValueInfo<A::ValueRef>>,
        source: A::ValueRef,
        target: A::ValueRef,
    ) -> bool {
        let Some(src) = info.get(&source) else {
            return false;
        };
        let candidate = src.distance.max(src.distance.saturating_add(1));
        let src_metadata = src.metadata.clone();
        let src_target = src.target.clone();

        let target_distance = info.get(&target).map_or(INFINITE_DISTANCE, |t| t.distance);
        let derived = (candidate < target_distance)
            .then(|| self.derive_metadata(source, target, src_metadata.as_ref()));

        let tgt = info.entry(target).or_default();
        let mut changed = false;
        if let Some(derived) = derived {
            if let Derived::Assign(md) = derived {
                tgt.metadata = md;
            }
            tgt.target = src_target;
            tgt.distance = candidate;
            changed = true;
        }

        if src_metadata.as_ref().is_some_and(MdInfo::enable_conversion) {
            if let Some(md) = tgt.metadata.as_mut() {
                changed |= md.set_enable_conversion();
            }
        }
        changed
    }

    fn derive_metadata(
        &self,
        source: A::ValueRef,
        target: A::ValueRef,
        src_md: Option<&MdInfo>,
    ) -> Derived {
        if self.adaptor.is_field_access(target)
            && self.adaptor.operands(target).first() == Some(&source)
        {
            let Some(md) = src_md else {
                return Derived::Assign(None);
            };
            return match self.project_field(source, target, md) {
                Some(field) => Derived::Assign(field),
                None => Derived::Keep,
            };
        }

        let src_ty = self.adaptor.static_type(source);
        let tgt_ty = self.adaptor.static_type(target);
        let src_elem = src_ty.unwrap_pointers_and_arrays();
        let tgt_elem = tgt_ty.unwrap_pointers_and_arrays();

        if src_elem.is_aggregate() != tgt_elem.is_aggregate() {
            return Derived::Assign(Some(MdInfo::default_for_type(tgt_elem)));
        }
        match src_md {
            Some(md) if md.is_compatible_with(tgt_elem) => Derived::Assign(Some(md.clone())),
            Some(_) => Derived::Assign(Some(MdInfo::default_for_type(tgt_elem))),
            None => Derived::Assign(None),
        }
    }

    /// Metadata of the field a field access projects out of `source`.
    ///
    /// `None` when an index into a struct is not constant or the metadata
    /// does not follow the type's shape.
    fn project_field(
        &self,
        source: A::ValueRef,
        access: A::ValueRef,
        md: &MdInfo,
    ) -> Option<Option<MdInfo>> {
        let base_ty = self.adaptor.static_type(source);
        // The first index steps over the base pointer itself.
        let mut ty = match base_ty {
            IrType::Ptr(inner) => *inner,
            other => other,
        };
        let mut current = Some(md.clone());

        for idx in self.adaptor.field_indices(access).into_iter().skip(1) {
            ty = match ty {
                IrType::Struct(fields) => {
                    let field = idx? as usize;
                    current = match current {
                        Some(MdInfo::Struct(info)) => info.fields.get(field).cloned().flatten(),
                        Some(MdInfo::Scalar(_)) => return None,
                        None => None,
                    };
                    fields.into_iter().nth(field)?
                }
                IrType::Array(_, elem) => *elem,
                _ => return None,
            };
        }

        let access_ty = self.adaptor.static_type(access);
        let access_elem = access_ty.unwrap_pointers_and_arrays();
        Some(match current {
            Some(md) if !md.is_compatible_with(access_elem) => {
                Some(MdInfo::default_for_type(access_elem))
            }
            other => other,
        })
    }

    fn compute_root_sets(&self, queue: &mut ConversionQueue<A::ValueRef>) {
        for (&val, info) in queue.info.iter_mut() {
            info.root_set = if info.is_root {
                BTreeSet::from([val])
            } else {
                BTreeSet::new()
            };
        }

        let order = queue.order.clone();
        loop {
            let mut changed = false;
            for &v in &order {
                let Some(roots) = queue.info.get(&v).map(|i| i.root_set.clone()) else {
                    continue;
                };
                if roots.is_empty() {
                    continue;
                }
                for u in self.adaptor.successors(v) {
                    if let Some(succ) = queue.info.get_mut(&u) {
                        let before = succ.root_set.len();
                        succ.root_set.extend(roots.iter().copied());
                        changed |= succ.root_set.len() != before;
                    }
                }
            }
            if !changed {
                break;
            }
        }
    }
}

// This module implements function specialization. A call that passes values with numeric
// metadata needs a callee whose parameters carry that metadata, and two calls passing different
// metadata need different callees. For every such call in a conversion queue the specializer
// clones the callee, rewires the call to the clone, seeds a fresh conversion queue with the
// clone's parameters re-rooted at distance zero, the module's global roots and the clone's own
// copies of the callee's local roots, and builds that queue restricted to the clone's body.
// Calls inside the clone are specialized recursively. A call trace holding every function on the
// current specialization path stops recursion through recursive call graphs, and a cache keyed by
// callee and argument metadata lets identical call contexts share a single clone.

//! Function specialization.

use super::queue::{ConversionQueue, ConversionQueueBuilder};
use super::roots::RootSet;
use super::writer::MetadataWriter;
use crate::annotation::MdInfo;
use crate::core::{InitResult, InitSession, IrAdaptor};

/// Metadata and target of one actual argument; `None` for arguments
/// without metadata.
type ArgContext = Vec<Option<(MdInfo, Option<String>)>>;

struct CachedClone<F> {
    callee: F,
    context: ArgContext,
    clone: F,
}

/// Clones callees per call context and propagates through the clones.
pub struct FunctionSpecializer<'s, A: IrAdaptor> {
    roots: &'s mut RootSet<A::ValueRef, A::FuncRef>,
    session: &'s mut InitSession,
    clone_suffix: String,
    cache: Vec<CachedClone<A::FuncRef>>,
    /// Originals and clones on the current specialization path.
    call_trace: Vec<A::FuncRef>,
}

impl<'s, A: IrAdaptor> FunctionSpecializer<'s, A> {
    pub fn new(
        roots: &'s mut RootSet<A::ValueRef, A::FuncRef>,
        session: &'s mut InitSession,
    ) -> Self {
        let clone_suffix = session.config().clone_suffix.clone();
        Self {
            roots,
            session,
            clone_suffix,
            cache: Vec::new(),
            call_trace: Vec::new(),
        }
    }

    /// Specialize every call in `queue` whose arguments carry metadata.
    pub fn specialize_callees(
        &mut self,
        adaptor: &mut A,
        queue: &ConversionQueue<A::ValueRef>,
    ) -> InitResult<()> {
        for &call in queue.values() {
            if !adaptor.is_call(call) {
                continue;
            }
            let Some(callee) = adaptor.called_function(call) else {
                log::debug!("{:?}: indirect call left alone", call);
                continue;
            };
            if !adaptor.func_has_body(callee) || adaptor.func_is_intrinsic(callee) {
                continue;
            }
            if self.call_trace.contains(&callee) {
                log::debug!(
                    "{:?}: {} is already being specialized, call left alone",
                    call,
                    adaptor.func_name(callee)
                );
                continue;
            }

            let args = adaptor.call_args(call);
            let context: ArgContext = args
                .iter()
                .map(|&arg| {
                    queue
                        .info(arg)
                        .and_then(|info| Some((info.metadata.clone()?, info.target.clone())))
                })
                .collect();
            if context.iter().all(Option::is_none) {
                continue;
            }

            if let Some(clone) = self.cached_clone(callee, &context) {
                log::debug!(
                    "{:?}: reusing {} for {}",
                    call,
                    adaptor.func_name(clone),
                    adaptor.func_name(callee)
                );
                adaptor.set_called_function(call, clone)?;
                self.session.stats_mut().clones_reused += 1;
                continue;
            }

            self.specialize_call(adaptor, queue, call, callee, context)?;
        }
        Ok(())
    }

    fn cached_clone(&self, callee: A::FuncRef, context: &ArgContext) -> Option<A::FuncRef> {
        self.cache
            .iter()
            .find(|entry| entry.callee == callee && entry.context == *context)
            .map(|entry| entry.clone)
    }

    fn specialize_call(
        &mut self,
        adaptor: &mut A,
        queue: &ConversionQueue<A::ValueRef>,
        call: A::ValueRef,
        callee: A::FuncRef,
        context: ArgContext,
    ) -> InitResult<()> {
        let name_hint = format!("{}_{}", adaptor.func_name(callee), self.clone_suffix);
        let (clone, value_map) = adaptor.clone_function_body(callee, &name_hint)?;
        adaptor.set_internal_linkage(clone);
        self.session.stats_mut().clones_created += 1;
        log::debug!(
            "{:?}: specialized {} as {}",
            call,
            adaptor.func_name(callee),
            adaptor.func_name(clone)
        );

        let mut seeds = Vec::new();
        let params: Vec<_> = adaptor.func_args(clone).collect();
        for (&arg, param) in adaptor.call_args(call).iter().zip(params) {
            let Some(info) = queue.info(arg).filter(|info| info.metadata.is_some()) else {
                continue;
            };
            seeds.push((param, info.rerooted(param)));
            if let Some(slot) = adaptor.param_storage_slot(param) {
                seeds.push((slot, info.rerooted(slot)));
            }
        }
        seeds.extend(self.roots.globals().iter().cloned());

        let locals: Vec<_> = self
            .roots
            .locals_of(callee)
            .iter()
            .filter_map(|(val, info)| value_map.get(val).map(|&new| (new, info.rerooted(new))))
            .collect();
        if !locals.is_empty() {
            adaptor.mark_starting_point(clone);
        }
        seeds.extend(locals.iter().cloned());
        self.roots.set_locals(clone, locals);

        let built = ConversionQueueBuilder::new(&*adaptor).build(seeds);
        let retained = built.retain(|val| adaptor.parent_func(val) == Some(clone));
        log::debug!(
            "{}: {} of {} queued values belong to the clone",
            adaptor.func_name(clone),
            retained.len(),
            built.len()
        );

        adaptor.link_clone(clone, callee);
        adaptor.set_called_function(call, clone)?;
        self.cache.push(CachedClone {
            callee,
            context,
            clone,
        });

        let written = MetadataWriter::flush_queue(adaptor, &retained);
        self.session.stats_mut().metadata_written += written;

        self.call_trace.push(callee);
        self.call_trace.push(clone);
        let result = self.specialize_callees(adaptor, &retained);
        self.call_trace.pop();
        self.call_trace.pop();
        result
    }
}

// This module finds the root values of the propagation: every value the user annotated. Module
// level annotations name global variables or functions. An annotated global becomes a root
// directly; an annotated function is remembered as conversion-enabled and each direct call to
// it becomes a root whose result carries the annotation. Local annotations arrive through marker
// calls inside function bodies; the marked value is the root and the enclosing function must be
// kept alive by later cleanup passes. Annotations are identified by (declaration, function) so a
// second annotation on the same declaration is reported and ignored, and a syntax error only
// skips the offending declaration. Roots whose storage holds no floating-point data are dropped
// unless the annotation forces backtracking.

//! Root collection.

use super::value_info::ValueInfo;
use crate::annotation::{AnnotationMetadata, AnnotationParser};
use crate::core::{InitResult, InitSession, InitWarning, IrAdaptor, IrType};
use hashbrown::HashSet;

/// Root values paired with their initial records.
pub type RootList<V> = Vec<(V, ValueInfo<V>)>;

/// Roots of a module: global roots shared by every scope and local roots
/// owned by one function each.
#[derive(Debug, Clone)]
pub struct RootSet<V: Ord, F> {
    globals: RootList<V>,
    locals: Vec<(F, RootList<V>)>,
}

impl<V: Ord, F> Default for RootSet<V, F> {
    fn default() -> Self {
        Self {
            globals: Vec::new(),
            locals: Vec::new(),
        }
    }
}

impl<V: Copy + Ord, F: Copy + Eq> RootSet<V, F> {
    pub fn globals(&self) -> &[(V, ValueInfo<V>)] {
        &self.globals
    }

    pub fn locals_of(&self, func: F) -> &[(V, ValueInfo<V>)] {
        self.locals
            .iter()
            .find(|(f, _)| *f == func)
            .map_or(&[], |(_, roots)| roots.as_slice())
    }

    /// Replace the local roots of `func`.
    pub fn set_locals(&mut self, func: F, roots: RootList<V>) {
        match self.locals.iter_mut().find(|(f, _)| *f == func) {
            Some((_, existing)) => *existing = roots,
            None => self.locals.push((func, roots)),
        }
    }

    /// Functions owning at least one local root, in collection order.
    pub fn functions_with_locals(&self) -> impl Iterator<Item = F> + '_ {
        self.locals
            .iter()
            .filter(|(_, roots)| !roots.is_empty())
            .map(|(f, _)| *f)
    }

    /// Every root, globals first.
    pub fn all_roots(&self) -> RootList<V> {
        self.globals
            .iter()
            .chain(self.locals.iter().flat_map(|(_, roots)| roots.iter()))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.globals.len() + self.locals.iter().map(|(_, r)| r.len()).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Scans a module for annotated declarations.
pub struct RootCollector<'a, A: IrAdaptor> {
    adaptor: &'a A,
    /// (declaration, enclosing function) keys already annotated.
    seen: HashSet<(String, String)>,
}

impl<'a, A: IrAdaptor> RootCollector<'a, A> {
    pub fn new(adaptor: &'a A) -> Self {
        Self {
            adaptor,
            seen: HashSet::new(),
        }
    }

    /// Collects global and local roots of the whole module.
    pub fn collect(
        &mut self,
        session: &mut InitSession,
    ) -> InitResult<RootSet<A::ValueRef, A::FuncRef>> {
        let mut roots = RootSet {
            globals: self.collect_global_roots(session),
            locals: Vec::new(),
        };

        let funcs: Vec<_> = self.adaptor.funcs().collect();
        for func in funcs {
            if !self.is_analyzable(func) {
                continue;
            }
            let locals = self.collect_local_roots(func, session)?;
            if !locals.is_empty() {
                roots.locals.push((func, locals));
            }
        }

        log::info!(
            "collected {} roots ({} global)",
            roots.len(),
            roots.globals.len()
        );
        Ok(roots)
    }

    fn is_analyzable(&self, func: A::FuncRef) -> bool {
        self.adaptor.func_has_body(func) && !self.adaptor.func_is_intrinsic(func)
    }

    /// Roots from the module annotation table.
    pub fn collect_global_roots(&mut self, session: &mut InitSession) -> RootList<A::ValueRef> {
        let mut roots = Vec::new();

        for (val, text) in self.adaptor.global_annotations() {
            let name = self.adaptor.value_name(val).to_string();
            let Some(ann) = self.accept_annotation(&name, "", &text, session) else {
                continue;
            };

            match self.adaptor.as_function(val) {
                Some(func) => {
                    session.enable_function(&name);
                    self.collect_calls_to(func, &ann, &mut roots);
                }
                None => {
                    let storage = self.adaptor.static_type(val);
                    if self.keeps_root(val, &ann, &storage) {
                        roots.push((val, ValueInfo::for_root(val, &ann, &storage)));
                    }
                }
            }
        }
        roots
    }

    /// Every direct call to an annotated function yields a root.
    fn collect_calls_to(
        &self,
        func: A::FuncRef,
        ann: &AnnotationMetadata,
        roots: &mut RootList<A::ValueRef>,
    ) {
        for caller in self.adaptor.funcs() {
            if !self.is_analyzable(caller) {
                continue;
            }
            for inst in self.adaptor.func_insts(caller) {
                if !self.adaptor.is_call(inst) || self.adaptor.called_function(inst) != Some(func)
                {
                    continue;
                }
                let storage = self.adaptor.static_type(inst);
                if storage.is_void() {
                    continue;
                }
                if self.keeps_root(inst, ann, &storage) {
                    roots.push((inst, ValueInfo::for_root(inst, ann, &storage)));
                }
            }
        }
    }

    /// Roots from annotation marker calls inside `func`.
    pub fn collect_local_roots(
        &mut self,
        func: A::FuncRef,
        session: &mut InitSession,
    ) -> InitResult<RootList<A::ValueRef>> {
        let func_name = self.adaptor.func_name(func).to_string();
        let mut roots = Vec::new();

        let insts: Vec<_> = self.adaptor.func_insts(func).collect();
        for inst in insts {
            let Some(marker) = self.adaptor.annotation_marker(inst)? else {
                continue;
            };
            let name = self.adaptor.value_name(marker.target).to_string();
            let Some(ann) = self.accept_annotation(&name, &func_name, &marker.text, session)
            else {
                continue;
            };

            let storage = self.adaptor.static_type(marker.target);
            if self.keeps_root(marker.target, &ann, &storage) {
                roots.push((
                    marker.target,
                    ValueInfo::for_root(marker.target, &ann, &storage),
                ));
            }
        }

        if !roots.is_empty() {
            log::debug!("{} local roots in {}", roots.len(), func_name);
        }
        Ok(roots)
    }

    /// Parses an annotation for the `(declaration, function)` key, recording
    /// a warning when it is malformed or the key was already annotated.
    fn accept_annotation(
        &mut self,
        declaration: &str,
        function: &str,
        text: &str,
        session: &mut InitSession,
    ) -> Option<AnnotationMetadata> {
        let ann = match AnnotationParser::parse(text) {
            Ok(ann) => ann,
            Err(failure) => {
                session.warn(InitWarning::Syntax {
                    declaration: declaration.to_string(),
                    annotation: text.trim_end_matches('\0').to_string(),
                    failure,
                });
                return None;
            }
        };

        if !self
            .seen
            .insert((declaration.to_string(), function.to_string()))
        {
            session.warn(InitWarning::Duplicate {
                declaration: declaration.to_string(),
                annotation: text.trim_end_matches('\0').to_string(),
            });
            return None;
        }

        session.stats_mut().annotation_count += 1;
        Some(ann)
    }

    fn keeps_root(&self, val: A::ValueRef, ann: &AnnotationMetadata, storage: &IrType) -> bool {
        if storage.contains_floating_point() || ann.backtracking_forced {
            return true;
        }
        log::debug!(
            "dropping root {:?} ({}): {} holds no floating point data",
            val,
            self.adaptor.value_name(val),
            storage
        );
        false
    }
}

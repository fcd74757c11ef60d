//! Metadata attachment and marker cleanup.

use super::queue::ConversionQueue;
use super::value_info::ValueInfo;
use crate::annotation::AttachedMetadata;
use crate::core::{InitResult, IrAdaptor};

/// Writes final records onto the program.
pub struct MetadataWriter;

impl MetadataWriter {
    /// The attachment record for a propagation record.
    pub fn record<V: Ord>(info: &ValueInfo<V>) -> AttachedMetadata {
        AttachedMetadata {
            info: info.metadata.clone(),
            target: info.target.clone(),
            init_weight: info.distance,
            is_root: info.is_root,
            backtracking: info.is_backtracking_node,
        }
    }

    /// Attach `info` to `val` unless it already carries a record.
    ///
    /// Returns whether a record was written.
    pub fn flush<A: IrAdaptor>(
        adaptor: &mut A,
        val: A::ValueRef,
        info: &ValueInfo<A::ValueRef>,
    ) -> bool {
        if adaptor.has_attached_metadata(val) {
            log::trace!("{:?} already has metadata", val);
            return false;
        }
        adaptor.attach_metadata(val, Self::record(info));
        true
    }

    /// Flush every queued value; returns the number of records written.
    pub fn flush_queue<A: IrAdaptor>(
        adaptor: &mut A,
        queue: &ConversionQueue<A::ValueRef>,
    ) -> usize {
        queue
            .iter()
            .filter(|(val, info)| Self::flush(adaptor, *val, info))
            .count()
    }

    /// Remove every annotation marker call; returns how many were erased.
    pub fn erase_annotation_markers<A: IrAdaptor>(adaptor: &mut A) -> InitResult<usize> {
        let mut markers = Vec::new();
        for func in adaptor.funcs() {
            if !adaptor.func_has_body(func) || adaptor.func_is_intrinsic(func) {
                continue;
            }
            for inst in adaptor.func_insts(func) {
                if adaptor.annotation_marker(inst)?.is_some() {
                    markers.push(inst);
                }
            }
        }

        for &marker in &markers {
            adaptor.erase_instruction(marker);
        }
        log::debug!("erased {} annotation markers", markers.len());
        Ok(markers.len())
    }
}

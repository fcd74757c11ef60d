// This module hosts the propagation engine and the pass driver tying its stages together. The
// driver collects the annotated roots, builds the module-wide conversion queue, attaches the
// resulting records to every discovered value, specializes callees reached with annotated
// arguments (writing the records of each clone as it goes) and finally erases the annotation
// marker calls. All state of a run lives in an InitSession that is turned into the report
// returned to the caller.

//! Annotation propagation and function specialization.
//!
//! - [`roots`]: finding annotated values
//! - [`queue`]: the fixpoint conversion queue builder
//! - [`specialize`]: per call context function cloning
//! - [`writer`]: attaching records and removing annotation markers

pub mod queue;
pub mod roots;
pub mod specialize;
pub mod value_info;
pub mod writer;

pub use queue::{ConversionQueue, ConversionQueueBuilder};
pub use roots::{RootCollector, RootList, RootSet};
pub use specialize::FunctionSpecializer;
pub use value_info::{ValueInfo, INFINITE_DISTANCE};
pub use writer::MetadataWriter;

use crate::core::{InitConfig, InitReport, InitResult, InitSession, IrAdaptor};

/// Everything a run produces: the report and the module-wide queue.
#[derive(Debug)]
pub struct InitOutput<V: Ord> {
    pub report: InitReport,
    pub queue: ConversionQueue<V>,
}

/// The initialization pass.
#[derive(Debug, Clone, Default)]
pub struct TaffoInitializer {
    config: InitConfig,
}

impl TaffoInitializer {
    pub fn new(config: InitConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &InitConfig {
        &self.config
    }

    /// Run the pass over the program behind `adaptor`.
    pub fn run<A: IrAdaptor>(&self, adaptor: &mut A) -> InitResult<InitReport> {
        Ok(self.run_with_queue(adaptor)?.report)
    }

    /// Like [`run`](Self::run), also handing back the module-wide queue.
    pub fn run_with_queue<A: IrAdaptor>(
        &self,
        adaptor: &mut A,
    ) -> InitResult<InitOutput<A::ValueRef>> {
        self.config.validate()?;
        log::debug!(
            "default layout {} bits, {} fractional",
            self.config.fixp_bits,
            self.config.fixp_frac_bits
        );
        let mut session = InitSession::new(self.config.clone());

        let mut roots = RootCollector::new(&*adaptor).collect(&mut session)?;
        let starting_points: Vec<_> = roots.functions_with_locals().collect();
        for func in starting_points {
            adaptor.mark_starting_point(func);
        }
        session.stats_mut().roots = roots.len();

        let queue = ConversionQueueBuilder::new(&*adaptor).build(roots.all_roots());
        session.stats_mut().queue_len = queue.len();
        log::info!("module conversion queue holds {} values", queue.len());

        let written = MetadataWriter::flush_queue(adaptor, &queue);
        session.stats_mut().metadata_written += written;

        if self.config.specialize {
            FunctionSpecializer::<A>::new(&mut roots, &mut session)
                .specialize_callees(adaptor, &queue)?;
            log::info!(
                "{} clones created, {} reused",
                session.stats().clones_created,
                session.stats().clones_reused
            );
        }

        if self.config.erase_markers {
            session.stats_mut().markers_erased = MetadataWriter::erase_annotation_markers(adaptor)?;
        }

        Ok(InitOutput {
            report: session.into_report(),
            queue,
        })
    }
}

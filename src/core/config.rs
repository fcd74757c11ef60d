//! Pass configuration.

use super::error::{InitError, InitResult};

/// Knobs of one initialization run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitConfig {
    /// Clone callees reached with annotated arguments.
    pub specialize: bool,
    /// Erase annotation marker calls once metadata is attached.
    pub erase_markers: bool,
    /// Suffix appended to the name of specialized clones.
    pub clone_suffix: String,
    /// Default fixed-point width for the conversion stage. Range-only
    /// records stay typeless; the layout is only checked here.
    pub fixp_bits: u32,
    /// Fractional part of the default layout.
    pub fixp_frac_bits: u32,
}

impl InitConfig {
    pub fn validate(&self) -> InitResult<()> {
        if self.fixp_bits == 0 || self.fixp_frac_bits > self.fixp_bits {
            return Err(InitError::InvalidConfig {
                reason: format!(
                    "default layout of {} bits cannot hold {} fractional bits",
                    self.fixp_bits, self.fixp_frac_bits
                ),
            });
        }
        if self.clone_suffix.is_empty() {
            return Err(InitError::InvalidConfig {
                reason: "clone suffix is empty".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for InitConfig {
    fn default() -> Self {
        Self {
            specialize: true,
            erase_markers: true,
            clone_suffix: "fixp".to_string(),
            fixp_bits: 32,
            fixp_frac_bits: 16,
        }
    }
}

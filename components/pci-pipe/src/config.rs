//! Pipe set configuration
//!
//! The host copy-engine table plus the pipe-layer knobs. The built-in table
//! describes the QCA988x family; other parts load theirs from TOML:
//!
//! ```toml
//! rx_post_retry_ms = 50
//! diag_pipe = 7
//!
//! [[pipe]]
//! src_nentries = 16
//! src_sz_max = 256
//!
//! [[pipe]]
//! src_sz_max = 2048
//! dest_nentries = 512
//! ```

use core::time::Duration;

use copy_engine::{CeAttr, CeConfig};
use serde::{Deserialize, Serialize};
use static_assertions::const_assert;

use crate::{PipeError, Result};

/// Number of copy engines on QCA988x
pub const CE_COUNT: usize = 8;

/// Copy engine reserved for the diagnostic window
pub const CE_DIAG_PIPE: usize = 7;

/// Delay before re-driving receive replenishment after exhaustion
pub const RX_POST_RETRY_MS: u64 = 50;

/// Host-side copy engine table for QCA988x
pub const QCA988X_HOST_CE: [CeConfig; CE_COUNT] = [
    // CE0: host->target HTC control and raw streams
    CeConfig::new(CeAttr::empty(), 16, 256, 0),
    // CE1: target->host HTT + HTC control
    CeConfig::new(CeAttr::empty(), 0, 2048, 512),
    // CE2: target->host WMI
    CeConfig::new(CeAttr::empty(), 0, 2048, 128),
    // CE3: host->target WMI
    CeConfig::new(CeAttr::empty(), 32, 2048, 0),
    // CE4: host->target HTT, completions polled
    CeConfig::new(CeAttr::DISABLE_INTR, 4096, 256, 0),
    // CE5: unused
    CeConfig::UNUSED,
    // CE6: target autonomous memcpy, not driven by the host
    CeConfig::UNUSED,
    // CE7: diagnostic window
    CeConfig::new(CeAttr::DISABLE_INTR, 2, 2048, 2),
];

const_assert!(CE_DIAG_PIPE < CE_COUNT);
const_assert!(QCA988X_HOST_CE[CE_DIAG_PIPE].src_nentries > 0);
const_assert!(QCA988X_HOST_CE[1].dest_nentries.is_power_of_two());
const_assert!(QCA988X_HOST_CE[2].dest_nentries.is_power_of_two());
const_assert!(QCA988X_HOST_CE[4].src_nentries.is_power_of_two());

fn default_retry_ms() -> u64 {
    RX_POST_RETRY_MS
}

/// Configuration of one pipe set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipeSetConfig {
    /// Replenish retry delay in milliseconds
    #[serde(default = "default_retry_ms")]
    pub rx_post_retry_ms: u64,

    /// Pipe that carries the diagnostic window; never gets buffers
    #[serde(default)]
    pub diag_pipe: Option<usize>,

    /// One entry per copy engine, in engine order
    #[serde(default, rename = "pipe")]
    pub pipes: Vec<CeConfig>,
}

impl PipeSetConfig {
    /// Built-in QCA988x table
    pub fn qca988x() -> Self {
        Self {
            rx_post_retry_ms: RX_POST_RETRY_MS,
            diag_pipe: Some(CE_DIAG_PIPE),
            pipes: QCA988X_HOST_CE.to_vec(),
        }
    }

    /// Parse and validate a TOML pipe table
    ///
    /// # Errors
    /// Returns `PipeError::Config` on parse or validation failure
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| PipeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the table for entries the pipe layer cannot drive
    pub fn validate(&self) -> Result<()> {
        if self.pipes.is_empty() {
            return Err(PipeError::Config("no pipes configured".into()));
        }
        if self.rx_post_retry_ms == 0 {
            return Err(PipeError::Config("rx_post_retry_ms must be non-zero".into()));
        }
        if let Some(diag) = self.diag_pipe {
            if diag >= self.pipes.len() {
                return Err(PipeError::Config(format!(
                    "diag_pipe {} out of range ({} pipes)",
                    diag,
                    self.pipes.len()
                )));
            }
        }

        for (i, ce) in self.pipes.iter().enumerate() {
            let depths = [
                ("src_nentries", ce.src_nentries),
                ("dest_nentries", ce.dest_nentries),
            ];
            for (name, depth) in depths {
                if depth != 0 && !depth.is_power_of_two() {
                    return Err(PipeError::Config(format!(
                        "pipe {}: {} = {} is not a power of two",
                        i, name, depth
                    )));
                }
            }
            if ce.dest_nentries > 0 && ce.src_sz_max == 0 && !self.is_diag(i) {
                return Err(PipeError::Config(format!(
                    "pipe {}: receive ring without a buffer size",
                    i
                )));
            }
        }
        Ok(())
    }

    /// Get the replenish retry delay
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.rx_post_retry_ms)
    }

    /// Check if `pipe` is the diagnostic pipe
    pub fn is_diag(&self, pipe: usize) -> bool {
        self.diag_pipe == Some(pipe)
    }
}

impl Default for PipeSetConfig {
    fn default() -> Self {
        Self::qca988x()
    }
}

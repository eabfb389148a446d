//! Optional matching accelerator with CPU fallback
//!
//! [`AcceleratedMatcher`] wraps any [`Accelerator`] device. It connects to the
//! device once, uploads template buffers lazily and caches them per
//! ability key. After the first device failure it switches to the CPU path
//! for good. The wgpu device lives in `gpu.rs` behind the `gpu` feature.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use hashbrown::HashMap;
use rotascope_types::DetectionSettings;
use tracing::{debug, warn};

use super::error::{AcceleratorError, DetectionError};
use super::frame::Frame;
use super::geometry::Rect;
use super::matcher::{CpuMatcher, MatchBackend, MatchScore, check_search_area};
use super::template::PreparedTemplate;

/// A device that can match prepared templates against frames.
pub trait Accelerator: Send + Sync {
    /// Device-resident copy of one template.
    type Buffer: Send + Sync;

    fn name(&self) -> &'static str;

    /// Check the device is present and usable. Called at most once.
    fn connect(&self) -> Result<(), AcceleratorError>;

    fn upload(&self, template: &PreparedTemplate) -> Result<Self::Buffer, AcceleratorError>;

    /// Same contract as [`MatchBackend::best_match`]; `search` is already
    /// validated against the frame and template.
    fn match_template(
        &self,
        frame: &Frame,
        buffer: &Self::Buffer,
        search: Rect,
    ) -> Result<MatchScore, AcceleratorError>;
}

pub struct AcceleratedMatcher<A: Accelerator> {
    device: A,
    connected: OnceLock<Result<(), AcceleratorError>>,
    buffers: RwLock<HashMap<String, Arc<A::Buffer>>>,
    disabled: AtomicBool,
    fallback: CpuMatcher,
}

impl<A: Accelerator> AcceleratedMatcher<A> {
    pub fn new(device: A) -> Self {
        Self {
            device,
            connected: OnceLock::new(),
            buffers: RwLock::new(HashMap::new()),
            disabled: AtomicBool::new(false),
            fallback: CpuMatcher,
        }
    }

    /// True once the accelerator has been switched off for good.
    pub fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::Acquire)
    }

    /// Number of templates currently resident on the device.
    pub fn cached_buffers(&self) -> usize {
        self.buffers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn disable(&self, error: &AcceleratorError) {
        if !self.disabled.swap(true, Ordering::AcqRel) {
            warn!(device = self.device.name(), error = %error, "Accelerator disabled, using CPU matching");
            self.buffers
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .clear();
        }
    }

    fn buffer_for(&self, template: &PreparedTemplate) -> Result<Arc<A::Buffer>, AcceleratorError> {
        if let Some(buffer) = self
            .buffers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&template.key)
        {
            return Ok(Arc::clone(buffer));
        }

        let buffer = Arc::new(self.device.upload(template)?);
        self.buffers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(template.key.clone(), Arc::clone(&buffer));
        Ok(buffer)
    }

    fn try_device(
        &self,
        frame: &Frame,
        template: &PreparedTemplate,
        search: Rect,
    ) -> Result<MatchScore, AcceleratorError> {
        self.connected
            .get_or_init(|| self.device.connect())
            .clone()?;
        let buffer = self.buffer_for(template)?;
        self.device.match_template(frame, &buffer, search)
    }
}

/// Backend picked from `settings`: the wgpu device when the accelerator is
/// enabled and compiled in, the CPU matcher otherwise.
pub fn backend_for(settings: &DetectionSettings) -> Box<dyn MatchBackend> {
    if settings.use_accelerator {
        #[cfg(feature = "gpu")]
        {
            debug!("Using wgpu matching with CPU fallback");
            return Box::new(AcceleratedMatcher::new(super::gpu::WgpuDevice::new()));
        }
        #[cfg(not(feature = "gpu"))]
        debug!("Built without the gpu feature, using CPU matching");
    }
    Box::new(CpuMatcher)
}

impl<A: Accelerator> MatchBackend for AcceleratedMatcher<A> {
    fn name(&self) -> &'static str {
        self.device.name()
    }

    fn invalidate(&self) {
        self.buffers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn best_match(
        &self,
        frame: &Frame,
        template: &PreparedTemplate,
        search: Rect,
    ) -> Result<MatchScore, DetectionError> {
        // Geometry faults are the caller's, not the device's
        check_search_area(frame, template, search)?;

        if !self.is_disabled() {
            match self.try_device(frame, template, search) {
                Ok(score) => return Ok(score),
                Err(e) => self.disable(&e),
            }
        }
        self.fallback.best_match(frame, template, search)
    }
}

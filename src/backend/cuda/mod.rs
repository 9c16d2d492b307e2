//! CUDA accelerated backend.
//!
//! Scan kernels are compiled at first use with NVRTC from macro-templated
//! sources (one per structure), specialized by scalar width, semiring and
//! fan-in, and cached per device handle. All state lives in the handle;
//! there is no process-wide device or module cache.
//!
//! The kernels run the recurrence in the log domain, where it is stable
//! without rescaling, so the checkpoint interval is ignored here; that
//! only changes rounding, never the mathematical result. The semiring
//! zero is clamped to a large negative constant on the device to keep
//! `exp` arithmetic free of infinities.

use std::any::TypeId;
use std::cell::RefCell;
use std::collections::HashSet;
use std::sync::Arc;

use cudarc::driver::{CudaDevice, CudaFunction, DeviceRepr, LaunchAsync, LaunchConfig};
use cudarc::nvrtc::compile_ptx;

use super::{Backend, KernelKey, Structure};
use crate::algebra::{Precision, Scalar, Semiring, SemiringKind};
use crate::chain::{DenseSeq, SparseSeq};
use crate::error::{Error, Result};
use crate::scan::ScanOptions;

const DENSE_SRC: &str = include_str!("dense_scan.cu");
const SPARSE_SRC: &str = include_str!("sparse_scan.cu");

/// Device limit on threads per block.
const MAX_BLOCK: usize = 1024;

/// CUDA backend handle.
///
/// Holds the device and the set of loaded kernel modules. The
/// `granularity` knob assigns several target states to each thread,
/// trading occupancy for per-thread work; it never changes results
/// beyond floating-point rounding.
pub struct Cuda {
    device: Arc<CudaDevice>,
    loaded: RefCell<HashSet<String>>,
    granularity: usize,
}

impl Cuda {
    /// Open the default device (ordinal 0).
    pub fn new() -> Result<Self> {
        Self::on_device(0)
    }

    /// Open a specific device.
    pub fn on_device(ordinal: usize) -> Result<Self> {
        let device = CudaDevice::new(ordinal).map_err(|e| Error::Device(e.to_string()))?;
        Ok(Self {
            device,
            loaded: RefCell::new(HashSet::new()),
            granularity: 1,
        })
    }

    /// Set the states-per-thread granularity.
    ///
    /// # Panics
    ///
    /// Panics if `k` is zero.
    pub fn with_granularity(mut self, k: usize) -> Self {
        assert!(k > 0, "granularity must be nonzero");
        self.granularity = k;
        self
    }

    /// Underlying device handle.
    pub fn device(&self) -> &Arc<CudaDevice> {
        &self.device
    }

    fn block_dim(&self, states: usize) -> Result<u32> {
        let block = states.div_ceil(self.granularity).max(1);
        if block > MAX_BLOCK {
            return Err(Error::Device(format!(
                "{} states / granularity {} needs {} threads per block (limit {})",
                states, self.granularity, block, MAX_BLOCK
            )));
        }
        Ok(block as u32)
    }

    /// Compile and load a specialized kernel module on first use.
    fn func(
        &self,
        module: &str,
        fname: &'static str,
        src: &str,
        subs: &[(&str, String)],
    ) -> Result<CudaFunction> {
        if !self.loaded.borrow().contains(module) {
            let mut code = src.to_string();
            for (token, value) in subs {
                code = code.replace(token, value);
            }
            let ptx = compile_ptx(code).map_err(|e| Error::Device(e.to_string()))?;
            self.device
                .load_ptx(ptx, module, &[fname])
                .map_err(|e| Error::Device(e.to_string()))?;
            self.loaded.borrow_mut().insert(module.to_string());
        }
        self.device
            .get_func(module, fname)
            .ok_or_else(|| Error::Device(format!("kernel {} missing from module {}", fname, module)))
    }

    #[allow(clippy::too_many_arguments)]
    fn launch_dense<T>(
        &self,
        steps: usize,
        batch: usize,
        states: usize,
        data: &[T],
        alpha: &mut [T],
        float_ty: &'static str,
        sum_fn: &'static str,
    ) -> Result<()>
    where
        T: Scalar + DeviceRepr,
    {
        let module = format!("dense_{}_{}", sum_fn, float_ty);
        let subs = [
            ("FLOAT", float_ty.to_string()),
            ("SUM", sum_fn.to_string()),
            ("MUL", "add2".to_string()),
            ("ZERO", "-1.0e38".to_string()),
        ];
        let func = self.func(&module, "dense_scan", DENSE_SRC, &subs)?;

        let d_ms = self
            .device
            .htod_sync_copy(data)
            .map_err(|e| Error::Device(e.to_string()))?;
        let mut d_alpha = self
            .device
            .htod_sync_copy(alpha)
            .map_err(|e| Error::Device(e.to_string()))?;

        let cfg = LaunchConfig {
            grid_dim: (batch as u32, 1, 1),
            block_dim: (self.block_dim(states)?, 1, 1),
            shared_mem_bytes: (2 * states * std::mem::size_of::<T>()) as u32,
        };
        unsafe {
            func.launch(
                cfg,
                (
                    &mut d_alpha,
                    &d_ms,
                    steps as i32,
                    batch as i32,
                    states as i32,
                ),
            )
        }
        .map_err(|e| Error::Device(e.to_string()))?;

        let host = self
            .device
            .dtoh_sync_copy(&d_alpha)
            .map_err(|e| Error::Device(e.to_string()))?;
        alpha.copy_from_slice(&host);
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn launch_sparse<T>(
        &self,
        steps: usize,
        batch: usize,
        states: usize,
        nz: usize,
        data: &[T],
        idx: &[u32],
        alpha: &mut [T],
        float_ty: &'static str,
        sum_fn: &'static str,
    ) -> Result<()>
    where
        T: Scalar + DeviceRepr,
    {
        let module = format!("sparse_{}_{}_nz{}", sum_fn, float_ty, nz);
        let subs = [
            ("FLOAT", float_ty.to_string()),
            ("SUM", sum_fn.to_string()),
            ("MUL", "add2".to_string()),
            ("ZERO", "-1.0e38".to_string()),
            ("NZ_FANIN", nz.to_string()),
        ];
        let func = self.func(&module, "sparse_scan", SPARSE_SRC, &subs)?;

        let idx_i32: Vec<i32> = idx.iter().map(|&v| v as i32).collect();
        let d_ms = self
            .device
            .htod_sync_copy(data)
            .map_err(|e| Error::Device(e.to_string()))?;
        let d_idx = self
            .device
            .htod_sync_copy(&idx_i32)
            .map_err(|e| Error::Device(e.to_string()))?;
        let mut d_alpha = self
            .device
            .htod_sync_copy(alpha)
            .map_err(|e| Error::Device(e.to_string()))?;

        let cfg = LaunchConfig {
            grid_dim: (batch as u32, 1, 1),
            block_dim: (self.block_dim(states)?, 1, 1),
            shared_mem_bytes: (2 * states * std::mem::size_of::<T>()) as u32,
        };
        unsafe {
            func.launch(
                cfg,
                (
                    &mut d_alpha,
                    &d_ms,
                    &d_idx,
                    steps as i32,
                    batch as i32,
                    states as i32,
                ),
            )
        }
        .map_err(|e| Error::Device(e.to_string()))?;

        let host = self
            .device
            .dtoh_sync_copy(&d_alpha)
            .map_err(|e| Error::Device(e.to_string()))?;
        alpha.copy_from_slice(&host);
        Ok(())
    }
}

/// Device reduction function for a semiring.
fn sum_fn(kind: SemiringKind) -> &'static str {
    match kind {
        SemiringKind::Log => "logsumexp2",
        SemiringKind::Max => "max2",
    }
}

/// Device scalar type name for a precision.
fn float_ty(precision: Precision) -> &'static str {
    match precision {
        Precision::Single => "float",
        Precision::Double => "double",
    }
}

impl Backend for Cuda {
    fn name(&self) -> &'static str {
        "cuda"
    }

    fn supports(&self, _key: KernelKey) -> bool {
        // the templated kernel family covers the full key space:
        // {f32, f64} x {Log, Max} x {dense, sparse}
        true
    }

    fn dense_forward<S: Semiring>(
        &self,
        seq: &DenseSeq<S::Scalar>,
        alpha: &mut [S::Scalar],
        _carry: &mut [S::Scalar],
        _options: &ScanOptions,
    ) -> Result<()> {
        let key = KernelKey::of::<S>(Structure::Dense);
        let (ft, sf) = (float_ty(key.precision), sum_fn(key.semiring));
        if TypeId::of::<S::Scalar>() == TypeId::of::<f32>() {
            self.launch_dense::<f32>(
                seq.steps(),
                seq.batch(),
                seq.states(),
                bytemuck::cast_slice(seq.data()),
                bytemuck::cast_slice_mut(alpha),
                ft,
                sf,
            )
        } else if TypeId::of::<S::Scalar>() == TypeId::of::<f64>() {
            self.launch_dense::<f64>(
                seq.steps(),
                seq.batch(),
                seq.states(),
                bytemuck::cast_slice(seq.data()),
                bytemuck::cast_slice_mut(alpha),
                ft,
                sf,
            )
        } else {
            Err(Error::Unsupported {
                backend: self.name(),
                key,
            })
        }
    }

    fn sparse_forward<S: Semiring>(
        &self,
        seq: &SparseSeq<S::Scalar>,
        alpha: &mut [S::Scalar],
    ) -> Result<()> {
        let key = KernelKey::of::<S>(Structure::Sparse);
        let (ft, sf) = (float_ty(key.precision), sum_fn(key.semiring));
        if TypeId::of::<S::Scalar>() == TypeId::of::<f32>() {
            self.launch_sparse::<f32>(
                seq.steps(),
                seq.batch(),
                seq.states(),
                seq.nz(),
                bytemuck::cast_slice(seq.data()),
                seq.index().entries(),
                bytemuck::cast_slice_mut(alpha),
                ft,
                sf,
            )
        } else if TypeId::of::<S::Scalar>() == TypeId::of::<f64>() {
            self.launch_sparse::<f64>(
                seq.steps(),
                seq.batch(),
                seq.states(),
                seq.nz(),
                bytemuck::cast_slice(seq.data()),
                seq.index().entries(),
                bytemuck::cast_slice_mut(alpha),
                ft,
                sf,
            )
        } else {
            Err(Error::Unsupported {
                backend: self.name(),
                key,
            })
        }
    }
}

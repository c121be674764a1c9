//! Local executable invoker.
//!
//! A [`LocalExecutable`] is a set of compiled entry points that run on the
//! host. The invoker is the leaf unit of work of every dispatch task: it calls
//! one entry point for one workgroup with the dispatch's bindings and push
//! constants. Kernel errors become [`HalError::DispatchFailed`] and fail the
//! fragment that issued the call.

use crate::buffer::BufferBinding;
use std::fmt;
use taskhal_core::{HalError, Result};

/// Arguments of one workgroup invocation.
#[derive(Debug, Clone, Copy)]
pub struct ExecutableCall<'a> {
    /// Coordinates of this workgroup.
    pub workgroup_id: [u32; 3],
    /// Invocations per workgroup declared by the entry point.
    pub workgroup_size: [u32; 3],
    /// Total workgroups of the dispatch.
    pub workgroup_count: [u32; 3],
    /// Push constants recorded with the dispatch.
    pub push_constants: &'a [u32],
    /// Buffer ranges bound to the dispatch, in binding order.
    pub bindings: &'a [BufferBinding],
}

impl ExecutableCall<'_> {
    /// Row-major linear index of this workgroup.
    pub fn linear_workgroup_id(&self) -> u64 {
        let [x, y, z] = self.workgroup_id.map(u64::from);
        let [cx, cy, _] = self.workgroup_count.map(u64::from);
        x + cx * (y + cy * z)
    }

    /// Push constant `index`, if recorded.
    pub fn push_constant(&self, index: usize) -> Option<u32> {
        self.push_constants.get(index).copied()
    }

    /// Binding `index`, if bound.
    pub fn binding(&self, index: usize) -> Option<&BufferBinding> {
        self.bindings.get(index)
    }
}

/// Compiled entry points executable on the host.
///
/// Implementations must be callable from many workers at once; the only
/// shared mutable state across calls is the memory behind the bindings.
pub trait LocalExecutable: Send + Sync {
    /// Name used in errors and logs.
    fn name(&self) -> &str;

    /// Number of entry points.
    fn entry_point_count(&self) -> usize;

    /// Invocations per workgroup of entry point `ordinal`.
    fn workgroup_size(&self, ordinal: usize) -> [u32; 3];

    /// Run entry point `ordinal` for one workgroup.
    fn issue_call(&self, ordinal: usize, call: &ExecutableCall<'_>) -> anyhow::Result<()>;
}

/// Invoke one workgroup of `executable`.
///
/// Validates the ordinal and the workgroup coordinates, then runs the entry
/// point. Any kernel error is reported as [`HalError::DispatchFailed`].
pub fn issue_call(
    executable: &dyn LocalExecutable,
    ordinal: usize,
    workgroup_id: [u32; 3],
    workgroup_count: [u32; 3],
    bindings: &[BufferBinding],
    push_constants: &[u32],
) -> Result<()> {
    let count = executable.entry_point_count();
    if ordinal >= count {
        return Err(HalError::InvalidEntryPoint {
            executable: executable.name().to_string(),
            ordinal,
            count,
        });
    }
    if workgroup_id
        .iter()
        .zip(workgroup_count.iter())
        .any(|(id, count)| id >= count)
    {
        return Err(HalError::InvalidRecording {
            cause: format!(
                "workgroup {:?} outside workgroup count {:?}",
                workgroup_id, workgroup_count
            ),
        });
    }

    let call = ExecutableCall {
        workgroup_id,
        workgroup_size: executable.workgroup_size(ordinal),
        workgroup_count,
        push_constants,
        bindings,
    };
    executable
        .issue_call(ordinal, &call)
        .map_err(|err| HalError::DispatchFailed {
            executable: executable.name().to_string(),
            ordinal,
            workgroup: workgroup_id,
            cause: format!("{:#}", err),
        })
}

type KernelFn = dyn Fn(&ExecutableCall<'_>) -> anyhow::Result<()> + Send + Sync;

struct EntryPoint {
    name: String,
    workgroup_size: [u32; 3],
    kernel: Box<KernelFn>,
}

/// A [`LocalExecutable`] assembled from Rust closures.
///
/// # Example
///
/// ```
/// use taskhal_executor::executable::KernelLibrary;
///
/// let library = KernelLibrary::new("math").with_entry_point("double", [64, 1, 1], |call| {
///     let data = call.binding(0).ok_or_else(|| anyhow::anyhow!("missing binding"))?;
///     let index = call.linear_workgroup_id() as usize;
///     if let Some(value) = data.load_u32(index) {
///         data.store_u32(index, value * 2);
///     }
///     Ok(())
/// });
/// assert_eq!(library.entry_point_ordinal("double"), Some(0));
/// ```
pub struct KernelLibrary {
    name: String,
    entry_points: Vec<EntryPoint>,
}

impl KernelLibrary {
    /// Create an empty library.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entry_points: Vec::new(),
        }
    }

    /// Append an entry point. Its ordinal is the number of entry points
    /// added before it.
    pub fn with_entry_point<F>(
        mut self,
        name: impl Into<String>,
        workgroup_size: [u32; 3],
        kernel: F,
    ) -> Self
    where
        F: Fn(&ExecutableCall<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.entry_points.push(EntryPoint {
            name: name.into(),
            workgroup_size,
            kernel: Box::new(kernel),
        });
        self
    }

    /// Look up an entry point by name.
    pub fn entry_point_ordinal(&self, name: &str) -> Option<usize> {
        self.entry_points.iter().position(|e| e.name == name)
    }
}

impl LocalExecutable for KernelLibrary {
    fn name(&self) -> &str {
        &self.name
    }

    fn entry_point_count(&self) -> usize {
        self.entry_points.len()
    }

    fn workgroup_size(&self, ordinal: usize) -> [u32; 3] {
        self.entry_points
            .get(ordinal)
            .map(|e| e.workgroup_size)
            .unwrap_or([1, 1, 1])
    }

    fn issue_call(&self, ordinal: usize, call: &ExecutableCall<'_>) -> anyhow::Result<()> {
        let entry = self
            .entry_points
            .get(ordinal)
            .ok_or_else(|| anyhow::anyhow!("no entry point {}", ordinal))?;
        (entry.kernel)(call)
    }
}

impl fmt::Debug for KernelLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.entry_points.iter().map(|e| e.name.as_str()).collect();
        f.debug_struct("KernelLibrary")
            .field("name", &self.name)
            .field("entry_points", &names)
            .finish()
    }
}

//! WGSL kernel synthesis and dispatch planning.
//!
//! Every compute kernel in this crate is assembled from the same template:
//! a uniform parameter block at binding 0 (a `shapes` vector plus an optional
//! caller-defined parameter struct), then one storage binding per read-only
//! buffer, then one per read-write buffer, a caller-supplied body, and a
//! `main` entry that forwards the global invocation coordinate.
//!
//! Dispatch planning splits the fixed workgroup size evenly across the
//! requested number of axes and launches enough workgroups on every axis to
//! cover the problem, leaving edge threads idle.

/// Total invocations per workgroup; every dispatch grid is derived from it
/// and tensor buffers are rounded up to it.
pub const OPTIMAL_WORKGROUP_SIZE: u32 = 64;

/// Highest dimensionality a dispatch can have.
pub const MAX_WORKGROUP_DIM: usize = 3;

/// How many axes a kernel's problem space spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkgroupDimension {
    One = 1,
    Two = 2,
    Three = 3,
}

impl WorkgroupDimension {
    pub fn count(self) -> u32 {
        self as u32
    }
}

/// Per-axis workgroup extent for a `dims`-dimensional dispatch: the
/// `dims`-th root of [`OPTIMAL_WORKGROUP_SIZE`], so the extents multiply
/// back to the full workgroup size (64 -> 8x8 -> 4x4x4).
pub fn workgroup_axis_extent(dims: u32) -> u32 {
    let extent = (OPTIMAL_WORKGROUP_SIZE as f64).powf(1.0 / dims as f64).round() as u32;
    debug_assert_eq!(extent.pow(dims), OPTIMAL_WORKGROUP_SIZE);
    extent
}

/// The `@workgroup_size(...)` argument list for the given dimensionality.
pub fn workgroup_extents_wgsl(dims: WorkgroupDimension) -> String {
    let extent = workgroup_axis_extent(dims.count());
    let extents: Vec<String> = (0..dims.count()).map(|_| extent.to_string()).collect();
    extents.join(", ")
}

/// Number of workgroups to launch per axis so the grid covers the whole
/// problem: `ceil(size / extent)` on each given axis, `1` on unused axes.
pub fn dispatch_grid(problem: &[u32]) -> [u32; 3] {
    assert!(
        !problem.is_empty() && problem.len() <= MAX_WORKGROUP_DIM,
        "dispatch must span between 1 and {MAX_WORKGROUP_DIM} axes"
    );
    let extent = workgroup_axis_extent(problem.len() as u32);
    let mut grid = [1u32; 3];
    for (axis, &size) in problem.iter().enumerate() {
        grid[axis] = size.div_ceil(extent).max(1);
    }
    grid
}

/// Assembles a complete compute kernel.
///
/// Binding slots are assigned in fixed order: slot 0 is the uniform block,
/// then one slot per read-only buffer in the order given, then one per
/// read-write buffer. `params_struct`, when present, must declare a WGSL
/// struct named `Params`; it is embedded verbatim and exposed to the body as
/// `uniforms.params`. The body must define `entry_point(pos: vec3<u32>)`.
pub fn generate_kernel_source(
    read_names: &[&str],
    write_names: &[&str],
    dims: WorkgroupDimension,
    body: &str,
    entry_point: &str,
    params_struct: Option<&str>,
) -> String {
    let mut bindings = String::new();
    let mut slot = 1;
    for name in read_names {
        bindings.push_str(&format!(
            "@group(0) @binding({slot}) var<storage, read> {name}: array<f32>;\n"
        ));
        slot += 1;
    }
    for name in write_names {
        bindings.push_str(&format!(
            "@group(0) @binding({slot}) var<storage, read_write> {name}: array<f32>;\n"
        ));
        slot += 1;
    }

    let params_def = params_struct.unwrap_or("");
    let params_field = if params_struct.is_some() {
        "    params: Params,\n"
    } else {
        ""
    };
    let extents = workgroup_extents_wgsl(dims);

    format!(
        r#"{params_def}
struct Uniforms {{
    shapes: vec4<f32>,
{params_field}}}

@group(0) @binding(0) var<uniform> uniforms: Uniforms;
{bindings}
{body}

@compute @workgroup_size({extents})
fn main(@builtin(global_invocation_id) global_id: vec3<u32>) {{
    {entry_point}(global_id);
}}
"#
    )
}

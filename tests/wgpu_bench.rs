#![cfg(feature = "backend_wgpu")]
/*!
Learning against a real adapter, if there is one.

The kernel is a copy, not an FFT; this only checks that programs build, dispatch and time.
*/

use fft_wisdom::device::{Device, DeviceError};
use fft_wisdom::imp::WgpuDevice;
use fft_wisdom::parameters::{Mode, Parameters, Performance, Precision, Target};
use fft_wisdom::wisdom::{BenchParams, PassDescriptor, SearchSpace, Wisdom};
use std::sync::Arc;

fn copy_kernel(parameters: &Parameters) -> String {
    format!(
        r#"
struct Uniforms {{
    p: u32,
    offset: vec2<f32>,
    scale: vec2<f32>,
}}

@group(0) @binding(0) var<storage, read> input: array<vec2<f32>>;
@group(0) @binding(1) var<storage, read_write> output: array<vec2<f32>>;
@group(0) @binding(2) var<uniform> uniforms: Uniforms;

@compute @workgroup_size({x}, {y}, {z})
fn main(@builtin(global_invocation_id) id: vec3<u32>, @builtin(num_workgroups) groups: vec3<u32>) {{
    let width = groups.x * {x}u;
    let i = id.x + id.y * width;
    if (i < arrayLength(&output) && i < arrayLength(&input)) {{
        output[i] = input[i] * uniforms.scale + uniforms.offset * f32(uniforms.p);
    }}
}}
"#,
        x = parameters.workgroup_size_x,
        y = parameters.workgroup_size_y,
        z = parameters.workgroup_size_z,
    )
}

#[cfg(not(target_arch = "wasm32"))]
#[test]
fn learns_on_real_adapter() {
    let device = match WgpuDevice::new(copy_kernel) {
        Ok(device) => device,
        Err(DeviceError::NoSuchAdapter) => {
            eprintln!("no adapter; skipping");
            return;
        }
        Err(other) => panic!("can't open device: {other}"),
    };
    let device: Arc<dyn Device> = Arc::new(device);

    let mut wisdom = Wisdom::new()
        .with_bench_params(BenchParams::new(1, 2, 4, 1.0))
        .with_search_space(SearchSpace {
            shared_banked: vec![false],
            vector_sizes: vec![2],
            workgroup_sizes_x: vec![8],
            workgroup_sizes_y: vec![1],
            radices: vec![4],
        });
    let pass = PassDescriptor::new(
        256,
        1,
        4,
        Mode::Horizontal,
        Target::Ssbo,
        Target::Ssbo,
        Precision::default(),
    );
    let (cost, performance) = wisdom.learn_optimal_options(&device, pass).unwrap();
    assert!(cost.is_finite());
    assert!(cost >= 0.0);
    // no static wisdom means only the baseline is measured
    assert_eq!(performance, Performance::default());
}

/*!
Learning wisdom against a simulated Mali GPU.

Costs are powers of two so comparisons between candidates are exact.
*/

use fft_wisdom::device::Device;
use fft_wisdom::imp::SimulatedDevice;
use fft_wisdom::parameters::{Mode, Options, Performance, Precision, Target, TransformType};
use fft_wisdom::wisdom::{BenchParams, PassDescriptor, Wisdom};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

fn quick() -> BenchParams {
    BenchParams::new(1, 2, 2, 10.0)
}

fn mali(
    cost: impl Fn(&fft_wisdom::parameters::Parameters) -> f64 + Send + Sync + 'static,
) -> (Arc<SimulatedDevice>, Arc<dyn Device>) {
    let sim = Arc::new(SimulatedDevice::mali().with_cost_model(move |p, _| cost(p)));
    let device: Arc<dyn Device> = sim.clone();
    (sim, device)
}

fn horizontal(nx: u32, radix: u32) -> PassDescriptor {
    PassDescriptor::new(
        nx,
        1,
        radix,
        Mode::Horizontal,
        Target::Ssbo,
        Target::Ssbo,
        Precision::default(),
    )
}

#[test]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
fn learning_is_memoized() {
    let (sim, device) = mali(|_| 0.25);
    let mut wisdom = Wisdom::for_device(device.as_ref()).with_bench_params(quick());

    let first = wisdom.learn_optimal_options(&device, horizontal(256, 4)).unwrap();
    let dispatches = sim.stats().dispatches;
    assert!(dispatches > 0);

    let second = wisdom.learn_optimal_options(&device, horizontal(256, 4)).unwrap();
    assert_eq!(first, second);
    assert_eq!(sim.stats().dispatches, dispatches);
    assert_eq!(wisdom.store().len(), 1);
}

#[test]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
fn lookup_falls_back_to_base() {
    let wisdom = Wisdom::new();
    let base = Performance {
        workgroup_size_x: 16,
        workgroup_size_y: 2,
        vector_size: 4,
        shared_banked: true,
    };
    let found = wisdom
        .find_optimal_options_or_default(&horizontal(256, 4), &Options::new(base, Precision::default()));
    assert_eq!(found, base);
    assert!(wisdom.find_optimal_options(&horizontal(256, 4)).is_none());
}

#[test]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
fn ties_keep_the_default() {
    let (_sim, device) = mali(|_| 0.25);
    let mut wisdom = Wisdom::for_device(device.as_ref()).with_bench_params(quick());
    let (cost, performance) = wisdom.learn_optimal_options(&device, horizontal(256, 4)).unwrap();
    assert_eq!(cost, 0.25);
    assert_eq!(performance, Performance::default());
}

#[test]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
fn fastest_candidate_wins() {
    let (_sim, device) = mali(|p| {
        if p.workgroup_size_x == 8 && p.vector_size == 4 {
            0.125
        } else {
            0.25
        }
    });
    let mut wisdom = Wisdom::for_device(device.as_ref()).with_bench_params(quick());
    let (cost, performance) = wisdom.learn_optimal_options(&device, horizontal(256, 4)).unwrap();
    assert_eq!(cost, 0.125);
    assert_eq!(
        performance,
        Performance {
            workgroup_size_x: 8,
            workgroup_size_y: 1,
            vector_size: 4,
            shared_banked: false,
        }
    );
}

#[test]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
fn equally_fast_candidates_keep_the_first() {
    let (_sim, device) = mali(|p| match (p.workgroup_size_x, p.vector_size) {
        (8, 4) | (16, 4) => 0.125,
        _ => 0.25,
    });
    let mut wisdom = Wisdom::for_device(device.as_ref()).with_bench_params(quick());
    let (_, performance) = wisdom.learn_optimal_options(&device, horizontal(256, 4)).unwrap();
    assert_eq!(performance.workgroup_size_x, 8);
}

#[test]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
fn slower_candidates_never_replace_the_baseline() {
    let (_sim, device) = mali(|p| if p.vector_size == 2 { 0.125 } else { 0.5 });
    let mut wisdom = Wisdom::for_device(device.as_ref()).with_bench_params(quick());
    let (cost, performance) = wisdom.learn_optimal_options(&device, horizontal(256, 4)).unwrap();
    assert_eq!(cost, 0.125);
    assert_eq!(performance, Performance::default());
}

#[test]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
fn search_respects_hardware_bounds() {
    let seen = Arc::new(Mutex::new(BTreeSet::new()));
    let record = seen.clone();
    let (_sim, device) = mali(move |p| {
        record
            .lock()
            .unwrap()
            .insert((p.workgroup_size_x, p.workgroup_size_y, p.vector_size, p.shared_banked));
        0.25
    });
    let mut wisdom = Wisdom::for_device(device.as_ref()).with_bench_params(quick());
    wisdom.learn_optimal_options(&device, horizontal(256, 4)).unwrap();

    // the baseline, then vector 4 with up to 64 invocations; 64 wide cannot cover 256 points
    let seen: Vec<_> = seen.lock().unwrap().iter().copied().collect();
    assert_eq!(
        seen,
        vec![
            (4, 1, 2, false),
            (4, 1, 4, false),
            (8, 1, 4, false),
            (16, 1, 4, false),
            (32, 1, 4, false),
        ]
    );
}

#[test]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
fn unknown_hardware_only_measures_the_baseline() {
    let sim = Arc::new(SimulatedDevice::new("llvmpipe", 1024).with_cost_model(|_, _| 0.25));
    let device: Arc<dyn Device> = sim.clone();
    let mut wisdom = Wisdom::for_device(device.as_ref()).with_bench_params(quick());
    let (_, performance) = wisdom.learn_optimal_options(&device, horizontal(256, 4)).unwrap();
    assert_eq!(performance, Performance::default());
    assert_eq!(sim.stats().programs_built, 1);
}

#[test]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
fn compile_failures_are_skipped() {
    let sim = Arc::new(
        SimulatedDevice::mali()
            .with_cost_model(|p, _| if p.workgroup_size_x == 16 { 0.125 } else { 0.25 })
            .with_compile_filter(|p| p.workgroup_size_x != 16),
    );
    let device: Arc<dyn Device> = sim.clone();
    let mut wisdom = Wisdom::for_device(device.as_ref()).with_bench_params(quick());
    let (cost, performance) = wisdom.learn_optimal_options(&device, horizontal(256, 4)).unwrap();
    assert_eq!(cost, 0.25);
    assert_ne!(performance.workgroup_size_x, 16);
    assert!(sim.stats().compile_failures > 0);
}

#[test]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
fn default_cost_model_end_to_end() {
    let sim = Arc::new(SimulatedDevice::mali());
    let device: Arc<dyn Device> = sim.clone();
    let mut wisdom = Wisdom::for_device(device.as_ref()).with_bench_params(quick());
    let (cost, performance) = wisdom.learn_optimal_options(&device, horizontal(256, 4)).unwrap();
    assert!(cost.is_finite());
    assert!(cost >= 0.0);
    let bounds = wisdom.static_wisdom();
    assert!(performance.workgroup_size() >= bounds.min_workgroup_size);
    assert!(performance.workgroup_size() <= bounds.max_workgroup_size);

    // nothing leaks once learning is done
    let stats = sim.stats();
    assert_eq!(stats.live_buffers, 0);
    assert_eq!(stats.live_textures, 0);
    assert_eq!(stats.live_programs, 0);
}

#[test]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
fn exhaustive_learning_skips_infeasible_radices() {
    let (_sim, device) = mali(|_| 0.25);
    let mut wisdom = Wisdom::for_device(device.as_ref()).with_bench_params(quick());
    // 16 points are too few for radix 8 and 64 with the default workgroup
    wisdom
        .learn_optimal_options_exhaustive(
            &device,
            16,
            1,
            TransformType::ComplexToComplex,
            Target::Ssbo,
            Target::Ssbo,
            Precision::default(),
        )
        .unwrap();
    let radices: BTreeSet<u32> = wisdom.store().iter().map(|(k, _)| k.pass.radix).collect();
    assert_eq!(radices, BTreeSet::from([4, 16]));
}

#[test]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
fn exhaustive_learning_covers_both_dimensions() {
    let (_sim, device) = mali(|_| 0.25);
    let mut wisdom = Wisdom::for_device(device.as_ref()).with_bench_params(quick());
    wisdom
        .learn_optimal_options_exhaustive(
            &device,
            256,
            256,
            TransformType::ComplexToComplex,
            Target::Ssbo,
            Target::Ssbo,
            Precision::default(),
        )
        .unwrap();
    let modes: BTreeSet<(u32, bool)> = wisdom
        .store()
        .iter()
        .map(|(k, _)| (k.pass.radix, k.pass.mode == Mode::Vertical))
        .collect();
    for radix in [4, 8, 16, 64] {
        assert!(modes.contains(&(radix, true)), "vertical radix {radix}");
        assert!(modes.contains(&(radix, false)), "horizontal radix {radix}");
    }
}

#[test]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
fn archived_wisdom_skips_relearning() {
    let (_sim, device) = mali(|p| if p.workgroup_size_x == 8 { 0.125 } else { 0.25 });
    let mut wisdom = Wisdom::for_device(device.as_ref()).with_bench_params(quick());
    let learned = wisdom.learn_optimal_options(&device, horizontal(256, 4)).unwrap();
    let json = wisdom.archive().unwrap();

    let (sim, device) = mali(|_| 1.0);
    let mut restored = Wisdom::for_device(device.as_ref()).with_bench_params(quick());
    restored.extract(&json).unwrap();
    let recalled = restored.learn_optimal_options(&device, horizontal(256, 4)).unwrap();
    assert_eq!(recalled, learned);
    assert_eq!(sim.stats().dispatches, 0);
}

fn learn_exhaustive(
    nx: u32,
    ny: u32,
    transform_type: TransformType,
    input_target: Target,
    output_target: Target,
    precision: Precision,
) -> Wisdom {
    let (_sim, device) = mali(|_| 0.25);
    let mut wisdom = Wisdom::for_device(device.as_ref()).with_bench_params(quick());
    wisdom
        .learn_optimal_options_exhaustive(
            &device,
            nx,
            ny,
            transform_type,
            input_target,
            output_target,
            precision,
        )
        .unwrap();
    wisdom
}

fn keys_with_mode(wisdom: &Wisdom, mode: Mode) -> Vec<PassDescriptor> {
    wisdom
        .store()
        .iter()
        .map(|(k, _)| k.pass)
        .filter(|p| p.mode == mode)
        .collect()
}

#[test]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
fn complex_to_real_row_resolves_from_the_input_target() {
    let wisdom = learn_exhaustive(
        512,
        1,
        TransformType::ComplexToReal,
        Target::Image,
        Target::ImageReal,
        Precision::default(),
    );
    // the complex passes run on half the real width
    let resolve = keys_with_mode(&wisdom, Mode::ResolveComplexToReal);
    assert_eq!(
        resolve,
        vec![PassDescriptor::new(
            256,
            1,
            2,
            Mode::ResolveComplexToReal,
            Target::Image,
            Target::Ssbo,
            Precision::default(),
        )]
    );

    let horizontal = keys_with_mode(&wisdom, Mode::Horizontal);
    assert_eq!(horizontal.len(), 12);
    let targets: BTreeSet<(Target, Target)> = horizontal
        .iter()
        .map(|p| (p.input_target, p.output_target))
        .collect();
    assert_eq!(
        targets,
        BTreeSet::from([
            (Target::Ssbo, Target::Ssbo),
            (Target::Image, Target::Ssbo),
            (Target::Ssbo, Target::ImageReal),
        ])
    );
    assert!(horizontal.iter().all(|p| p.nx == 256));
    assert!(keys_with_mode(&wisdom, Mode::Vertical).is_empty());
    assert_eq!(wisdom.store().len(), 13);
}

#[test]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
fn real_to_complex_row_resolves_into_the_output_target() {
    let precision = Precision {
        output_fp16: true,
        ..Precision::default()
    };
    let wisdom = learn_exhaustive(
        512,
        1,
        TransformType::RealToComplex,
        Target::ImageReal,
        Target::Image,
        precision,
    );
    let resolve = keys_with_mode(&wisdom, Mode::ResolveRealToComplex);
    assert_eq!(
        resolve,
        vec![PassDescriptor::new(
            256,
            1,
            2,
            Mode::ResolveRealToComplex,
            Target::Ssbo,
            Target::Image,
            Precision {
                input_fp16: true,
                ..precision
            },
        )]
    );
    assert_eq!(keys_with_mode(&wisdom, Mode::Horizontal).len(), 12);
}

#[test]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
fn real_to_complex_image_resolves_between_buffers() {
    let precision = Precision {
        output_fp16: true,
        ..Precision::default()
    };
    let wisdom = learn_exhaustive(
        512,
        64,
        TransformType::RealToComplex,
        Target::Ssbo,
        Target::Ssbo,
        precision,
    );
    let resolve = keys_with_mode(&wisdom, Mode::ResolveRealToComplex);
    assert_eq!(
        resolve,
        vec![PassDescriptor::new(
            256,
            64,
            2,
            Mode::ResolveRealToComplex,
            Target::Ssbo,
            Target::Ssbo,
            Precision {
                input_fp16: true,
                ..precision
            },
        )]
    );
    let vertical: BTreeSet<u32> = keys_with_mode(&wisdom, Mode::Vertical)
        .iter()
        .map(|p| p.radix)
        .collect();
    assert_eq!(vertical, BTreeSet::from([4, 8, 16, 64]));
    assert_eq!(keys_with_mode(&wisdom, Mode::Horizontal).len(), 4);
}

#[test]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
fn complex_transforms_learn_no_resolve() {
    let wisdom = learn_exhaustive(
        64,
        64,
        TransformType::ComplexToComplex,
        Target::Ssbo,
        Target::Image,
        Precision::default(),
    );
    assert!(keys_with_mode(&wisdom, Mode::ResolveRealToComplex).is_empty());
    assert!(keys_with_mode(&wisdom, Mode::ResolveComplexToReal).is_empty());
    assert!(wisdom
        .store()
        .iter()
        .all(|(k, _)| k.pass.nx == 64 && k.pass.output_target != Target::ImageReal));
}

#[test]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
fn dual_transforms_learn_dual_modes() {
    let wisdom = learn_exhaustive(
        256,
        256,
        TransformType::ComplexToComplexDual,
        Target::Ssbo,
        Target::Ssbo,
        Precision::default(),
    );
    assert!(!keys_with_mode(&wisdom, Mode::HorizontalDual).is_empty());
    assert!(!keys_with_mode(&wisdom, Mode::VerticalDual).is_empty());
    assert!(keys_with_mode(&wisdom, Mode::Horizontal).is_empty());
    assert!(keys_with_mode(&wisdom, Mode::Vertical).is_empty());
}

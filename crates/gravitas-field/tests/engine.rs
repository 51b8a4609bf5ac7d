//! Engine-level behavior through the public facade.

use gravitas_field::{
    ConfigBuilder, Device, DiffusionWeights, FieldError, Impulse, Injection, Vec2, VectorField,
    VectorFieldEngine,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_field(rng: &mut StdRng, width: u32, height: u32) -> VectorField {
    let cells = (0..width * height)
        .map(|_| Vec2::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0)))
        .collect();
    VectorField::from_cells(width, height, cells).unwrap()
}

fn close(a: Vec2, b: Vec2, tol: f32) -> bool {
    let scale = 1.0f32.max(a.length()).max(b.length());
    (a - b).length() <= tol * scale
}

#[test]
fn test_fit_at_integer_coordinates_is_exact() {
    let mut rng = StdRng::seed_from_u64(1);
    let field = random_field(&mut rng, 17, 11);
    let mut engine = VectorFieldEngine::cpu();

    for y in 0..field.height() {
        for x in 0..field.width() {
            let v = engine.fit(&field, x as f32, y as f32).unwrap();
            assert_eq!(Some(v), field.get(x, y), "cell ({x}, {y})");
        }
    }
}

#[test]
fn test_add_then_fit_is_bounded_by_injection() {
    let mut rng = StdRng::seed_from_u64(2);
    let mut field = random_field(&mut rng, 20, 20);
    let mut engine = VectorFieldEngine::cpu();

    for _ in 0..200 {
        let (x, y) = (rng.gen_range(0.0..19.0), rng.gen_range(0.0..19.0));
        let injected = Vec2::new(rng.gen_range(-2.0..2.0), rng.gen_range(-2.0..2.0));

        let before = engine.fit(&field, x, y).unwrap();
        engine.add(&mut field, x, y, injected.x, injected.y).unwrap();
        let after = engine.fit(&field, x, y).unwrap();

        assert!((after - before).length() <= injected.length() + 1e-5);
    }
}

#[test]
fn test_fit_batch_equals_individual_fits() {
    let mut rng = StdRng::seed_from_u64(3);
    let field = random_field(&mut rng, 32, 24);
    let mut engine = VectorFieldEngine::cpu();

    let positions: Vec<Vec2> = (0..3000)
        .map(|_| Vec2::new(rng.gen_range(-5.0..37.0), rng.gen_range(-5.0..29.0)))
        .collect();
    let batch = engine.fit_batch(&field, &positions).unwrap();

    for (p, v) in positions.iter().zip(&batch) {
        assert_eq!(*v, engine.fit(&field, p.x, p.y).unwrap());
    }
}

#[test]
fn test_add_batch_is_order_independent() {
    let mut rng = StdRng::seed_from_u64(4);
    let start = random_field(&mut rng, 16, 16);
    let mut engine = VectorFieldEngine::cpu();

    let injections: Vec<Injection> = (0..2500)
        .map(|_| {
            Injection::new(
                rng.gen_range(-2.0..18.0),
                rng.gen_range(-2.0..18.0),
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
            )
        })
        .collect();

    let mut batched = start.clone();
    engine.add_batch(&mut batched, &injections).unwrap();

    let mut reversed = start.clone();
    for inj in injections.iter().rev() {
        engine
            .add(&mut reversed, inj.x, inj.y, inj.vx, inj.vy)
            .unwrap();
    }

    for (a, b) in batched.cells().iter().zip(reversed.cells()) {
        assert!(close(*a, *b, 1e-4), "{a:?} vs {b:?}");
    }
}

#[test]
fn test_tiny_and_burst_batches_match_single_calls() {
    let mut engine = VectorFieldEngine::cpu();
    let impulses = [
        Impulse::new(0.0, 0.0, 1.0),
        Impulse::new(5.4, 3.5, 2.0),
        Impulse::new(9.9, 7.2, -0.5),
        Impulse::new(-3.0, 40.0, 1.5),
    ];

    let mut batched = engine.create(10, 8, Vec2::ZERO).unwrap();
    let mut single = batched.clone();
    engine.tiny_batch(&mut batched, &impulses).unwrap();
    engine.burst_batch(&mut batched, &impulses).unwrap();
    for imp in &impulses {
        engine.tiny(&mut single, imp.x, imp.y, imp.magnitude).unwrap();
    }
    for imp in &impulses {
        engine.burst(&mut single, imp.x, imp.y, imp.magnitude).unwrap();
    }

    for (a, b) in batched.cells().iter().zip(single.cells()) {
        assert!(close(*a, *b, 1e-6));
    }
}

#[test]
fn test_diffuse_single_impulse_exact_grid() {
    let mut engine = VectorFieldEngine::cpu();
    engine
        .set_weights(DiffusionWeights::new(0.0, 0.25))
        .unwrap();

    let mut field = engine.create(7, 6, Vec2::ZERO).unwrap();
    field.set(3, 2, Vec2::new(1.0, 0.0)).unwrap();
    engine.diffuse(&mut field).unwrap();

    let mut expected = VectorField::new(7, 6, Vec2::ZERO).unwrap();
    for (x, y) in [(2, 2), (4, 2), (3, 1), (3, 3)] {
        expected.set(x, y, Vec2::new(0.25, 0.0)).unwrap();
    }
    assert_eq!(field, expected);
}

#[test]
fn test_diffuse_edge_impulse_omits_missing_neighbors() {
    let mut engine = VectorFieldEngine::cpu();
    let mut field = engine.create(4, 4, Vec2::ZERO).unwrap();
    field.set(0, 0, Vec2::new(0.0, 4.0)).unwrap();
    engine.diffuse(&mut field).unwrap();

    assert_eq!(field.get(1, 0), Some(Vec2::new(0.0, 1.0)));
    assert_eq!(field.get(0, 1), Some(Vec2::new(0.0, 1.0)));
    assert_eq!(field.total(), Vec2::new(0.0, 2.0));
}

#[test]
fn test_fit_far_outside_returns_clamped_corner() {
    let mut rng = StdRng::seed_from_u64(5);
    let field = random_field(&mut rng, 9, 9);
    let mut engine = VectorFieldEngine::cpu();

    let v = engine.fit(&field, -1000.0, 1000.0).unwrap();
    assert!(v.is_finite());
    assert!(close(v, field.get(0, 8).unwrap(), 1e-6));

    let v = engine.fit(&field, 1e9, -1e9).unwrap();
    assert!(close(v, field.get(8, 0).unwrap(), 1e-6));
}

#[test]
fn test_device_switch_preserves_field() {
    let mut rng = StdRng::seed_from_u64(6);
    let field = random_field(&mut rng, 12, 10);
    let snapshot = field.clone();
    let mut engine = VectorFieldEngine::cpu();

    // Whether or not a GPU exists, the field must come through untouched.
    let switched = engine.set_device("gpu");
    let expected_device = if switched { Device::Parallel } else { Device::Cpu };
    assert_eq!(engine.current_device(), expected_device);

    for y in 0..field.height() {
        for x in 0..field.width() {
            let v = engine.fit(&field, x as f32, y as f32).unwrap();
            assert_eq!(Some(v), snapshot.get(x, y));
        }
    }

    assert!(engine.set_device("cpu"));
    assert_eq!(engine.current_device(), Device::Cpu);
    assert_eq!(field, snapshot);
}

#[test]
fn test_failed_switch_keeps_previous_device() {
    let mut engine = VectorFieldEngine::cpu();
    assert!(!engine.set_device("quantum"));
    assert_eq!(engine.current_device(), Device::Cpu);
}

#[test]
fn test_rejected_batch_leaves_field_unmodified() {
    let mut engine = VectorFieldEngine::cpu();
    let mut field = engine.create(6, 6, Vec2::splat(0.5)).unwrap();
    let before = field.clone();

    let bad = [
        Injection::new(1.0, 1.0, 1.0, 1.0),
        Injection::new(2.0, f32::INFINITY, 1.0, 1.0),
    ];
    let err = engine.add_batch(&mut field, &bad).unwrap_err();
    assert!(matches!(err, FieldError::InvalidInput(_)));
    assert_eq!(field, before);

    let bad = [Impulse::new(1.0, 1.0, f32::NAN)];
    assert!(engine.tiny_batch(&mut field, &bad).is_err());
    assert!(engine.burst_batch(&mut field, &bad).is_err());
    assert!(engine.fit_batch(&field, &[Vec2::new(f32::NAN, 0.0)]).is_err());
    assert_eq!(field, before);
}

#[test]
fn test_cleanup_twice_then_continue() {
    let mut engine = VectorFieldEngine::cpu();
    let mut field = engine.create(8, 8, Vec2::ZERO).unwrap();
    engine.cleanup();
    engine.cleanup();

    engine.add(&mut field, 3.0, 3.0, 1.0, 0.0).unwrap();
    engine.diffuse(&mut field).unwrap();
    assert!(field.is_finite());
}

#[test]
fn test_apply_config_reports_device() {
    let mut engine = VectorFieldEngine::cpu();
    let config = ConfigBuilder::new()
        .weights(0.5, 0.1)
        .iterations(2)
        .device(Device::Cpu)
        .build()
        .unwrap();

    assert!(engine.apply_config(&config).unwrap());
    assert_eq!(engine.iterations(), 2);
    assert_eq!(engine.weights(), DiffusionWeights::new(0.5, 0.1));
}

#[test]
fn test_sum_adjacent_at_extreme_coordinates() {
    let engine = VectorFieldEngine::cpu();
    let field = engine.create(4, 4, Vec2::splat(1.0)).unwrap();

    assert_eq!(engine.sum_adjacent(&field, i64::MAX, 0), Vec2::ZERO);
    assert_eq!(engine.sum_adjacent(&field, 0, i64::MIN), Vec2::ZERO);
    assert_eq!(engine.sum_adjacent(&field, i64::MIN, i64::MAX), Vec2::ZERO);
    // Just outside the edge still picks up the in-grid neighbor.
    assert_eq!(engine.sum_adjacent(&field, -1, 0), Vec2::splat(0.25));
}

#[test]
fn test_zero_dimension_rejected() {
    let engine = VectorFieldEngine::cpu();
    assert!(matches!(
        engine.create(0, 10, Vec2::ZERO),
        Err(FieldError::InvalidInput(_))
    ));
}

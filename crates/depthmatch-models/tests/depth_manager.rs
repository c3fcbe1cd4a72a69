use std::path::Path;

use depthmatch_image::Image;
use depthmatch_io::functional::encode_image_png;
use depthmatch_models::{
    checkpoint::{save_checkpoint, Checkpoint},
    depth::{DepthEncoder, DepthFamily, DepthManager, DepthWeights},
    write_initial_checkpoints, ErrorKind, ModelError, ModelRegistry, ModelSpec,
};

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn manager(dir: &Path) -> Result<DepthManager, ModelError> {
    let registry = ModelRegistry::default_depth(dir);
    write_initial_checkpoints(&DepthFamily, &registry)?;
    DepthManager::new(DepthFamily, registry)
}

fn textured_png(width: usize, height: usize) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let image = Image::<u8, 3>::from_fn([width, height].into(), |r, c, ch| {
        ((r * 7 + c * 13 + ch * 29) % 251) as u8
    });
    Ok(encode_image_png(&image)?)
}

#[test]
fn default_model_is_selected_on_startup() -> TestResult {
    let dir = tempfile::tempdir()?;
    let manager = manager(dir.path())?;
    assert_eq!(manager.get_spec(), ModelSpec::named("base_vitb"));
    assert_eq!(manager.get_model()?.encoder(), &DepthEncoder::Vitb);

    let listing = manager.list_models();
    assert_eq!(listing.current.as_deref(), Some("base_vitb"));
    assert_eq!(listing.models.len(), 6);
    Ok(())
}

#[test]
fn every_registered_model_predicts() -> TestResult {
    let dir = tempfile::tempdir()?;
    let manager = manager(dir.path())?;
    let png = textured_png(40, 24)?;

    let names: Vec<String> = manager.registry().names().map(str::to_string).collect();
    for name in names {
        let spec = manager.select(&name)?;
        assert_eq!(spec, ModelSpec::named(&name));
        assert_eq!(manager.get_spec(), spec);

        let depth = manager.predict(&png, false)?;
        assert_eq!((depth.width(), depth.height()), (40, 24));
        assert!(depth.as_slice().iter().all(|d| d.is_finite()), "{name}");
    }
    Ok(())
}

#[test]
fn unknown_model_leaves_the_selection() -> TestResult {
    let dir = tempfile::tempdir()?;
    let manager = manager(dir.path())?;
    manager.select("fire")?;

    let err = manager.select("vitx_large").expect_err("unknown model");
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert_eq!(manager.get_spec(), ModelSpec::named("fire"));
    Ok(())
}

#[test]
fn missing_checkpoint_leaves_the_selection() -> TestResult {
    let dir = tempfile::tempdir()?;
    let manager = manager(dir.path())?;
    let fire = manager.registry().get("fire_nerf").ok_or("fire_nerf")?;
    std::fs::remove_file(&fire.checkpoint)?;

    let err = manager.select("fire_nerf").expect_err("missing checkpoint");
    assert_eq!(err.kind(), ErrorKind::Resource);
    assert!(matches!(err, ModelError::CheckpointNotFound(_)));
    assert_eq!(manager.get_spec(), ModelSpec::named("base_vitb"));

    // the previous model still serves requests
    let depth = manager.predict(&textured_png(16, 16)?, true)?;
    assert_eq!(depth.width(), 16);
    Ok(())
}

#[test]
fn corrupt_checkpoint_keeps_the_manager_usable() -> TestResult {
    let dir = tempfile::tempdir()?;
    let manager = manager(dir.path())?;
    let fire = manager.registry().get("fire").ok_or("fire")?;

    // vitb tag and mix, then a level weight count no checkpoint could hold
    let mut bytes = b"DMCKPT01".to_vec();
    bytes.extend(bincode::encode_to_vec(
        (DepthEncoder::Vitb.to_string(), [0.0f32; 3], u64::MAX),
        bincode::config::standard(),
    )?);
    std::fs::write(&fire.checkpoint, bytes)?;

    let err = manager.select("fire").expect_err("corrupt checkpoint");
    assert!(matches!(err, ModelError::InvalidCheckpoint { .. }), "{err}");
    assert_eq!(err.kind(), ErrorKind::Resource);
    assert_eq!(manager.get_spec(), ModelSpec::named("base_vitb"));

    let depth = manager.predict(&textured_png(24, 16)?, true)?;
    assert_eq!((depth.width(), depth.height()), (24, 16));
    assert_eq!(manager.select("base_vitl")?, ModelSpec::named("base_vitl"));
    Ok(())
}

#[test]
fn normalized_depth_spans_the_unit_range() -> TestResult {
    let dir = tempfile::tempdir()?;
    let manager = manager(dir.path())?;
    let depth = manager.predict(&textured_png(64, 48)?, true)?;

    let values = depth.as_slice();
    let min = values.iter().copied().fold(f32::INFINITY, f32::min);
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    assert_eq!(min, 0.0);
    assert!(max <= 1.0 && max > 0.5);
    Ok(())
}

#[test]
fn uniform_image_gives_a_flat_map() -> TestResult {
    let dir = tempfile::tempdir()?;
    let manager = manager(dir.path())?;
    let gray = encode_image_png(&Image::<u8, 3>::from_size_val([64, 64].into(), 128)?)?;

    let raw = manager.predict(&gray, false)?;
    assert_eq!((raw.width(), raw.height()), (64, 64));
    assert!(raw.as_slice().iter().all(|&d| d == raw.as_slice()[0]));

    let normalized = manager.predict(&gray, true)?;
    assert!(normalized.as_slice().iter().all(|&d| d == 0.0));
    Ok(())
}

#[test]
fn undecodable_payload_is_an_input_error() -> TestResult {
    let dir = tempfile::tempdir()?;
    let manager = manager(dir.path())?;
    let err = manager.predict(b"definitely not a png", true).expect_err("garbage");
    assert_eq!(err.kind(), ErrorKind::Input);
    assert!(err.kind().is_client_fault());
    Ok(())
}

#[test]
fn concurrent_requests_see_a_consistent_pair() -> TestResult {
    let dir = tempfile::tempdir()?;
    let registry = ModelRegistry::default_depth(dir.path());
    write_initial_checkpoints(&DepthFamily, &registry)?;

    // give every vitb model a distinct bias so the loaded weights identify the model
    let biases = [("base_vitb", 1.0f32), ("0097_vitb", 2.0), ("fire", 3.0), ("fire_nerf", 4.0)];
    for (name, bias) in biases {
        let entry = registry.get(name).ok_or(name)?;
        let mut weights = DepthWeights::default_for(DepthEncoder::Vitb);
        weights.bias = bias;
        save_checkpoint(
            &entry.checkpoint,
            &Checkpoint {
                encoder: DepthEncoder::Vitb.to_string(),
                weights,
            },
        )?;
    }

    let manager = DepthManager::new(DepthFamily, registry)?;
    let expected = |name: &str| biases.iter().find(|(n, _)| *n == name).map(|(_, b)| *b);

    std::thread::scope(|s| {
        for t in 0..2 {
            let manager = &manager;
            s.spawn(move || {
                for i in 0..50 {
                    let (name, _) = biases[(i + t) % biases.len()];
                    assert!(manager.select(name).is_ok());
                }
            });
        }
        for _ in 0..4 {
            let manager = &manager;
            s.spawn(move || {
                for _ in 0..200 {
                    let (bias, spec) = manager
                        .with_model(|model, spec| (model.weights().bias, spec.clone()))
                        .expect("a model is always selected");
                    let name = spec.model_name.expect("selected");
                    assert_eq!(Some(bias), expected(&name), "{name}");
                }
            });
        }
    });
    Ok(())
}

#[test]
fn predictions_survive_architecture_switches() -> TestResult {
    let dir = tempfile::tempdir()?;
    let manager = manager(dir.path())?;
    let png = textured_png(32, 24)?;

    std::thread::scope(|s| {
        let selector = &manager;
        s.spawn(move || {
            for i in 0..20 {
                let name = if i % 2 == 0 { "base_vitl" } else { "base_vitb" };
                assert_eq!(selector.select(name).ok(), Some(ModelSpec::named(name)));
            }
        });
        for _ in 0..3 {
            let (manager, png) = (&manager, &png);
            s.spawn(move || {
                for _ in 0..20 {
                    let depth = manager.predict(png, true).expect("prediction");
                    assert_eq!((depth.width(), depth.height()), (32, 24));
                    assert!(depth.as_slice().iter().all(|d| (0.0..=1.0).contains(d)));
                }
            });
        }
    });

    let spec = manager.get_spec();
    let encoder = manager.with_model(|model, _| *model.encoder())?;
    let expected = match spec.model_name.as_deref() {
        Some("base_vitl") => DepthEncoder::Vitl,
        _ => DepthEncoder::Vitb,
    };
    assert_eq!(encoder, expected);
    Ok(())
}

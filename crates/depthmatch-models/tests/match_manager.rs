use std::path::Path;

use depthmatch_image::Image;
use depthmatch_io::functional::encode_image_png;
use depthmatch_models::{
    matcher::{MatchDescriptor, MatchFamily, MatchManager},
    write_initial_checkpoints, ErrorKind, ModelEntry, ModelError, ModelRegistry, ModelSpec,
};

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn manager(dir: &Path) -> Result<MatchManager, ModelError> {
    let registry = ModelRegistry::default_match(dir);
    write_initial_checkpoints(&MatchFamily, &registry)?;
    MatchManager::new(MatchFamily, registry)
}

/// Smooth value noise on a lattice of 4 pixels, defined for any integer coordinate.
fn noise(x: i64, y: i64) -> u8 {
    let lattice = |ix: i64, iy: i64| -> f64 {
        let h = (ix.wrapping_mul(73_856_093) ^ iy.wrapping_mul(19_349_663)).wrapping_mul(2_654_435_761);
        ((h >> 8) & 0xff) as f64
    };
    let (ix, iy) = (x.div_euclid(4), y.div_euclid(4));
    let (fx, fy) = (x.rem_euclid(4) as f64 / 4.0, y.rem_euclid(4) as f64 / 4.0);
    let top = lattice(ix, iy) * (1.0 - fx) + lattice(ix + 1, iy) * fx;
    let bottom = lattice(ix, iy + 1) * (1.0 - fx) + lattice(ix + 1, iy + 1) * fx;
    (top * (1.0 - fy) + bottom * fy).round() as u8
}

/// A textured image, translated `shift` pixels to the right.
fn scene_png(shift: i64) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let image = Image::<u8, 3>::from_fn([160, 120].into(), |r, c, _| {
        noise(c as i64 - shift, r as i64)
    });
    Ok(encode_image_png(&image)?)
}

#[test]
fn translated_pair_is_matched() -> TestResult {
    let dir = tempfile::tempdir()?;
    let manager = manager(dir.path())?;
    assert_eq!(manager.get_spec(), ModelSpec::named("base"));

    let result = manager.predict(&scene_png(0)?, &scene_png(10)?)?;
    assert!(result.fundamental.is_some());
    assert!(result.len() >= 8);
    assert_eq!((result.height_a, result.width_a), (120, 160));
    assert_eq!((result.height_b, result.width_b), (120, 160));

    let n = result.len();
    assert_eq!(result.keypoints_b.len(), n);
    assert_eq!(result.matches.len(), n);
    assert_eq!(result.certainty.len(), n);
    assert!(result.certainty.iter().all(|&c| c > 0.0 && c <= 1.0));

    let mut shifts: Vec<f64> = result
        .keypoints_a
        .iter()
        .zip(&result.keypoints_b)
        .map(|(a, b)| b[0] - a[0])
        .collect();
    shifts.sort_by(f64::total_cmp);
    let median = shifts[n / 2];
    assert!((median - 10.0).abs() < 1.0, "median shift {median}");
    Ok(())
}

#[test]
fn featureless_pair_has_no_geometry() -> TestResult {
    let dir = tempfile::tempdir()?;
    let manager = manager(dir.path())?;
    let flat = encode_image_png(&Image::<u8, 3>::from_size_val([64, 48].into(), 90)?)?;

    let result = manager.predict(&flat, &flat)?;
    assert!(result.fundamental.is_none());
    assert!(result.is_empty());
    assert!(result.keypoints_b.is_empty() && result.matches.is_empty());
    assert!(result.certainty.is_empty());
    assert_eq!((result.width_a, result.height_b), (64, 48));

    let json = serde_json::to_value(&result)?;
    assert!(json["F"].is_null());
    Ok(())
}

#[test]
fn selection_and_bad_input() -> TestResult {
    let dir = tempfile::tempdir()?;
    let manager = manager(dir.path())?;

    assert_eq!(manager.select("fire_nerf")?, ModelSpec::named("fire_nerf"));
    assert_eq!(
        manager.select("roma_xl").map_err(|e| e.kind()),
        Err(ErrorKind::Configuration)
    );
    assert_eq!(manager.get_spec(), ModelSpec::named("fire_nerf"));

    let err = manager
        .predict(&scene_png(0)?, b"\x89PNG but truncated")
        .expect_err("undecodable");
    assert_eq!(err.kind(), ErrorKind::Input);
    Ok(())
}

#[test]
fn every_registered_model_predicts() -> TestResult {
    let dir = tempfile::tempdir()?;
    let manager = manager(dir.path())?;
    let (a, b) = (scene_png(0)?, scene_png(10)?);

    let names: Vec<String> = manager.registry().names().map(str::to_string).collect();
    assert_eq!(names, ["0080", "base", "fire", "fire_nerf"]);
    for name in names {
        assert_eq!(manager.select(&name)?, ModelSpec::named(&name));
        let result = manager.predict(&a, &b)?;
        assert_eq!(manager.get_spec(), ModelSpec::named(&name));
        assert_eq!(result.keypoints_b.len(), result.len());
        assert_eq!(result.matches.len(), result.len());
        assert_eq!(result.certainty.len(), result.len());
        assert!(result.fundamental.is_some(), "{name}");
    }
    Ok(())
}

#[test]
fn descriptor_change_rebuilds_the_matcher() -> TestResult {
    let dir = tempfile::tempdir()?;
    let registry = ModelRegistry::new(
        "coarse",
        [
            (
                "coarse".to_string(),
                ModelEntry::new(dir.path().join("coarse.bin"), None),
            ),
            (
                "coarse_ft".to_string(),
                ModelEntry::new(dir.path().join("coarse_ft.bin"), Some("tiny_roma_v1")),
            ),
            (
                "fine".to_string(),
                ModelEntry::new(dir.path().join("fine.bin"), Some("tiny_roma_v1_hr")),
            ),
        ],
    )?;
    write_initial_checkpoints(&MatchFamily, &registry)?;
    let manager = MatchManager::new(MatchFamily, registry)?;

    let coarse = manager.get_model()?;
    assert_eq!(coarse.descriptor(), &MatchDescriptor::TinyRomaV1);

    manager.select("fine")?;
    let fine = manager.get_model()?;
    assert_eq!(fine.descriptor(), &MatchDescriptor::TinyRomaV1Hr);
    assert_eq!(fine.architecture().size, MatchDescriptor::TinyRomaV1Hr.working_size());

    manager.select("coarse_ft")?;
    assert_eq!(manager.get_model()?.descriptor(), &MatchDescriptor::TinyRomaV1);
    assert_eq!(manager.get_spec(), ModelSpec::named("coarse_ft"));
    Ok(())
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use assert_cmd::Command;
use image::{GenericImageView, Rgb, RgbImage};
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn sample(dir: &Path) -> PathBuf {
    let path = dir.join("in.png");
    RgbImage::from_fn(40, 30, |x, y| {
        Rgb([(x * 6) as u8, (y * 8) as u8, ((x * y) % 256) as u8])
    })
    .save(&path)
    .unwrap();
    path
}

fn lqrseam() -> Command {
    Command::cargo_bin("lqrseam").unwrap()
}

#[test]
fn resizes_to_pixels_and_percentages() {
    let dir = TempDir::new().unwrap();
    let input = sample(dir.path());
    let output = dir.path().join("out.png");
    lqrseam()
        .arg(&input)
        .args(&["--width", "50%", "--height", "25", "-o"])
        .arg(&output)
        .assert()
        .success();
    assert_eq!(image::open(&output).unwrap().dimensions(), (20, 25));
}

#[test]
fn enlarges() {
    let dir = TempDir::new().unwrap();
    let input = sample(dir.path());
    let output = dir.path().join("big.ppm");
    lqrseam()
        .arg(&input)
        .args(&["--width", "70", "--order", "vertical", "--side-switch", "2", "-o"])
        .arg(&output)
        .assert()
        .success();
    assert_eq!(image::open(&output).unwrap().dimensions(), (70, 30));
}

#[test]
fn dumped_maps_reload() {
    let dir = TempDir::new().unwrap();
    let input = sample(dir.path());
    let vmap = dir.path().join("vmap.json");
    let energy = dir.path().join("energy.png");
    lqrseam()
        .arg(&input)
        .args(&["--width", "22", "--dump-vmap"])
        .arg(&vmap)
        .arg("--energy-map")
        .arg(&energy)
        .assert()
        .success();
    assert!(std::fs::read_to_string(&vmap).unwrap().contains("\"depth\":18"));
    assert_eq!(image::open(&energy).unwrap().dimensions(), (22, 30));

    let output = dir.path().join("again.png");
    lqrseam()
        .arg(&input)
        .arg("--load-vmap")
        .arg(&vmap)
        .arg("-o")
        .arg(&output)
        .assert()
        .success();
    assert_eq!(image::open(&output).unwrap().dimensions(), (22, 30));
}

#[test]
fn settings_come_from_a_file() {
    let dir = TempDir::new().unwrap();
    let input = sample(dir.path());
    let config = dir.path().join("carver.json");
    std::fs::write(&config, r#"{ "max_step": 2, "energy": "luma_gradient_norm", "blur_sigma": 1.0 }"#)
        .unwrap();
    let output = dir.path().join("out.png");
    lqrseam()
        .arg(&input)
        .arg("--config")
        .arg(&config)
        .args(&["--height", "20", "-o"])
        .arg(&output)
        .assert()
        .success();
    assert_eq!(image::open(&output).unwrap().dimensions(), (40, 20));
}

#[test]
fn bad_arguments_fail_with_a_message() {
    let dir = TempDir::new().unwrap();
    let input = sample(dir.path());
    lqrseam()
        .arg(&input)
        .args(&["--width", "0", "-o", "x.png"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("zero pixels"));
    lqrseam()
        .arg(&input)
        .args(&["--energy", "sparkle", "-o", "x.png"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid configuration"));
    lqrseam()
        .arg(dir.path().join("missing.png"))
        .args(&["-o", "x.png"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing.png"));
    lqrseam()
        .arg(&input)
        .assert()
        .failure()
        .stderr(predicate::str::contains("nothing to do"));
}

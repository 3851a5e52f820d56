// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use lqrseam::{
    Carver, CarverHandle, EnergyFunction, EnergyProvider, Orientation, ReadWindow, ResizeStatus,
    VMapSnapshot,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

// A deterministic, busy picture.
fn texture(w: u32, h: u32, channels: u8) -> Vec<u8> {
    let mut state = 0x2545_f491u32;
    (0..w as usize * h as usize * channels as usize)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state >> 24) as u8
        })
        .collect()
}

fn active(data: Vec<u8>, w: u32, h: u32, channels: u8) -> Carver {
    let mut carver = Carver::from_raw(data, w, h, channels).unwrap();
    carver.init(1, 0.0).unwrap();
    carver
}

// Columns of the pixels visible at `depth`, row by row.
fn visible_rows(carver: &Carver, depth: u32) -> Vec<Vec<u32>> {
    let b = carver.buffer();
    (0..b.height())
        .map(|y| {
            (0..b.width())
                .filter(|x| carver.vmap().is_visible(b.index(*x, y), depth))
                .collect()
        })
        .collect()
}

#[test]
fn scenario_a_seams_route_around_a_bright_pixel() {
    let (w, h) = (64, 48);
    let mut data = vec![0u8; w * h * 3];
    let bright = (24 * w + 32) * 3;
    data[bright..bright + 3].copy_from_slice(&[255, 255, 255]);
    let mut carver = active(data, w as u32, h as u32, 3);
    assert!(carver.resize(63, 48).unwrap().is_complete());
    assert_eq!(carver.orientation(), Orientation::Normal);
    let index = carver.buffer().index(32, 24);
    assert!(carver.vmap().is_visible(index, carver.depth()));
}

#[test]
fn scenario_b_shrinking_to_one_column() {
    let mut carver = active(texture(64, 48, 3), 64, 48, 3);
    assert!(carver.resize(1, 48).unwrap().is_complete());
    assert_eq!((carver.width(), carver.height()), (1, 48));
    for row in visible_rows(&carver, carver.depth()) {
        assert_eq!(row.len(), 1);
    }
    let out = carver.render().unwrap();
    assert_eq!((out.width(), out.height()), (1, 48));
}

#[test]
fn scenario_c_a_snapshot_rebuilds_the_size_elsewhere() {
    let original = texture(100, 100, 3);
    let mut carver = active(original.clone(), 100, 100, 3);
    carver.resize(50, 100).unwrap();
    let text = carver.dump_vmap().unwrap().to_json().unwrap();

    let snapshot = VMapSnapshot::from_json(&text).unwrap();
    let mut fresh = Carver::from_slice(&original, 100, 100, 3).unwrap();
    fresh.load_vmap(&snapshot).unwrap();
    assert_eq!(fresh.vmap().visible_count(fresh.depth()), 50 * 100);
    assert_eq!((fresh.width(), fresh.height()), (50, 100));
    assert_eq!(fresh.render().unwrap(), carver.render().unwrap());
}

#[test]
fn scenario_d_cancel_from_another_thread() {
    let mut carver = active(texture(200, 200, 3), 200, 200, 3);
    let handle = carver.handle();
    let worker = thread::spawn(move || {
        let status = carver.resize(1, 1);
        (status, carver.width(), carver.height())
    });
    let deadline = Instant::now() + Duration::from_secs(60);
    while handle.progress().0 == 0 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(1));
    }
    handle.cancel();
    let (status, width, height) = worker.join().unwrap();
    match status.unwrap() {
        ResizeStatus::Cancelled { width: w, height: h } => {
            assert_eq!((w, h), (width, height));
            let area = w * h;
            assert!(area > 1 && area < 200 * 200, "stopped at {}x{}", w, h);
        }
        ResizeStatus::Complete => panic!("the resize ignored the cancellation"),
    }
}

#[test]
fn visibility_only_decreases_with_depth() {
    let mut carver = active(texture(30, 20, 1), 30, 20, 1);
    carver.resize(10, 20).unwrap();
    let levels = carver.levels();
    for i in 0..carver.buffer().pixel_count() {
        for d2 in 0..=levels {
            if carver.vmap().is_visible(i, d2) {
                assert!((0..d2).all(|d1| carver.vmap().is_visible(i, d1)));
            }
        }
    }
}

#[test]
fn every_seam_is_one_connected_pixel_per_row() {
    let mut carver = Carver::from_raw(texture(40, 25, 3), 40, 25, 3).unwrap();
    carver.init(2, 0.5).unwrap();
    carver.resize(15, 25).unwrap();
    for level in 1..=carver.levels() {
        let rows = visible_rows(&carver, level - 1);
        let b = carver.buffer();
        let path: Vec<i64> = rows
            .iter()
            .enumerate()
            .map(|(y, row)| {
                let hits: Vec<usize> = row
                    .iter()
                    .enumerate()
                    .filter(|(_, x)| carver.vmap().value(b.index(**x, y as u32)) == level)
                    .map(|(gx, _)| gx)
                    .collect();
                assert_eq!(hits.len(), 1, "seam {} in row {}", level, y);
                hits[0] as i64
            })
            .collect();
        assert!(path.windows(2).all(|p| (p[0] - p[1]).abs() <= 2));
    }
}

#[test]
fn snapshot_round_trip_keeps_every_depth() {
    let original = texture(24, 16, 3);
    let mut carver = active(original.clone(), 24, 16, 3);
    carver.resize(9, 16).unwrap();
    let snapshot = carver.dump_vmap().unwrap();
    let mut copy = active(original, 24, 16, 3);
    copy.load_vmap(&snapshot).unwrap();
    for depth in 0..=snapshot.depth {
        for i in 0..carver.buffer().pixel_count() {
            assert_eq!(
                carver.vmap().is_visible(i, depth),
                copy.vmap().is_visible(i, depth)
            );
        }
    }
}

#[test]
fn flatten_twice_is_flatten_once() {
    let mut carver = active(texture(20, 12, 3), 20, 12, 3);
    carver.resize(13, 9).unwrap();
    carver.flatten().unwrap();
    let (buffer, vmap) = (carver.buffer().clone(), carver.vmap().clone());
    carver.flatten().unwrap();
    assert_eq!(carver.buffer(), &buffer);
    assert_eq!(carver.vmap(), &vmap);
    assert_eq!((carver.width(), carver.height()), (13, 9));
}

#[test]
fn every_size_in_range_is_reachable() {
    for &(w, h) in &[(17, 11), (1, 1), (17, 1), (1, 11), (9, 6), (17, 11)] {
        let mut carver = active(texture(17, 11, 3), 17, 11, 3);
        assert!(carver.resize(w, h).unwrap().is_complete());
        assert_eq!((carver.width(), carver.height()), (w, h));
        assert_eq!(carver.pixels().count(), (w * h) as usize);
    }
}

#[test]
fn an_attached_carver_stays_in_step() {
    let mut carver = active(texture(32, 24, 3), 32, 24, 3);
    let alpha = Carver::from_raw(texture(32, 24, 1), 32, 24, 1).unwrap();
    carver.attach(alpha).unwrap();
    for &(w, h) in &[(20, 24), (25, 18), (40, 30), (12, 12)] {
        carver.resize(w, h).unwrap();
        let aux = &carver.attached()[0];
        assert_eq!(aux.vmap(), carver.vmap());
        assert_eq!((aux.width(), aux.height()), (w, h));
        assert_eq!(aux.render().unwrap().pixel_count(), (w * h) as usize);
    }
}

// Energy that cancels the resize of `handle` once `after` energies
// have been computed.
#[derive(Debug)]
struct CancelAfter {
    handle: CarverHandle,
    calls: AtomicUsize,
    after: usize,
}

impl EnergyProvider for CancelAfter {
    fn energy(&self, window: &ReadWindow) -> f32 {
        if self.calls.fetch_add(1, Ordering::SeqCst) >= self.after {
            self.handle.cancel();
        }
        EnergyFunction::GradientNorm.energy(window)
    }
}

#[test]
fn a_cancelled_resize_leaves_the_attached_carver_in_step() {
    let (w, h) = (24, 16);
    let mut carver = active(texture(w, h, 3), w, h, 3);
    carver
        .attach(Carver::from_raw(texture(w, h, 1), w, h, 1).unwrap())
        .unwrap();
    let handle = carver.handle();
    // the full map is built, then the first update asks to stop
    carver.set_energy_provider(Box::new(CancelAfter {
        handle,
        calls: AtomicUsize::new(0),
        after: (w * h) as usize + 3,
    }));
    let status = carver.resize(8, h).unwrap();
    let (cw, ch) = match status {
        ResizeStatus::Cancelled { width, height } => (width, height),
        ResizeStatus::Complete => panic!("the resize ignored the cancellation"),
    };
    assert!(cw > 8 && cw < w, "stopped at {}", cw);
    assert_eq!(ch, h);
    let aux = &carver.attached()[0];
    assert_eq!(aux.vmap(), carver.vmap());
    assert_eq!((aux.width(), aux.height()), (cw, ch));
    assert_eq!(aux.levels(), carver.levels());
}

#[test]
fn an_rgb_mask_flattens_a_shrunk_carver() {
    let mut carver = active(texture(12, 6, 3), 12, 6, 3);
    let alpha = Carver::from_raw(texture(12, 6, 1), 12, 6, 1).unwrap();
    carver.attach(alpha).unwrap();
    carver.resize(8, 6).unwrap();
    let shown = carver.render().unwrap();

    let white = [255u8; 2 * 6 * 3];
    carver.rigidity_add_rgb_area(&white, 3, 2, 6, 7, 0, 4.0).unwrap();

    // what was shown is now the reference, with no history left
    assert!(carver.is_active());
    assert_eq!((carver.ref_width(), carver.width()), (8, 8));
    assert_eq!((carver.levels(), carver.depth()), (0, 0));
    assert_eq!(carver.render().unwrap(), shown);
    assert_eq!(carver.attached()[0].ref_width(), 8);

    // the area is placed on the shown picture and clipped to it
    let mask = carver.rigidity_mask().unwrap();
    assert_eq!((mask.width(), mask.height()), (8, 6));
    for y in 0..6 {
        assert!((mask.get(Orientation::Normal, 7, y) - 4.0).abs() < 1e-5);
        assert_eq!(mask.get(Orientation::Normal, 6, y), 0.0);
    }
}

// Original column of the pixel that level `level` removed in each row.
fn seam_at(carver: &Carver, level: u32) -> Vec<u32> {
    let b = carver.buffer();
    (0..b.height())
        .map(|y| {
            (0..b.width())
                .find(|x| carver.vmap().value(b.index(*x, y)) == level)
                .unwrap()
        })
        .collect()
}

fn bends_in(seam: &[u32], rows: std::ops::Range<usize>) -> bool {
    rows.skip(1).any(|y| seam[y] != seam[y - 1])
}

#[test]
fn step_factors_keep_seams_straight_in_a_region() {
    let (w, h) = (30, 20);
    let mut free = Carver::from_raw(texture(w, h, 1), w, h, 1).unwrap();
    free.init(2, 1.0).unwrap();
    free.resize(15, h).unwrap();
    assert!((1..=15).any(|l| bends_in(&seam_at(&free, l), 0..10)));

    let mut held = Carver::from_raw(texture(w, h, 1), w, h, 1).unwrap();
    held.init(2, 1.0).unwrap();
    held.step_rigidity_set_area(&vec![1.0e6; (w * 10) as usize], w, 10, 0, 0)
        .unwrap();
    held.resize(15, h).unwrap();
    for level in 1..=15 {
        let seam = seam_at(&held, level);
        assert!(!bends_in(&seam, 0..10), "seam {} bends: {:?}", level, seam);
        assert!(seam.windows(2).all(|p| (p[0] as i64 - p[1] as i64).abs() <= 2));
    }
}

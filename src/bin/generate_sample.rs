use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

use tiff::encoder::{colortype, TiffEncoder};

const WIDTH: usize = 96;
const HEIGHT: usize = 96;
const SLICES: usize = 5;
const CAMERA_OFFSET: f64 = 100.0;

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

/// A bright square region whose brightness follows a focus profile in z.
struct Cell {
    x: usize,
    y: usize,
    side: usize,
    peak: f64,
    focus_slice: f64,
}

impl Cell {
    fn intensity(&self, slice: usize) -> f64 {
        let dz = slice as f64 - self.focus_slice;
        self.peak * (-dz * dz / 4.0).exp()
    }

    fn covers(&self, x: usize, y: usize) -> bool {
        (self.x..self.x + self.side).contains(&x) && (self.y..self.y + self.side).contains(&y)
    }
}

fn to_u16(v: f64) -> u16 {
    v.round().clamp(0.0, u16::MAX as f64) as u16
}

fn write_stack(path: &Path, planes: &[Vec<u16>]) {
    let file = File::create(path).expect("Failed to create output file");
    let mut encoder = TiffEncoder::new(BufWriter::new(file)).expect("Failed to create encoder");
    for plane in planes {
        encoder
            .write_image::<colortype::Gray16>(WIDTH as u32, HEIGHT as u32, plane)
            .expect("Failed to write page");
    }
}

fn synth_stack(cell: &Cell, rng: &mut SimpleRng) -> Vec<Vec<u16>> {
    (0..SLICES)
        .map(|z| {
            let signal = cell.intensity(z);
            let mut plane = Vec::with_capacity(WIDTH * HEIGHT);
            for y in 0..HEIGHT {
                for x in 0..WIDTH {
                    let mut v = rng.gauss(CAMERA_OFFSET, 4.0);
                    if cell.covers(x, y) {
                        v += signal + rng.gauss(0.0, 0.05 * signal);
                    }
                    // Occasional hot pixel for the outlier filter to remove.
                    if rng.next_f64() < 0.001 {
                        v += 3000.0;
                    }
                    plane.push(to_u16(v));
                }
            }
            plane
        })
        .collect()
}

fn main() {
    let out_dir = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "sample_batch".to_string());
    let root = Path::new(&out_dir);
    let mut rng = SimpleRng::new(42);

    let conditions: [(&str, f64); 2] = [("control", 400.0), ("treated", 900.0)];
    let mut written = 0;
    for (condition, peak) in conditions {
        let dir = root.join("input").join(condition);
        fs::create_dir_all(&dir).expect("Failed to create input directory");

        for i in 0..3 {
            let cell = Cell {
                x: 20 + 8 * i,
                y: 30 + 5 * i,
                side: 24 + 4 * i,
                peak: peak * (1.0 + 0.1 * i as f64),
                focus_slice: 1.5 + 0.5 * i as f64,
            };
            let name = format!("{condition}_{:02}.tif", i + 1);
            write_stack(&dir.join(&name), &synth_stack(&cell, &mut rng));
            written += 1;
        }
    }

    // One dark frame at the camera offset.
    let background: Vec<u16> = (0..WIDTH * HEIGHT)
        .map(|_| to_u16(rng.gauss(CAMERA_OFFSET, 1.0)))
        .collect();
    write_stack(&root.join("background.tif"), &[background]);

    println!(
        "Wrote {written} stacks ({SLICES} slices of {WIDTH}x{HEIGHT}) and background.tif under {}",
        root.display()
    );
}

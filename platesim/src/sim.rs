use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Height of freshly formed continental crust.
const CONTINENTAL_BASE: f32 = 1.0;
/// Height of freshly formed oceanic crust.
const OCEANIC_BASE: f32 = 0.1;

const CRUST_SPLIT: f32 = (CONTINENTAL_BASE + OCEANIC_BASE) * 0.5;
const MAX_HEIGHT: f32 = 8.0;
const REPARTITION_INTERVAL: u32 = 10;
const DRIFT_PER_STEP: f32 = 0.004;
const DIFFUSION_RATE: f32 = 0.25;

#[derive(Clone, Copy, Debug)]
pub struct SimConfig {
    pub seed: u64,
    pub width: usize,
    pub height: usize,
    pub plate_count: usize,
    pub ocean_ratio: f32,
    pub erosion_period: u32,
    pub folding_ratio: f32,
    pub cycle_count: u32,
    pub steps_per_cycle: u32,
}

impl SimConfig {
    fn is_valid(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.width.checked_mul(self.height).is_some()
            && self.plate_count > 0
            && self.ocean_ratio.is_finite()
            && (0.0..=1.0).contains(&self.ocean_ratio)
            && self.erosion_period > 0
            && self.folding_ratio.is_finite()
            && self.folding_ratio >= 0.0
            && self.cycle_count > 0
            && self.steps_per_cycle > 0
            && self.cycle_count.checked_mul(self.steps_per_cycle).is_some()
    }

    fn total_steps(&self) -> u32 {
        self.cycle_count * self.steps_per_cycle
    }
}

#[derive(Clone, Copy, Debug)]
struct Plate {
    cx: f32,
    cy: f32,
    weight: f32,
    vx: f32,
    vy: f32,
}

/// Weighted-Voronoi plates drifting over a static crust field.
///
/// Plate boundaries fold or rift the crust underneath them each step, the
/// crust diffuses every `erosion_period` steps, and every cycle restarts with
/// a fresh plate layout over the crust left by the previous one.
pub struct Simulation {
    config: SimConfig,
    rng: ChaCha8Rng,
    heights: Vec<f32>,
    plate_map: Vec<u32>,
    plates: Vec<Plate>,
    delta: Vec<f32>,
    step: u32,
}

impl Simulation {
    pub fn new(config: SimConfig) -> Option<Self> {
        if !config.is_valid() {
            return None;
        }
        let len = config.width * config.height;
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        let plates = spawn_plates(&mut rng, config.plate_count);

        let mut sim = Self {
            config,
            rng,
            heights: vec![0.0; len],
            plate_map: vec![0; len],
            plates,
            delta: vec![0.0; len],
            step: 0,
        };
        sim.partition();
        sim.seed_crust();
        Some(sim)
    }

    #[inline]
    pub fn heights(&self) -> &[f32] {
        &self.heights
    }

    #[inline]
    pub fn plate_map(&self) -> &[u32] {
        &self.plate_map
    }

    #[inline]
    pub fn is_finished(&self) -> bool {
        self.step >= self.config.total_steps()
    }

    /// Advances one timestep, returning whether the simulation has settled.
    pub fn step(&mut self) -> bool {
        if self.is_finished() {
            return true;
        }

        let cycle_step = self.step % self.config.steps_per_cycle;
        if cycle_step != 0 && cycle_step % REPARTITION_INTERVAL == 0 {
            self.drift_plates();
            self.partition();
        }

        self.fold_boundaries();
        self.step += 1;

        if self.step % self.config.erosion_period == 0 {
            self.diffuse();
        }

        if self.step % self.config.steps_per_cycle == 0 && !self.is_finished() {
            self.plates = spawn_plates(&mut self.rng, self.config.plate_count);
            self.partition();
        }

        self.is_finished()
    }

    fn partition(&mut self) {
        let w = self.config.width;
        let h = self.config.height;
        let inv_w = 1.0 / w as f32;
        let inv_h = 1.0 / h as f32;

        for y in 0..h {
            let py = (y as f32 + 0.5) * inv_h;
            for x in 0..w {
                let px = (x as f32 + 0.5) * inv_w;
                let mut best = 0u32;
                let mut best_d = f32::INFINITY;
                for (id, plate) in self.plates.iter().enumerate() {
                    let dx = px - plate.cx;
                    let dy = py - plate.cy;
                    let d = (dx * dx + dy * dy) / (plate.weight * plate.weight);
                    if d < best_d {
                        best_d = d;
                        best = id as u32;
                    }
                }
                self.plate_map[y * w + x] = best;
            }
        }
    }

    /// Picks continental plates interior-first until the land share is met.
    fn seed_crust(&mut self) {
        let mut area = vec![0usize; self.plates.len()];
        for &id in &self.plate_map {
            area[id as usize] += 1;
        }

        let mut order: Vec<(usize, f32)> = self
            .plates
            .iter()
            .enumerate()
            .map(|(id, p)| {
                let border = p.cx.min(1.0 - p.cx).min(p.cy).min(1.0 - p.cy).max(0.0);
                (id, border * self.rng.random_range(0.75..1.25))
            })
            .collect();
        order.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

        let target = ((1.0 - self.config.ocean_ratio) * self.heights.len() as f32) as usize;
        let mut continental = vec![false; self.plates.len()];
        let mut land = 0usize;
        for (id, _) in order {
            if land >= target {
                break;
            }
            continental[id] = true;
            land += area[id];
        }

        for (h, &id) in self.heights.iter_mut().zip(&self.plate_map) {
            *h = if continental[id as usize] {
                CONTINENTAL_BASE + self.rng.random_range(-0.08..0.08)
            } else {
                OCEANIC_BASE + self.rng.random_range(0.0..0.05)
            };
        }
    }

    fn drift_plates(&mut self) {
        let drift = DRIFT_PER_STEP * REPARTITION_INTERVAL as f32;
        for plate in &mut self.plates {
            plate.cx = (plate.cx + plate.vx * drift).rem_euclid(1.0);
            plate.cy = (plate.cy + plate.vy * drift).rem_euclid(1.0);
        }
    }

    fn fold_boundaries(&mut self) {
        let Self {
            config,
            heights,
            plate_map,
            plates,
            delta,
            ..
        } = self;
        let w = config.width;
        let h = config.height;
        delta.fill(0.0);

        for y in 0..h {
            for x in 0..w {
                let i = y * w + x;
                if x + 1 < w {
                    collide(
                        plates,
                        heights,
                        plate_map,
                        delta,
                        config.folding_ratio,
                        i,
                        i + 1,
                        (1.0, 0.0),
                    );
                }
                if y + 1 < h {
                    collide(
                        plates,
                        heights,
                        plate_map,
                        delta,
                        config.folding_ratio,
                        i,
                        i + w,
                        (0.0, 1.0),
                    );
                }
            }
        }

        for (height, d) in heights.iter_mut().zip(delta.iter()) {
            *height = (*height + d).clamp(0.0, MAX_HEIGHT);
        }
    }

    fn diffuse(&mut self) {
        let w = self.config.width;
        let h = self.config.height;
        for y in 0..h {
            for x in 0..w {
                let c = self.heights[y * w + x];
                let l = self.heights[y * w + x.saturating_sub(1)];
                let r = self.heights[y * w + (x + 1).min(w - 1)];
                let u = self.heights[y.saturating_sub(1) * w + x];
                let d = self.heights[(y + 1).min(h - 1) * w + x];
                let avg = (l + r + u + d) * 0.25;
                self.delta[y * w + x] = c + (avg - c) * DIFFUSION_RATE;
            }
        }
        std::mem::swap(&mut self.heights, &mut self.delta);
    }
}

fn spawn_plates(rng: &mut ChaCha8Rng, count: usize) -> Vec<Plate> {
    (0..count)
        .map(|_| {
            let angle = rng.random_range(0.0..std::f32::consts::TAU);
            let speed = rng.random_range(0.5..1.0);
            Plate {
                cx: rng.random::<f32>(),
                cy: rng.random::<f32>(),
                weight: rng.random_range(0.7..1.3),
                vx: angle.cos() * speed,
                vy: angle.sin() * speed,
            }
        })
        .collect()
}

#[allow(clippy::too_many_arguments)]
fn collide(
    plates: &[Plate],
    heights: &[f32],
    plate_map: &[u32],
    delta: &mut [f32],
    folding_ratio: f32,
    i: usize,
    j: usize,
    dir: (f32, f32),
) {
    let a = plate_map[i];
    let b = plate_map[j];
    if a == b {
        return;
    }
    let pa = plates[a as usize];
    let pb = plates[b as usize];
    let closing = (pa.vx - pb.vx) * dir.0 + (pa.vy - pb.vy) * dir.1;
    let amount = folding_ratio * closing.abs();
    let cont_a = heights[i] >= CRUST_SPLIT;
    let cont_b = heights[j] >= CRUST_SPLIT;

    if closing > 0.0 {
        let (da, db) = match (cont_a, cont_b) {
            // Continental collision.
            (true, true) => (amount, amount),
            // Subduction: the oceanic side drops into a trench.
            (true, false) => (amount * 1.5, -amount * 0.5),
            (false, true) => (-amount * 0.5, amount * 1.5),
            // Island arc.
            (false, false) => (amount * 0.4, amount * 0.4),
        };
        delta[i] += da;
        delta[j] += db;
    } else if closing < 0.0 {
        let rift = |continental: bool| {
            if continental {
                -amount * 0.5
            } else {
                amount * 0.1
            }
        };
        delta[i] += rift(cont_a);
        delta[j] += rift(cont_b);
    }
}

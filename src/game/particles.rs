use super::constants::{PARTICLE_FRICTION, PARTICLE_GRAVITY, PARTICLE_MIN_ALPHA};
use rand::Rng;
use std::f64::consts::PI;

#[derive(Debug, Clone)]
pub struct Particle {
    pub x: f64,
    pub y: f64,
    pub vx: f64,
    pub vy: f64,
    pub alpha: f64,
    pub size: f64,
    pub color: &'static str,
    pub life: f64,
    pub max_life: f64,
}

impl Particle {
    pub fn update(&mut self, dt: f64) {
        self.life += dt;
        self.vy += PARTICLE_GRAVITY * dt;
        self.vx *= PARTICLE_FRICTION;
        self.vy *= PARTICLE_FRICTION;
        self.x += self.vx;
        self.y += self.vy;
        self.alpha = (1.0 - self.life / self.max_life).max(0.0);
    }

    pub fn alive(&self) -> bool {
        self.life < self.max_life && self.alpha > PARTICLE_MIN_ALPHA
    }
}

/// Cosmetic burst effects in pixel space. Never feeds back into the simulation.
#[derive(Debug, Clone, Default)]
pub struct ParticleSystem {
    particles: Vec<Particle>,
}

impl ParticleSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn_explosion<R: Rng>(&mut self, rng: &mut R, x: f64, y: f64, count: usize, color: &'static str) {
        self.particles.reserve(count);
        for index in 0..count {
            let angle = (index as f64 / count.max(1) as f64) * PI * 2.0 + rng.gen::<f64>() * 0.5;
            let speed = 0.7 + rng.gen::<f64>() * 2.5;
            self.particles.push(Particle {
                x,
                y,
                vx: angle.cos() * speed,
                vy: angle.sin() * speed,
                alpha: 1.0,
                size: 1.5 + rng.gen::<f64>() * 2.5,
                color,
                life: 0.0,
                max_life: 500.0 + rng.gen::<f64>() * 500.0,
            });
        }
    }

    pub fn update(&mut self, dt: f64) {
        for particle in &mut self.particles {
            particle.update(dt);
        }
        self.particles.retain(Particle::alive);
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    pub fn clear(&mut self) {
        self.particles.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn explosion_fades_out_within_max_life() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut system = ParticleSystem::new();
        system.spawn_explosion(&mut rng, 100.0, 100.0, 20, "red");
        assert_eq!(system.len(), 20);

        system.update(16.0);
        assert_eq!(system.len(), 20);
        assert!(system.particles().iter().all(|particle| particle.alpha < 1.0));

        for _ in 0..70 {
            system.update(16.0);
        }
        assert!(system.is_empty());
    }
}

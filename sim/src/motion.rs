//! Joint-space motion of the simulated arm.
//!
//! Joints move toward the last `movej` target at a constant speed; with no
//! target they hold still.
use serde::{Deserialize, Serialize};

/// Home pose: shoulder lifted, elbow bent.
pub const HOME: [f64; 6] = [0.0, -1.5708, 1.5708, -1.5708, -1.5708, 0.0];

/// Joint speed used when a `movej` omits `v=` (rad/s).
pub const DEFAULT_SPEED: f64 = 1.05;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointMotion {
    pub position: [f64; 6],
    pub velocity: [f64; 6],
    pub target: Option<[f64; 6]>,
    pub speed: f64,
}

impl Default for JointMotion {
    fn default() -> Self {
        Self {
            position: HOME,
            velocity: [0.0; 6],
            target: None,
            speed: DEFAULT_SPEED,
        }
    }
}

impl JointMotion {
    pub fn move_to(&mut self, target: [f64; 6], speed: Option<f64>) {
        self.target = Some(target);
        self.speed = speed.filter(|v| *v > 0.0).unwrap_or(DEFAULT_SPEED);
    }

    pub fn stop(&mut self) {
        self.target = None;
        self.velocity = [0.0; 6];
    }

    pub fn is_moving(&self) -> bool {
        self.target.is_some()
    }

    /// Advances the arm by `dt` seconds. Every joint arrives at the same
    /// time so the motion stays synchronous.
    pub fn step(&mut self, dt: f64) {
        let Some(target) = self.target else {
            return;
        };
        let mut delta = [0.0; 6];
        let mut longest: f64 = 0.0;
        for i in 0..6 {
            delta[i] = target[i] - self.position[i];
            longest = longest.max(delta[i].abs());
        }
        let reach = self.speed * dt;
        if longest <= reach || longest == 0.0 {
            self.position = target;
            self.stop();
            return;
        }
        let scale = reach / longest;
        for i in 0..6 {
            let step = delta[i] * scale;
            self.position[i] += step;
            self.velocity[i] = step / dt;
        }
    }
}

/// Parses `movej([q0,..,q5], a=.., v=..)` into the target and optional speed.
pub fn parse_movej(line: &str) -> Option<([f64; 6], Option<f64>)> {
    let args = line.trim().strip_prefix("movej(")?.strip_suffix(')')?;
    let open = args.find('[')?;
    let close = args.find(']')?;
    let joints: Vec<f64> = args[open + 1..close]
        .split(',')
        .map(|value| value.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .ok()?;
    let target: [f64; 6] = joints.try_into().ok()?;

    let speed = args[close + 1..]
        .split(',')
        .filter_map(|kv| kv.trim().strip_prefix("v="))
        .find_map(|v| v.trim().parse::<f64>().ok());
    Some((target, speed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_movej() {
        let (target, speed) = parse_movej("movej([0,-1.57,1.57,0,0,0.5], a=1.2, v=0.25)\n").unwrap();
        assert_eq!(target, [0.0, -1.57, 1.57, 0.0, 0.0, 0.5]);
        assert_eq!(speed, Some(0.25));

        let (_, speed) = parse_movej("movej([1,2,3,4,5,6])").unwrap();
        assert_eq!(speed, None);

        assert!(parse_movej("movej([1,2,3])").is_none());
        assert!(parse_movej("movel(p[0,0,0,0,0,0])").is_none());
    }

    #[test]
    fn test_step_reaches_target() {
        let mut motion = JointMotion::default();
        let mut target = HOME;
        target[0] = 0.5;
        motion.move_to(target, Some(1.0));

        motion.step(0.25);
        assert!((motion.position[0] - 0.25).abs() < 1e-9);
        assert!((motion.velocity[0] - 1.0).abs() < 1e-9);
        assert!(motion.is_moving());

        motion.step(0.5);
        assert_eq!(motion.position, target);
        assert!(!motion.is_moving());
        assert_eq!(motion.velocity, [0.0; 6]);
    }
}

//! Named static postures.
//!
//! A [`Pose`] is a preset of the twelve servo angles. The [`PoseService`] keeps the
//! cursor used by the bumpers in STAND to cycle through them.
use log::info;

use crate::robot::leg::Leg;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub name: &'static str,
    /// Servo angles in degrees indexed by [`Leg`] then joint (shoulder, leg, foot).
    pub angles: [[f32; 3]; 4],
}

impl Pose {
    pub const fn new(name: &'static str, angles: [[f32; 3]; 4]) -> Self {
        Self { name, angles }
    }

    pub fn leg(&self, leg: Leg) -> [f32; 3] {
        self.angles[leg]
    }
}

#[derive(Debug)]
pub struct PoseService {
    poses: &'static [Pose],
    current: Option<usize>,
}

impl PoseService {
    pub fn new(poses: &'static [Pose]) -> Self {
        Self {
            poses,
            current: None,
        }
    }

    pub fn get(&self, index: usize) -> Option<&'static Pose> {
        self.poses.get(index)
    }

    pub fn find(&self, name: &str) -> Option<&'static Pose> {
        self.poses.iter().find(|pose| pose.name == name)
    }

    pub fn current(&self) -> Option<&'static Pose> {
        self.current.and_then(|i| self.poses.get(i))
    }

    /// Selects the following pose, wrapping around; the first call selects pose 0.
    pub fn next(&mut self) -> Option<&'static Pose> {
        if self.poses.is_empty() {
            return None;
        }
        let index = match self.current {
            Some(i) => (i + 1) % self.poses.len(),
            None => 0,
        };
        self.select(index)
    }

    /// Selects the preceding pose, wrapping around; the first call selects the last pose.
    pub fn previous(&mut self) -> Option<&'static Pose> {
        if self.poses.is_empty() {
            return None;
        }
        let index = match self.current {
            Some(0) | None => self.poses.len() - 1,
            Some(i) => i - 1,
        };
        self.select(index)
    }

    pub fn clear(&mut self) {
        self.current = None;
    }

    fn select(&mut self, index: usize) -> Option<&'static Pose> {
        self.current = Some(index);
        let pose = self.poses.get(index)?;
        info!("[MOTION_TASK] pose {} ({index})", pose.name);
        Some(pose)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RobotConfig;

    #[test]
    fn cycles_forward_and_backward() {
        let mut poses = PoseService::new(RobotConfig::DEFAULT.poses);
        let n = RobotConfig::DEFAULT.poses.len();
        assert_eq!(poses.next().map(|p| p.name), Some("rest"));
        assert_eq!(poses.next().map(|p| p.name), Some("stand"));
        assert_eq!(poses.previous().map(|p| p.name), Some("rest"));
        assert_eq!(poses.previous().map(|p| p.name), RobotConfig::DEFAULT.poses.get(n - 1).map(|p| p.name));
        assert_eq!(poses.next().map(|p| p.name), Some("rest"));
    }

    #[test]
    fn previous_from_nothing_selects_last() {
        let mut poses = PoseService::new(RobotConfig::DEFAULT.poses);
        assert_eq!(poses.current(), None);
        let last = poses.previous().map(|p| p.name);
        assert_eq!(last, Some("stretch"));
        assert_eq!(poses.find("sit").map(|p| p.name), Some("sit"));
    }

    #[test]
    fn empty_table_yields_nothing() {
        let mut poses = PoseService::new(&[]);
        assert!(poses.next().is_none());
        assert!(poses.previous().is_none());
    }
}

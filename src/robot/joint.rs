//! The three servo joints of a leg, in the order of every per-joint array.
use core::fmt::Display;
use core::ops::{Index, IndexMut};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Joint {
    Shoulder = 0,
    Leg = 1,
    Foot = 2,
}

pub const JOINTS: [Joint; 3] = [Joint::Shoulder, Joint::Leg, Joint::Foot];

impl Display for Joint {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Joint::Shoulder => f.write_str("shoulder"),
            Joint::Leg => f.write_str("upper leg"),
            Joint::Foot => f.write_str("foot"),
        }
    }
}

impl<T> Index<Joint> for [T; 3] {
    type Output = T;

    fn index(&self, joint: Joint) -> &Self::Output {
        &self[joint as usize]
    }
}

impl<T> IndexMut<Joint> for [T; 3] {
    fn index_mut(&mut self, joint: Joint) -> &mut Self::Output {
        &mut self[joint as usize]
    }
}

use core::fmt::Display;
use core::ops::{Index, IndexMut};

/// Leg identifiers, in the order used by every per-leg array of the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Leg {
    FrontLeft = 0,
    RearLeft = 1,
    FrontRight = 2,
    RearRight = 3,
}

pub const LEGS: [Leg; 4] = [Leg::FrontLeft, Leg::RearLeft, Leg::FrontRight, Leg::RearRight];

impl Leg {
    pub fn is_left(self) -> bool {
        matches!(self, Leg::FrontLeft | Leg::RearLeft)
    }

    pub fn is_front(self) -> bool {
        matches!(self, Leg::FrontLeft | Leg::FrontRight)
    }
}

impl Display for Leg {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Leg::FrontLeft => f.write_str("Front left"),
            Leg::FrontRight => f.write_str("Front right"),
            Leg::RearLeft => f.write_str("Rear left"),
            Leg::RearRight => f.write_str("Rear right"),
        }
    }
}

impl<T> Index<Leg> for [T; 4] {
    type Output = T;

    fn index(&self, leg: Leg) -> &Self::Output {
        &self[leg as usize]
    }
}

impl<T> IndexMut<Leg> for [T; 4] {
    fn index_mut(&mut self, leg: Leg) -> &mut Self::Output {
        &mut self[leg as usize]
    }
}

use std::fmt;

/// Scheduling rank. A smaller rank is serviced sooner.
///
/// Two levels ship by default, [`Priority::HIGH`] and [`Priority::LOW`].
/// Further levels are plain ranks built with [`Priority::new`]; they order
/// against the built-in ones by number, so adding a level never changes how
/// existing ones compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(u32);

impl Priority {
    pub const HIGH: Priority = Priority(1);
    pub const LOW: Priority = Priority(2);

    pub const fn new(rank: u32) -> Self {
        Priority(rank)
    }

    pub const fn rank(self) -> u32 {
        self.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::LOW
    }
}

impl From<u32> for Priority {
    fn from(rank: u32) -> Self {
        Priority(rank)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Priority::HIGH => f.write_str("HIGH"),
            Priority::LOW => f.write_str("LOW"),
            Priority(rank) => write!(f, "P{}", rank),
        }
    }
}
